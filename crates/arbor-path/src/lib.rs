//! arbor-path: immutable, interned, glob-aware hierarchical paths.
//!
//! Provides:
//! - **Path**: an absolute (`/a/b`) or dot-relative (`../a`) path value with
//!   shared parents, structural equality, asymmetric glob matching and
//!   generalized prefix tests
//! - **Glob**: single-segment wildcard patterns (`*`, `?`)
//! - **escape**: RFC 3986 style percent-escaping of segment names
//! - **intern**: the process-wide canonicalization table behind `Path`
//!
//! The canonical text form of a path is its `/`-joined escaped segments; the
//! root renders as `/`, relative paths as `.` or a chain of `..`.

pub mod error;
pub mod escape;
pub mod glob;
pub mod intern;
mod path;

pub use error::{PathError, PathResult};
pub use glob::{Glob, contains_glob, glob_to_regex};
pub use path::{MAX_DOTS, Path};
