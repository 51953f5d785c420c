//! The immutable, shared, glob-aware path value.
//!
//! A [`Path`] is a chain of nodes from a leaf segment up to a top node, which
//! is either the root (`/`) or a relative dot node (`.`, `..`, `../..`, ...).
//! Parents are shared between children, and every node is canonicalized
//! through [`crate::intern`], so building `/a/b` twice yields one instance.
//!
//! No stored segment is ever `.` or `..`; those are resolved while appending.
//! All chain walks are loops over the parent links, never recursion, so very
//! deep paths cannot exhaust the stack.

use std::borrow::Cow;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, LazyLock, OnceLock, Weak};

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::error::{PathError, PathResult};
use crate::escape::{decode, decode_canonical, encode};
use crate::glob::{Glob, contains_glob};
use crate::intern::{self, Key};

static ROOT: LazyLock<Path> = LazyLock::new(|| Path::from_node(Kind::Root, 0, false));
static DOT: LazyLock<Path> = LazyLock::new(|| Path::from_node(Kind::Dot(0), 0, false));
static DOTDOT: LazyLock<Path> = LazyLock::new(|| Path::from_node(Kind::Dot(1), 1, false));

/// Most `..` segments [`Path::up_n`] will produce at the top of a relative
/// path.
pub const MAX_DOTS: usize = 1 << 16;

/// An immutable hierarchical path.
///
/// Paths are cheap to clone (one reference count) and safe to share across
/// threads, use as map keys, or store in very large numbers: a tree of paths
/// shares every common prefix.
///
/// # Examples
/// ```
/// use arbor_path::Path;
///
/// let file = Path::parse("/home/user/notes.txt").unwrap();
/// assert_eq!(file.depth(), 3);
/// assert_eq!(file.up(), Path::parse("/home/user").unwrap());
/// assert_eq!(file.name(), "notes.txt");
///
/// let pattern = Path::parse("/home/*/notes.txt").unwrap();
/// assert!(pattern.matches(&file));
/// ```
#[derive(Clone)]
pub struct Path(Arc<Node>);

pub(crate) struct Node {
    kind: Kind,
    depth: usize,
    glob: bool,
    hash: OnceLock<u64>,
}

enum Kind {
    Root,
    /// `.` at depth 0, a chain of `..` at depth ≥ 1.
    Dot(usize),
    Literal { parent: Path, name: Box<str> },
    Glob { parent: Path, glob: Glob },
}

impl Drop for Node {
    // Unwind uniquely-owned parent chains in a loop; the default drop would
    // recurse once per segment.
    fn drop(&mut self) {
        let mut next = self.take_parent();
        while let Some(Path(node)) = next {
            next = match Arc::try_unwrap(node) {
                Ok(mut node) => node.take_parent(),
                Err(_) => None,
            };
        }
    }
}

impl Node {
    fn take_parent(&mut self) -> Option<Path> {
        match std::mem::replace(&mut self.kind, Kind::Root) {
            Kind::Literal { parent, .. } | Kind::Glob { parent, .. } => Some(parent),
            Kind::Root | Kind::Dot(_) => None,
        }
    }
}

impl Kind {
    /// The same segment hung under a different parent.
    fn reparent(&self, parent: &Path) -> Option<Kind> {
        match self {
            Kind::Literal { name, .. } => Some(Kind::Literal {
                parent: parent.clone(),
                name: name.clone(),
            }),
            Kind::Glob { glob, .. } => Some(Kind::Glob {
                parent: parent.clone(),
                glob: glob.clone(),
            }),
            Kind::Root | Kind::Dot(_) => None,
        }
    }
}

impl Path {
    fn from_node(kind: Kind, depth: usize, glob: bool) -> Path {
        Path(Arc::new(Node {
            kind,
            depth,
            glob,
            hash: OnceLock::new(),
        }))
    }

    pub(crate) fn from_arc(node: Arc<Node>) -> Path {
        Path(node)
    }

    pub(crate) fn downgrade(&self) -> Weak<Node> {
        Arc::downgrade(&self.0)
    }

    /// True if both handles refer to the same shared instance.
    pub fn ptr_eq(&self, other: &Path) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The root path, `/`. Its own parent.
    pub fn root() -> Path {
        ROOT.clone()
    }

    /// The empty relative path, `.`.
    pub fn dot() -> Path {
        DOT.clone()
    }

    /// The relative path one level up, `..`.
    pub fn dotdot() -> Path {
        DOTDOT.clone()
    }

    fn dots(depth: usize) -> Path {
        match depth {
            0 => Path::dot(),
            1 => Path::dotdot(),
            d => intern::insert(Key::Dots(d), Path::from_node(Kind::Dot(d), d, false)),
        }
    }

    /// Parse an escaped path string into an absolute path.
    ///
    /// Empty segments (repeated or trailing slashes) are skipped, `.` and
    /// `..` are resolved, and a string of only slashes is the root. A
    /// leading slash is optional. Segments containing a bare `*` or `?`
    /// become glob segments.
    pub fn parse(escaped: &str) -> PathResult<Path> {
        Path::root().append_str(escaped)
    }

    /// Parse an escaped path string relative to `.`.
    ///
    /// ```
    /// use arbor_path::Path;
    ///
    /// let rel = Path::parse_relative("../a").unwrap();
    /// assert!(rel.is_relative());
    /// assert_eq!(rel.to_string(), "../a");
    /// ```
    pub fn parse_relative(escaped: &str) -> PathResult<Path> {
        Path::dot().append_str(escaped)
    }

    /// Build an absolute path from unescaped segment names.
    pub fn implode<I, S>(names: I) -> Path
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .fold(Path::root(), |path, name| path.append_literal(name.as_ref()))
    }

    /// Parse escaped path text onto the end of this path.
    pub fn append_str(&self, escaped: &str) -> PathResult<Path> {
        let mut path = self.clone();
        for segment in escaped.split('/').filter(|s| !s.is_empty()) {
            path = path.append_segment(segment)?;
        }
        Ok(path)
    }

    /// Append one escaped segment.
    ///
    /// Text with a bare `*` or `?` becomes a glob segment; anything else is
    /// a literal. A segment that decodes to `.` or `..` resolves to this path
    /// or its parent.
    pub fn append_segment(&self, escaped: &str) -> PathResult<Path> {
        if contains_glob(escaped) {
            let text = Glob::canonical(escaped)?;
            if let Some(path) = intern::lookup(&self.key(true, &text)) {
                return Ok(path);
            }
            let glob = Glob::compile(escaped, text)?;
            return Ok(self.child(Kind::Glob {
                parent: self.clone(),
                glob,
            }));
        }
        let name = decode(escaped)?;
        Ok(self.append_literal(&name))
    }

    /// Append one unescaped name as a literal segment.
    ///
    /// `.` returns this path, `..` returns its parent, and an empty name is
    /// ignored. Every other name is taken verbatim, wildcards included.
    pub fn append_literal(&self, name: &str) -> Path {
        match name {
            "" | "." => self.clone(),
            ".." => self.up(),
            _ => self.child(Kind::Literal {
                parent: self.clone(),
                name: encode(name).into(),
            }),
        }
    }

    /// Append another path to this one. Equivalent to
    /// `path.append_to(self)`.
    pub fn append(&self, path: &Path) -> Path {
        path.append_to(self)
    }

    /// Re-root this path under `base`.
    ///
    /// An absolute path's segments are added below `base`. A relative path
    /// first ascends from `base` once per leading `..`.
    pub fn append_to(&self, base: &Path) -> Path {
        let mut chain = Vec::with_capacity(self.depth());
        let mut top = self;
        while let Some(parent) = top.parent() {
            chain.push(top);
            top = parent;
        }

        let mut path = match top.0.kind {
            Kind::Dot(depth) => base.ancestor(depth),
            _ => base.clone(),
        };
        if Arc::ptr_eq(&path.0, &top.0) {
            return self.clone();
        }

        for segment in chain.into_iter().rev() {
            if let Some(kind) = segment.0.kind.reparent(&path) {
                path = path.child(kind);
            }
        }
        path
    }

    fn child(&self, kind: Kind) -> Path {
        let (glob, key) = match &kind {
            Kind::Glob { glob, .. } => (true, self.key(true, glob.as_str())),
            Kind::Literal { name, .. } => (false, self.key(false, name)),
            Kind::Root | Kind::Dot(_) => return self.clone(),
        };
        let node = Path::from_node(kind, self.0.depth.saturating_add(1), self.0.glob || glob);
        intern::insert(key, node)
    }

    /// Identity of a would-be child. Parents are canonical instances, so the
    /// parent's address stands in for its whole string.
    fn key(&self, glob: bool, name: &str) -> Key {
        Key::Child {
            parent: Arc::as_ptr(&self.0) as usize,
            glob,
            name: name.into(),
        }
    }

    fn parent(&self) -> Option<&Path> {
        match &self.0.kind {
            Kind::Literal { parent, .. } | Kind::Glob { parent, .. } => Some(parent),
            Kind::Root | Kind::Dot(_) => None,
        }
    }

    /// The parent of this path.
    ///
    /// The root is its own parent; a dot path goes one `..` further up.
    pub fn up(&self) -> Path {
        match &self.0.kind {
            Kind::Root => self.clone(),
            Kind::Dot(depth) => Path::dots(depth.saturating_add(1)),
            Kind::Literal { parent, .. } | Kind::Glob { parent, .. } => parent.clone(),
        }
    }

    /// Go up `n` levels, rejecting negative counts and relative results
    /// more than [`MAX_DOTS`] levels above their start.
    pub fn up_n(&self, n: isize) -> PathResult<Path> {
        let n = usize::try_from(n)
            .map_err(|_| PathError::InvalidArgument(format!("cannot ascend {n} levels")))?;
        if let Kind::Dot(dots) = self.top().0.kind {
            let climb = n.saturating_sub(self.depth() - dots);
            if dots.saturating_add(climb) > MAX_DOTS {
                return Err(PathError::InvalidArgument(format!(
                    "cannot ascend {n} levels: more than {MAX_DOTS} `..` segments"
                )));
            }
        }
        Ok(self.ancestor(n))
    }

    /// Go up `n` levels. `ancestor(0)` is this path.
    pub fn ancestor(&self, n: usize) -> Path {
        let mut path = self;
        let mut left = n;
        while left > 0 {
            match &path.0.kind {
                Kind::Root => break,
                Kind::Dot(depth) => return Path::dots(depth.saturating_add(left)),
                Kind::Literal { parent, .. } | Kind::Glob { parent, .. } => path = parent,
            }
            left -= 1;
        }
        path.clone()
    }

    /// The top-level ancestor: the root, or the dot node of a relative path.
    pub fn top(&self) -> Path {
        let mut path = self;
        while let Some(parent) = path.parent() {
            path = parent;
        }
        path.clone()
    }

    /// The first `n` segments of this path.
    pub fn truncate(&self, n: usize) -> Path {
        match self.depth().checked_sub(n) {
            Some(extra) if extra > 0 => self.ancestor(extra),
            _ => self.clone(),
        }
    }

    /// Number of segments from the top. Dot paths count each `..`.
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Same as [`Path::depth`].
    pub fn len(&self) -> usize {
        self.0.depth
    }

    /// True for `/` and `.`.
    pub fn is_empty(&self) -> bool {
        self.0.depth == 0
    }

    pub fn is_root(&self) -> bool {
        matches!(self.0.kind, Kind::Root)
    }

    /// True if the top-level ancestor is the root.
    pub fn is_absolute(&self) -> bool {
        let mut path = self;
        while let Some(parent) = path.parent() {
            path = parent;
        }
        path.is_root()
    }

    pub fn is_relative(&self) -> bool {
        !self.is_absolute()
    }

    /// True if any segment in the chain is a glob.
    pub fn is_glob(&self) -> bool {
        self.0.glob
    }

    /// The longest prefix of this path with no glob segment in it.
    pub fn first_glob(&self) -> Path {
        let mut path = self;
        while path.is_glob() {
            match path.parent() {
                Some(parent) => path = parent,
                None => break,
            }
        }
        path.clone()
    }

    /// Resolve against the root. `..` chains that climb above it stop there.
    pub fn absolutize(&self) -> Path {
        self.append_to(&Path::root())
    }

    /// Resolve beneath `root`. The result never escapes `root`.
    pub fn absolutize_under(&self, root: &Path) -> Path {
        root.append(&self.absolutize())
    }

    /// The escaped name of the last segment.
    pub fn escaped_name(&self) -> &str {
        match &self.0.kind {
            Kind::Root => "/",
            Kind::Dot(0) => ".",
            Kind::Dot(_) => "..",
            Kind::Literal { name, .. } => name,
            Kind::Glob { glob, .. } => glob.as_str(),
        }
    }

    /// The unescaped name of the last segment.
    pub fn name(&self) -> Cow<'_, str> {
        decode_canonical(self.escaped_name())
    }

    /// Unescaped segment names from the top down. The root yields nothing;
    /// a relative path starts with one `..` per level it climbs.
    pub fn explode(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.depth());
        let mut path = self;
        while let Some(parent) = path.parent() {
            names.push(path.name().into_owned());
            path = parent;
        }
        if let Kind::Dot(depth) = path.0.kind {
            names.extend(std::iter::repeat_n(String::from(".."), depth));
        }
        names.reverse();
        names
    }

    /// Compare only the last segments of two paths.
    fn segment_eq(&self, other: &Path) -> bool {
        match (&self.0.kind, &other.0.kind) {
            (Kind::Root, Kind::Root) => true,
            (Kind::Dot(a), Kind::Dot(b)) => a == b,
            (Kind::Literal { name: a, .. }, Kind::Literal { name: b, .. }) => a == b,
            (Kind::Glob { glob: a, .. }, Kind::Glob { glob: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Check if the last segment of this path, read as a pattern, matches the
    /// last segment of `subject`.
    ///
    /// A literal matches an identical name, a glob matches any literal name
    /// its pattern accepts, and two globs match only if textually identical.
    pub fn segment_matches(&self, subject: &Path) -> bool {
        match (&self.0.kind, &subject.0.kind) {
            (Kind::Glob { glob, .. }, Kind::Literal { name, .. }) => {
                glob.is_match(&decode_canonical(name))
            }
            _ => self.segment_eq(subject),
        }
    }

    /// Check if this path, read as a pattern, matches `subject`.
    ///
    /// Not symmetric: `/a/*` matches `/a/b` but not the reverse, except that
    /// a non-glob pattern against a glob subject swaps roles. Two glob paths
    /// match only if they are equal. Globs never cross a segment boundary.
    pub fn matches(&self, subject: &Path) -> bool {
        if Arc::ptr_eq(&self.0, &subject.0) {
            return true;
        }
        match (self.is_glob(), subject.is_glob()) {
            (true, true) => return self == subject,
            (false, true) => return subject.matches(self),
            _ => {}
        }
        if self.depth() != subject.depth() {
            return false;
        }

        let (mut pattern, mut subject) = (self, subject);
        loop {
            if Arc::ptr_eq(&pattern.0, &subject.0) {
                return true;
            }
            if !pattern.segment_matches(subject) {
                return false;
            }
            match (pattern.parent(), subject.parent()) {
                (Some(p), Some(s)) => (pattern, subject) = (p, s),
                _ => return true,
            }
        }
    }

    /// Check if this path is a generalized prefix of `path`.
    ///
    /// True if this is the root or equals `path`. Otherwise, when the last
    /// segments are equal both sides step up; when they differ only `path`
    /// does, so deeper unrelated segments of `path` are skipped.
    pub fn prefixes(&self, path: &Path) -> bool {
        let mut this = self.clone();
        let mut that = path.clone();
        loop {
            // Nodes are canonical, so identity is equality here.
            if this.ptr_eq(&that) || this.is_root() {
                return true;
            }
            let Some(up) = that.parent().cloned() else {
                return false;
            };
            if this.segment_eq(&that) {
                this = this.up();
            }
            that = up;
        }
    }

    /// Check if this path, read as a pattern, covers `path`: `path` is
    /// matched by this pattern or lies somewhere beneath a path that is.
    ///
    /// ```
    /// use arbor_path::Path;
    ///
    /// let pattern = Path::parse("/src/*").unwrap();
    /// assert!(pattern.covers(&Path::parse("/src/lib").unwrap()));
    /// assert!(pattern.covers(&Path::parse("/src/lib/mod.rs").unwrap()));
    /// assert!(!pattern.covers(&Path::parse("/src").unwrap()));
    /// ```
    pub fn covers(&self, path: &Path) -> bool {
        if self.is_root() {
            return path.is_absolute();
        }
        match path.depth().checked_sub(self.depth()) {
            Some(extra) => self.matches(&path.ancestor(extra)),
            None => false,
        }
    }

    fn hash_code(&self) -> u64 {
        *self.0.hash.get_or_init(|| hash_str(&self.to_string()))
    }
}

fn hash_str(canonical: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    hasher.finish()
}

impl PartialEq for Path {
    fn eq(&self, other: &Path) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if let (Some(a), Some(b)) = (self.0.hash.get(), other.0.hash.get())
            && a != b
        {
            return false;
        }
        if self.depth() != other.depth() {
            return false;
        }

        let (mut a, mut b) = (self, other);
        loop {
            if Arc::ptr_eq(&a.0, &b.0) {
                return true;
            }
            if !a.segment_eq(b) {
                return false;
            }
            match (a.parent(), b.parent()) {
                (Some(pa), Some(pb)) => (a, b) = (pa, pb),
                _ => return true,
            }
        }
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl Default for Path {
    fn default() -> Self {
        Path::root()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::with_capacity(self.depth());
        let mut top = self;
        while let Some(parent) = top.parent() {
            names.push(top.escaped_name());
            top = parent;
        }

        match top.0.kind {
            Kind::Root if names.is_empty() => return f.write_str("/"),
            Kind::Root => {}
            Kind::Dot(0) => f.write_str(".")?,
            Kind::Dot(depth) => {
                f.write_str("..")?;
                for _ in 1..depth {
                    f.write_str("/..")?;
                }
            }
            Kind::Literal { .. } | Kind::Glob { .. } => {}
        }
        for name in names.iter().rev() {
            write!(f, "/{name}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Path").field(&self.to_string()).finish()
    }
}

impl FromStr for Path {
    type Err = PathError;

    /// Canonical relative text (`.`, `..`, `./…`, `../…`) parses as a
    /// relative path; everything else is absolute.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let relative = matches!(s, "." | "..") || s.starts_with("./") || s.starts_with("../");
        if relative {
            Path::parse_relative(s)
        } else {
            Path::parse(s)
        }
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Cow::<'de, str>::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
