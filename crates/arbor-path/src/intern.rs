//! Process-wide canonicalization table.
//!
//! Every path node is created through this table, so two paths with the same
//! canonical string are the same instance and compare by pointer. Because
//! parents are canonical too, a node is identified by its parent's address
//! plus its own escaped segment text, which avoids rendering the whole path
//! on every append.
//!
//! Entries are weak: a path is freed once nothing outside the table uses it.
//! Dead entries are swept whenever the table doubles past its last live size.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use crate::path::{Node, Path};

const MIN_SWEEP: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Key {
    /// A relative top node climbing this many levels.
    Dots(usize),
    Child {
        parent: usize,
        glob: bool,
        name: Box<str>,
    },
}

struct Table {
    entries: HashMap<Key, Weak<Node>>,
    sweep_at: usize,
}

static TABLE: LazyLock<Mutex<Table>> = LazyLock::new(|| {
    Mutex::new(Table {
        entries: HashMap::new(),
        sweep_at: MIN_SWEEP,
    })
});

fn table() -> MutexGuard<'static, Table> {
    // Entries are inserted whole; a panic elsewhere cannot leave one torn.
    TABLE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The live instance for `key`, if any.
pub(crate) fn lookup(key: &Key) -> Option<Path> {
    table().entries.get(key).and_then(Weak::upgrade).map(Path::from_arc)
}

/// Insert `candidate` unless a live instance already exists for `key`.
///
/// The first insert wins; a losing candidate is dropped and the winner is
/// returned in its place.
pub(crate) fn insert(key: Key, candidate: Path) -> Path {
    let mut table = table();
    if let Some(winner) = table.entries.get(&key).and_then(Weak::upgrade) {
        return Path::from_arc(winner);
    }

    table.entries.insert(key, candidate.downgrade());
    if table.entries.len() > table.sweep_at {
        table.entries.retain(|_, node| node.strong_count() > 0);
        table.sweep_at = (table.entries.len() * 2).max(MIN_SWEEP);
    }
    candidate
}

/// Number of entries in the table, live or not yet swept.
pub fn len() -> usize {
    table().entries.len()
}
