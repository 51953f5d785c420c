//! Single-resolution completion slot.
//!
//! A `Completion` starts empty and is resolved at most once. Any number of
//! tasks may [`wait`](Completion::wait) on it, before or after resolution,
//! and all of them see the same value. A second `resolve` is refused and
//! reported to the caller instead of overwriting the first value.

use tokio::sync::watch;

/// A write-once value that tasks can await.
#[derive(Debug)]
pub struct Completion<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Store `value` if nothing has been stored yet.
    ///
    /// Returns `false`, dropping `value`, if the slot was already resolved.
    pub fn resolve(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Resolve with `value` when the returned guard is dropped, including
    /// when the current thread unwinds before then.
    pub fn resolve_on_drop(&self, value: T) -> ResolveGuard<'_, T> {
        ResolveGuard {
            slot: self,
            value: Some(value),
        }
    }
}

/// Resolves its [`Completion`] when dropped. See
/// [`Completion::resolve_on_drop`].
#[must_use = "the slot is resolved as soon as the guard is dropped"]
pub struct ResolveGuard<'a, T> {
    slot: &'a Completion<T>,
    value: Option<T>,
}

impl<T> Drop for ResolveGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.slot.resolve(value);
        }
    }
}

impl<T: Clone> Completion<T> {
    /// The resolved value, if there is one yet.
    pub fn peek(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Wait until the slot is resolved and return a copy of its value.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.changed().await;
        }
    }
}
