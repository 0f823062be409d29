use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// A value that is set at most once and can be awaited by any number of
/// waiters, before or after it is set.
#[derive(Debug)]
pub struct Latch<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Latch<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Default for Latch<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Latch<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Store `value` unless a value is already present. Returns whether this
    /// call was the one that set it.
    pub fn set(&self, value: T) -> bool {
        let mut stored = false;
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            stored = true;
            true
        });
        stored
    }

    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Resolves with the value once set. Never resolves if every clone of
    /// the latch is dropped unset.
    pub fn wait(&self) -> impl Future<Output = T> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            loop {
                if let Some(v) = rx.borrow_and_update().clone() {
                    return v;
                }
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn only_first_set_wins() {
        let latch = Latch::new();
        assert!(latch.set(1));
        assert!(!latch.set(2));
        assert_eq!(latch.get(), Some(1));
    }

    #[test]
    fn waiters_registered_before_and_after_set() {
        let latch: Latch<&'static str> = Latch::new();
        let mut early = task::spawn(latch.wait());
        assert_pending!(early.poll());

        latch.set("done");
        assert!(early.is_woken());
        assert_ready_eq!(early.poll(), "done");

        let mut late = task::spawn(latch.wait());
        assert_ready_eq!(late.poll(), "done");
    }
}
