//! Per-connection cancellation signal.
//!
//! A [`Link`] is shared by every task of one connection. Any of them may
//! cancel it, any number of times; once cancelled it stays cancelled, and
//! every task waiting on [`Link::cancelled`] wakes up.

use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};

#[derive(Debug, Clone, Default)]
pub struct Link {
    token: CancellationToken,
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link cancelled whenever `self` is, but which can also be cancelled alone
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Close the link. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Non-blocking check
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the link is closed
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Guard that closes the link when dropped, including on unwind
    pub fn close_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_double_cancel() {
        let link = Link::new();
        let a = link.clone();
        let b = link.clone();

        let t1 = tokio::spawn(async move { a.cancel() });
        let t2 = tokio::spawn(async move { b.cancel() });
        assert!(t1.await.is_ok());
        assert!(t2.await.is_ok());

        assert!(link.is_cancelled());
        link.cancel();
        assert!(link.is_cancelled());
    }

    #[tokio::test]
    async fn test_all_waiters_wake() {
        let link = Link::new();
        let mut waiters = tokio::task::JoinSet::new();
        for _ in 0..3 {
            let l = link.clone();
            waiters.spawn(async move { l.cancelled().await });
        }

        link.cancel();
        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            let mut n = 0;
            while let Some(res) = waiters.join_next().await {
                assert!(res.is_ok());
                n += 1;
            }
            n
        })
        .await;
        assert_eq!(drained.ok(), Some(3));
    }

    #[test]
    fn test_drop_guard_and_children() {
        let parent = Link::new();
        let child = parent.child();
        let sibling = parent.child();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(!sibling.is_cancelled());

        {
            let _guard = parent.close_on_drop();
        }
        assert!(parent.is_cancelled());
        assert!(sibling.is_cancelled());
    }
}
