//! Generic progress callback trait.

/// Callback invoked with progress updates during a long-running operation.
///
/// Type parameter `T` is the progress payload, so different operations can
/// report different information through the same seam.
pub trait ProgressCallback<T>: Send + Sync {
    /// Called with a progress update.
    ///
    /// # Returns
    /// - `true` to continue the operation
    /// - `false` to request cancellation
    fn on_progress(&self, progress: &T) -> bool;
}

/// Any `Fn(&T) -> bool` closure is a progress callback.
impl<T, F> ProgressCallback<T> for F
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn on_progress(&self, progress: &T) -> bool {
        self(progress)
    }
}

/// A progress callback that always continues.
pub struct NoOpProgress;

impl<T> ProgressCallback<T> for NoOpProgress {
    fn on_progress(&self, _progress: &T) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct Ticks {
        done: u64,
    }

    #[test]
    fn test_noop_always_continues() {
        let cb: NoOpProgress = NoOpProgress;
        assert!(cb.on_progress(&Ticks { done: 0 }));
        assert!(cb.on_progress(&Ticks { done: u64::MAX }));
    }

    #[test]
    fn test_closure_callback() {
        let cb = |p: &Ticks| p.done < 10;
        assert!(cb.on_progress(&Ticks { done: 5 }));
        assert!(!cb.on_progress(&Ticks { done: 15 }));
    }

    #[test]
    fn test_closure_captures_state() {
        let seen: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
        let seen_clone: Arc<AtomicU64> = seen.clone();
        let cb = move |_: &Ticks| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            true
        };

        cb.on_progress(&Ticks { done: 1 });
        cb.on_progress(&Ticks { done: 2 });
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
