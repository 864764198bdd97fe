//! Lazily-initialized shared resource with single-flight initialization.
//!
//! The browser instance is the one shared mutable resource in the process.
//! `SharedInstance` makes its lifecycle explicit: the slot moves through
//! `Uninitialized → Initializing → Ready`, drops back to `Disconnected`
//! when the instance dies, and relaunches on the next acquisition. The
//! initialization race is resolved by holding an async mutex across the
//! launch, not by polling: concurrent callers park on the lock and converge
//! on the one in-flight outcome.

use crate::error::{RelayError, RelayResult};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Observable lifecycle state of the shared instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Uninitialized,
    Initializing,
    Ready,
    Disconnected,
}

impl InstanceState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initializing => 1,
            Self::Ready => 2,
            Self::Disconnected => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Disconnected,
            _ => Self::Uninitialized,
        }
    }

    /// Short name for status endpoints.
    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        }
    }
}

struct Slot<T> {
    instance: Option<Arc<T>>,
    /// Failure message of the most recent launch generation, if it failed.
    last_failure: Option<String>,
}

/// A process-wide, lazily-initialized instance of `T`.
pub struct SharedInstance<T> {
    slot: Mutex<Slot<T>>,
    /// Bumped once per completed launch attempt. Callers that observed an
    /// older generation and find the slot empty were concurrent with a
    /// launch that has since failed; they receive that failure instead of
    /// launching again.
    generation: AtomicU64,
    state: AtomicU8,
}

impl<T> SharedInstance<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                instance: None,
                last_failure: None,
            }),
            generation: AtomicU64::new(0),
            state: AtomicU8::new(InstanceState::Uninitialized.as_u8()),
        }
    }

    pub fn state(&self) -> InstanceState {
        InstanceState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: InstanceState) {
        self.state.store(s.as_u8(), Ordering::Release);
    }

    /// Return the shared instance, launching it if necessary.
    ///
    /// `alive` decides whether an existing instance is still usable; a dead
    /// one is cleared and replaced within the same call. At most one launch
    /// runs at a time; every caller parked behind it resolves to the same
    /// instance or the same failure.
    pub async fn get_or_init<F, Fut>(
        &self,
        alive: impl Fn(&T) -> bool,
        launch: F,
    ) -> RelayResult<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RelayResult<T>>,
    {
        let observed_gen = self.generation.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if let Some(existing) = slot.instance.as_ref() {
            if alive(existing) {
                self.set_state(InstanceState::Ready);
                return Ok(Arc::clone(existing));
            }
            tracing::warn!("shared instance no longer alive, relaunching");
            slot.instance = None;
            self.set_state(InstanceState::Disconnected);
        }

        // A launch completed after we were called and left the slot empty:
        // we were part of that flight, so we share its failure rather than
        // stampeding a fresh launch.
        if self.generation.load(Ordering::Acquire) > observed_gen {
            if let Some(msg) = slot.last_failure.as_ref() {
                return Err(RelayError::LaunchFailure(msg.clone()));
            }
        }

        self.set_state(InstanceState::Initializing);
        let outcome = launch().await;
        self.generation.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(value) => {
                let arc = Arc::new(value);
                slot.instance = Some(Arc::clone(&arc));
                slot.last_failure = None;
                self.set_state(InstanceState::Ready);
                Ok(arc)
            }
            Err(e) => {
                slot.instance = None;
                slot.last_failure = Some(e.to_string());
                self.set_state(InstanceState::Uninitialized);
                Err(e)
            }
        }
    }

    /// Drop any instance that `alive` rejects. Used by the disconnect
    /// observer so a dead browser is cleared eagerly rather than on the
    /// next acquisition.
    pub async fn prune(&self, alive: impl Fn(&T) -> bool) {
        let mut slot = self.slot.lock().await;
        if let Some(existing) = slot.instance.as_ref() {
            if !alive(existing) {
                slot.instance = None;
                self.set_state(InstanceState::Disconnected);
            }
        }
    }

    /// Take the instance out of the slot, leaving it uninitialized.
    /// Used only at process shutdown.
    pub async fn take(&self) -> Option<Arc<T>> {
        let mut slot = self.slot.lock().await;
        self.set_state(InstanceState::Uninitialized);
        slot.instance.take()
    }
}

impl<T> Default for SharedInstance<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_acquire_launches_once() {
        let shared = Arc::new(SharedInstance::<u32>::new());
        let launches = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let shared = Arc::clone(&shared);
            let launches = Arc::clone(&launches);
            handles.push(tokio::spawn(async move {
                shared
                    .get_or_init(
                        |_| true,
                        || async move {
                            launches.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(42u32)
                        },
                    )
                    .await
            }));
        }

        let mut instances = Vec::new();
        for h in handles {
            instances.push(h.await.unwrap().unwrap());
        }

        assert_eq!(launches.load(Ordering::SeqCst), 1);
        for inst in &instances {
            assert!(Arc::ptr_eq(inst, &instances[0]));
            assert_eq!(**inst, 42);
        }
        assert_eq!(shared.state(), InstanceState::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_shares_launch_failure() {
        let shared = Arc::new(SharedInstance::<u32>::new());
        let launches = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let shared = Arc::clone(&shared);
            let launches = Arc::clone(&launches);
            handles.push(tokio::spawn(async move {
                shared
                    .get_or_init(
                        |_| true,
                        || async move {
                            launches.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Err(RelayError::LaunchFailure("no chromium".into()))
                        },
                    )
                    .await
            }));
        }

        for h in handles {
            let err = h.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), "LaunchFailure");
            assert!(err.to_string().contains("no chromium"));
        }
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_later_caller_retries_after_failure() {
        let shared = SharedInstance::<u32>::new();
        let err = shared
            .get_or_init(
                |_| true,
                || async { Err(RelayError::LaunchFailure("boom".into())) },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "LaunchFailure");

        // A call made after the failed flight completed is a new flight,
        // not a sharer of the stale failure.
        let v = shared
            .get_or_init(|_| true, || async { Ok(5u32) })
            .await
            .unwrap();
        assert_eq!(*v, 5);
    }

    #[tokio::test]
    async fn test_dead_instance_is_replaced() {
        let shared = SharedInstance::<AtomicUsize>::new();

        let first = shared
            .get_or_init(|_| true, || async { Ok(AtomicUsize::new(1)) })
            .await
            .unwrap();

        // Mark the instance dead; the next acquisition relaunches.
        first.store(0, Ordering::SeqCst);
        let second = shared
            .get_or_init(
                |v| v.load(Ordering::SeqCst) != 0,
                || async { Ok(AtomicUsize::new(2)) },
            )
            .await
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_prune_clears_only_dead_instances() {
        let shared = SharedInstance::<u32>::new();
        shared
            .get_or_init(|_| true, || async { Ok(7u32) })
            .await
            .unwrap();

        shared.prune(|_| true).await;
        assert_eq!(shared.state(), InstanceState::Ready);

        shared.prune(|_| false).await;
        assert_eq!(shared.state(), InstanceState::Disconnected);
        assert!(shared.take().await.is_none());
    }

    #[tokio::test]
    async fn test_take_leaves_slot_uninitialized() {
        let shared = SharedInstance::<u32>::new();
        assert_eq!(shared.state(), InstanceState::Uninitialized);

        shared
            .get_or_init(|_| true, || async { Ok(9u32) })
            .await
            .unwrap();
        let taken = shared.take().await;
        assert_eq!(taken.as_deref(), Some(&9));
        assert_eq!(shared.state(), InstanceState::Uninitialized);
    }
}
