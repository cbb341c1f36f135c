//! Admission control
//!
//! Every backend call runs inside a slot of a bounded pool keyed by
//! operation class. A call that finds the pool full waits in a bounded
//! queue for up to the pool's wait timeout; a call that finds the queue
//! full is rejected at once. On top of the class pools, each user may only
//! hold a few slots at a time; that throttle never queues.

use rustc_hash::FxHashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::{PoolConfig, PoolsConfig};

/// Operation class of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Search,
    Prefix,
    Regex,
    MoreLike,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolKind::Search => "search",
            PoolKind::Prefix => "prefix",
            PoolKind::Regex => "regex",
            PoolKind::MoreLike => "more_like",
        })
    }
}

/// Which throttle rejected a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionScope {
    PerUser { logged_in: bool },
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionFailure {
    #[error("queue full")]
    QueueFull,
    #[error("timed out waiting for a slot")]
    WaitTimeout,
}

/// A call was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{pool} pool rejected the call ({scope:?}): {failure}")]
pub struct AdmissionError {
    pub pool: PoolKind,
    pub scope: AdmissionScope,
    pub failure: AdmissionFailure,
}

/// Who is asking, for the per-user throttle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserIdentity {
    LoggedIn(String),
    /// Keyed by client address
    Anonymous(String),
}

impl UserIdentity {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, UserIdentity::LoggedIn(_))
    }

    fn key(&self) -> String {
        match self {
            UserIdentity::LoggedIn(name) => format!("user:{}", name),
            UserIdentity::Anonymous(addr) => format!("ip:{}", addr),
        }
    }
}

impl Default for UserIdentity {
    fn default() -> Self {
        UserIdentity::Anonymous("127.0.0.1".to_string())
    }
}

struct Pool {
    config: PoolConfig,
    slots: Arc<Semaphore>,
    waiting: AtomicUsize,
}

impl Pool {
    fn new(config: &PoolConfig) -> Self {
        Self {
            config: config.clone(),
            slots: Arc::new(Semaphore::new(config.workers)),
            waiting: AtomicUsize::new(0),
        }
    }
}

/// A place in a pool's wait queue, given back on every exit path
struct QueuePlace<'a>(&'a AtomicUsize);

impl Drop for QueuePlace<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type UserSlots = Mutex<FxHashMap<String, Arc<Semaphore>>>;

/// A held per-user slot; forgets the user once their last slot is released
struct UserSlot<'a> {
    users: &'a UserSlots,
    key: String,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for UserSlot<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());
        let mut users = lock(self.users);
        if users.get(&self.key).is_some_and(|s| Arc::strong_count(s) == 1) {
            users.remove(&self.key);
        }
    }
}

fn lock(users: &UserSlots) -> MutexGuard<'_, FxHashMap<String, Arc<Semaphore>>> {
    users.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded pools per operation class plus the per-user throttle
pub struct AdmissionController {
    search: Pool,
    prefix: Pool,
    regex: Pool,
    more_like: Pool,
    per_user_workers: usize,
    users: UserSlots,
}

impl AdmissionController {
    pub fn new(config: &PoolsConfig) -> Self {
        Self {
            search: Pool::new(&config.search),
            prefix: Pool::new(&config.prefix),
            regex: Pool::new(&config.regex),
            more_like: Pool::new(&config.more_like),
            per_user_workers: config.per_user_workers,
            users: Mutex::new(FxHashMap::default()),
        }
    }

    fn pool(&self, kind: PoolKind) -> &Pool {
        match kind {
            PoolKind::Search => &self.search,
            PoolKind::Prefix => &self.prefix,
            PoolKind::Regex => &self.regex,
            PoolKind::MoreLike => &self.more_like,
        }
    }

    /// Run `work` once a slot in `kind` is free
    pub async fn run<F: Future>(
        &self,
        kind: PoolKind,
        user: &UserIdentity,
        work: F,
    ) -> Result<F::Output, AdmissionError> {
        let _user_slot = self.acquire_user(kind, user)?;
        let _slot = self.acquire_pool(kind).await?;
        Ok(work.await)
    }

    /// Calls currently holding a slot of `kind`
    pub fn in_flight(&self, kind: PoolKind) -> usize {
        let pool = self.pool(kind);
        pool.config.workers.saturating_sub(pool.slots.available_permits())
    }

    fn acquire_user(
        &self,
        kind: PoolKind,
        user: &UserIdentity,
    ) -> Result<Option<UserSlot<'_>>, AdmissionError> {
        if self.per_user_workers == 0 {
            return Ok(None);
        }

        let key = user.key();
        let semaphore = {
            let mut users = lock(&self.users);
            Arc::clone(
                users
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(self.per_user_workers))),
            )
        };

        match semaphore.try_acquire_owned() {
            Ok(permit) => Ok(Some(UserSlot {
                users: &self.users,
                key,
                permit: Some(permit),
            })),
            Err(_) => {
                let scope = AdmissionScope::PerUser {
                    logged_in: user.is_logged_in(),
                };
                warn!(pool = %kind, user = %key, "per-user throttle rejected search");
                Err(AdmissionError {
                    pool: kind,
                    scope,
                    failure: AdmissionFailure::QueueFull,
                })
            }
        }
    }

    async fn acquire_pool(&self, kind: PoolKind) -> Result<OwnedSemaphorePermit, AdmissionError> {
        let pool = self.pool(kind);
        if let Ok(permit) = Arc::clone(&pool.slots).try_acquire_owned() {
            return Ok(permit);
        }

        let rejected = |failure| AdmissionError {
            pool: kind,
            scope: AdmissionScope::Global,
            failure,
        };

        let queued = pool.waiting.fetch_add(1, Ordering::SeqCst);
        let place = QueuePlace(&pool.waiting);
        if queued >= pool.config.max_queue {
            warn!(pool = %kind, queued, "pool queue full");
            return Err(rejected(AdmissionFailure::QueueFull));
        }

        debug!(pool = %kind, queued, "waiting for a slot");
        let acquired = tokio::time::timeout(
            pool.config.wait_timeout(),
            Arc::clone(&pool.slots).acquire_owned(),
        )
        .await;
        drop(place);

        match acquired {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) | Err(_) => {
                warn!(pool = %kind, wait_ms = pool.config.timeout_ms, "gave up waiting for a slot");
                Err(rejected(AdmissionFailure::WaitTimeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn pools(workers: usize, max_queue: usize, per_user_workers: usize) -> PoolsConfig {
        let pool = PoolConfig {
            workers,
            max_queue,
            timeout_ms: 20,
        };
        PoolsConfig {
            search: pool.clone(),
            prefix: pool.clone(),
            regex: pool.clone(),
            more_like: pool,
            per_user_workers,
        }
    }

    /// Occupy one slot of `kind` for `user` until the returned sender fires
    async fn hold(
        controller: &Arc<AdmissionController>,
        kind: PoolKind,
        user: UserIdentity,
    ) -> (oneshot::Sender<()>, tokio::task::JoinHandle<Result<(), AdmissionError>>) {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let controller = Arc::clone(controller);
        let handle = tokio::spawn(async move {
            controller
                .run(kind, &user, async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                })
                .await
        });
        started_rx.await.unwrap();
        (release_tx, handle)
    }

    #[tokio::test]
    async fn test_run_returns_output() {
        let controller = AdmissionController::new(&pools(2, 2, 2));
        let out = controller
            .run(PoolKind::Search, &UserIdentity::default(), async { 7 })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(controller.in_flight(PoolKind::Search), 0);
    }

    #[tokio::test]
    async fn test_per_user_rejection() {
        let controller = Arc::new(AdmissionController::new(&pools(10, 10, 1)));
        let anon = UserIdentity::Anonymous("10.0.0.1".into());
        let (release, handle) = hold(&controller, PoolKind::Search, anon.clone()).await;

        let err = controller
            .run(PoolKind::Prefix, &anon, async {})
            .await
            .unwrap_err();
        assert_eq!(err.scope, AdmissionScope::PerUser { logged_in: false });
        assert_eq!(err.failure, AdmissionFailure::QueueFull);

        let alice = UserIdentity::LoggedIn("Alice".into());
        assert!(controller.run(PoolKind::Search, &alice, async {}).await.is_ok());

        release.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(controller.run(PoolKind::Search, &anon, async {}).await.is_ok());
        assert!(lock(&controller.users).is_empty());
    }

    #[tokio::test]
    async fn test_logged_in_scope() {
        let controller = Arc::new(AdmissionController::new(&pools(10, 10, 1)));
        let alice = UserIdentity::LoggedIn("Alice".into());
        let (release, handle) = hold(&controller, PoolKind::Search, alice.clone()).await;

        let err = controller
            .run(PoolKind::Search, &alice, async {})
            .await
            .unwrap_err();
        assert_eq!(err.scope, AdmissionScope::PerUser { logged_in: true });

        release.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_queue_full() {
        let controller = Arc::new(AdmissionController::new(&pools(1, 0, 0)));
        let (release, handle) =
            hold(&controller, PoolKind::Regex, UserIdentity::default()).await;
        assert_eq!(controller.in_flight(PoolKind::Regex), 1);

        let err = controller
            .run(PoolKind::Regex, &UserIdentity::default(), async {})
            .await
            .unwrap_err();
        assert_eq!(err.pool, PoolKind::Regex);
        assert_eq!(err.scope, AdmissionScope::Global);
        assert_eq!(err.failure, AdmissionFailure::QueueFull);

        // Pools are independent
        assert!(
            controller
                .run(PoolKind::Search, &UserIdentity::default(), async {})
                .await
                .is_ok()
        );

        release.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wait_timeout() {
        let controller = Arc::new(AdmissionController::new(&pools(1, 1, 0)));
        let (release, handle) =
            hold(&controller, PoolKind::Search, UserIdentity::default()).await;

        let err = controller
            .run(PoolKind::Search, &UserIdentity::default(), async {})
            .await
            .unwrap_err();
        assert_eq!(err.failure, AdmissionFailure::WaitTimeout);

        release.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_queue() {
        let controller = Arc::new(AdmissionController::new(&pools(1, 1, 0)));
        let (release, handle) =
            hold(&controller, PoolKind::Search, UserIdentity::default()).await;

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                controller
                    .run(PoolKind::Search, &UserIdentity::default(), async {})
                    .await
            })
        };
        for _ in 0..100 {
            if controller.search.waiting.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(controller.search.waiting.load(Ordering::SeqCst), 1);

        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(controller.search.waiting.load(Ordering::SeqCst), 0);

        // The freed place lets the next caller queue instead of bouncing
        let err = controller
            .run(PoolKind::Search, &UserIdentity::default(), async {})
            .await
            .unwrap_err();
        assert_eq!(err.failure, AdmissionFailure::WaitTimeout);

        release.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
