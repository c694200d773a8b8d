use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::services::agent_service::{AgentFactory, AgentHandle};
use crate::utils::error::{AgentError, SessionError};

use super::queue::{AdmissionQueue, QueuedSession};
use super::types::{ExpiryTimer, SendOutcome, Session, StartOutcome};

/// Session table, in-flight constructions, and the admission backlog.
///
/// One lock over all three so a duplicate check, a capacity check, and a
/// slot reservation form a single atomic step. The lock is never held
/// across an await; the async construction and conversation calls happen
/// between a synchronous reserve and a synchronous register/cleanup.
struct Registry {
    sessions: HashMap<String, Session>,
    constructing: HashSet<String>,
    queue: AdmissionQueue,
}

impl Registry {
    /// Slots counted against capacity: registered sessions plus
    /// constructions in flight.
    fn occupied(&self) -> usize {
        self.sessions.len() + self.constructing.len()
    }
}

/// Result of a synchronous admission check.
enum Admission {
    Reserved,
    Queued { position: usize },
}

/// Admits, refreshes, and expires chat sessions under a fixed capacity.
///
/// Constructed once at startup and handed to request handlers explicitly.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Mutex<Registry>,
    factory: Arc<dyn AgentFactory>,
    config: SessionConfig,
    logger: ActivityLogger,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn AgentFactory>, config: SessionConfig, logger: ActivityLogger) -> Self {
        info!(
            "Initializing session manager: capacity={}, inactivity_timeout={}s",
            config.max_active_sessions, config.inactivity_timeout_secs
        );
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    sessions: HashMap::new(),
                    constructing: HashSet::new(),
                    queue: AdmissionQueue::new(),
                }),
                factory,
                config,
                logger,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.max_active_sessions
    }

    /// Admit a new session for `id`, or queue it when capacity is
    /// exhausted. Queued is a first-class outcome, not an error.
    pub async fn start_session(&self, id: &str) -> Result<StartOutcome, SessionError> {
        match self.reserve_slot(id)? {
            Admission::Queued { position } => {
                info!(
                    "Active sessions at capacity, queued session [{}] at position {}",
                    id, position
                );
                self.inner.logger.log(
                    ActivityLog::builder(id, ActivityType::SessionQueued)
                        .status(ActivityStatus::Info)
                        .queue_depth(self.queued_count())
                        .build(),
                );
                return Ok(StartOutcome::Queued { position });
            }
            Admission::Reserved => {}
        }

        match self.construct_and_register(id).await {
            Ok(()) => {
                self.inner.logger.log(
                    ActivityLog::builder(id, ActivityType::SessionCreated)
                        .active_sessions(self.active_count())
                        .build(),
                );
                Ok(StartOutcome::Created)
            }
            Err(e) => {
                self.inner.logger.log(
                    ActivityLog::builder(id, ActivityType::AgentError)
                        .error(e.to_string())
                        .build(),
                );
                Err(e.into())
            }
        }
    }

    /// Forward a message to the session's agent and return the reply.
    ///
    /// On an unknown id, either fails with NotFound or transparently runs
    /// admission, depending on the configured policy; transparent admission
    /// can itself resolve to the queued outcome.
    pub async fn send_message(&self, id: &str, payload: &str) -> Result<SendOutcome, SessionError> {
        let mut leased = self.lease(id);

        if leased.is_none() {
            if !self.inner.config.auto_create_on_miss {
                return Err(SessionError::NotFound(id.to_string()));
            }

            match self.start_session(id).await? {
                StartOutcome::Queued { position } => {
                    return Ok(SendOutcome::Queued { position });
                }
                StartOutcome::Created => {
                    debug!("Created session [{}] automatically for send", id);
                }
            }
            leased = self.lease(id);
        }

        let Some((handle, send_lock)) = leased else {
            // Admitted a moment ago but already raced away.
            return Err(SessionError::NotFound(id.to_string()));
        };

        // Reset the inactivity clock before the exchange, then serialize
        // overlapping sends on this id.
        self.touch(id);
        let _guard = send_lock.lock().await;

        match handle.converse(payload).await {
            Ok(reply) => Ok(SendOutcome::Replied(reply)),
            Err(e) => {
                // Conversation failures leave the session intact so the
                // client may retry.
                self.inner.logger.log(
                    ActivityLog::builder(id, ActivityType::AgentError)
                        .error(e.to_string())
                        .build(),
                );
                Err(SessionError::Agent(e))
            }
        }
    }

    /// Ids of admitted sessions, sorted for stable output.
    pub fn active_ids(&self) -> Vec<String> {
        let registry = self.inner.registry.lock();
        let mut ids: Vec<String> = registry.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Queue contents in admission order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.inner.registry.lock().queue.ids()
    }

    pub fn active_count(&self) -> usize {
        self.inner.registry.lock().sessions.len()
    }

    pub fn queued_count(&self) -> usize {
        self.inner.registry.lock().queue.len()
    }

    /// Clone out what a send needs so the registry lock never spans the
    /// agent exchange.
    fn lease(&self, id: &str) -> Option<(Arc<dyn AgentHandle>, Arc<tokio::sync::Mutex<()>>)> {
        let registry = self.inner.registry.lock();
        registry
            .sessions
            .get(id)
            .map(|session| (session.handle.clone(), session.send_lock.clone()))
    }

    /// Atomic admission step: duplicate check, queued-idempotence check,
    /// capacity check, slot reservation.
    fn reserve_slot(&self, id: &str) -> Result<Admission, SessionError> {
        let mut registry = self.inner.registry.lock();

        if registry.sessions.contains_key(id) || registry.constructing.contains(id) {
            return Err(SessionError::DuplicateId(id.to_string()));
        }

        // Asking again while queued is answered, not double-enqueued.
        if let Some(position) = registry.queue.position(id) {
            return Ok(Admission::Queued { position });
        }

        if registry.occupied() >= self.inner.config.max_active_sessions {
            let position = registry.queue.enqueue(id);
            return Ok(Admission::Queued { position });
        }

        registry.constructing.insert(id.to_string());
        Ok(Admission::Reserved)
    }

    /// Construct the agent handle for a reserved id and register the
    /// session. A failed construction releases the reservation and
    /// registers nothing.
    async fn construct_and_register(&self, id: &str) -> Result<(), AgentError> {
        let handle = match self.inner.factory.construct().await {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.registry.lock().constructing.remove(id);
                return Err(e);
            }
        };

        let mut registry = self.inner.registry.lock();
        registry.constructing.remove(id);

        let epoch = 0;
        let now = Instant::now();
        registry.sessions.insert(
            id.to_string(),
            Session {
                handle,
                last_active: now,
                expiry_timer: self.arm_timer(id, epoch),
                epoch,
                send_lock: Arc::new(tokio::sync::Mutex::new(())),
                created_at: now,
            },
        );

        debug!(
            "Created new session [{}]. Active sessions: {}",
            id,
            registry.sessions.len()
        );
        Ok(())
    }

    /// Cancel-and-recreate the expiry timer for `id`. The epoch bump
    /// invalidates a timer that already fired but has not yet run.
    pub fn touch(&self, id: &str) {
        let mut registry = self.inner.registry.lock();
        let Some(session) = registry.sessions.get_mut(id) else {
            return;
        };

        session.expiry_timer.cancel();
        session.epoch += 1;
        session.last_active = Instant::now();
        let timer = self.arm_timer(id, session.epoch);
        session.expiry_timer = timer;
    }

    /// Schedule the one-shot expiry callback for `id` at the configured
    /// inactivity timeout.
    fn arm_timer(&self, id: &str, epoch: u64) -> ExpiryTimer {
        let manager = self.clone();
        let id = id.to_string();
        let timeout = Duration::from_secs(self.inner.config.inactivity_timeout_secs);

        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.expire(&id, epoch).await;
        });

        ExpiryTimer::new(task.abort_handle())
    }

    /// Expiry callback: remove the session unconditionally (no grace) and
    /// drain the admission queue into the freed slot.
    async fn expire(&self, id: &str, epoch: u64) {
        let removed = {
            let mut registry = self.inner.registry.lock();
            match registry.sessions.get(id) {
                Some(session) if session.epoch == epoch => registry.sessions.remove(id),
                // A reset won the race; this timer is stale.
                _ => None,
            }
        };

        let Some(session) = removed else { return };

        info!(
            "Session [{}] inactive for {:?} (lifetime {:?}). Cleaning up.",
            id,
            session.last_active.elapsed(),
            session.created_at.elapsed()
        );
        self.inner.logger.log(
            ActivityLog::builder(id, ActivityType::SessionExpired)
                .status(ActivityStatus::Info)
                .active_sessions(self.active_count())
                .build(),
        );

        self.drain_queue().await;
    }

    /// Admit the queue head into freed capacity. A failed construction
    /// returns the entry to the head for the next drain trigger, until its
    /// retry budget runs out and the next head takes its place.
    async fn drain_queue(&self) {
        loop {
            let entry = {
                let mut registry = self.inner.registry.lock();
                if registry.occupied() >= self.inner.config.max_active_sessions {
                    return;
                }
                let Some(entry) = registry.queue.pop_head() else {
                    return;
                };
                registry.constructing.insert(entry.id.clone());
                entry
            };

            match self.construct_and_register(&entry.id).await {
                Ok(()) => {
                    info!(
                        "Processed queued session [{}]. Queue length: {}",
                        entry.id,
                        self.queued_count()
                    );
                    self.inner.logger.log(
                        ActivityLog::builder(&entry.id, ActivityType::SessionAdmitted)
                            .queue_depth(self.queued_count())
                            .active_sessions(self.active_count())
                            .build(),
                    );
                    return;
                }
                Err(e) => {
                    warn!("Failed to admit queued session [{}]: {}", entry.id, e);
                    let attempts = entry.attempts + 1;

                    if attempts >= self.inner.config.max_admission_attempts {
                        warn!(
                            "Dropping queued session [{}] after {} failed construction attempts",
                            entry.id, attempts
                        );
                        self.inner.logger.log(
                            ActivityLog::builder(&entry.id, ActivityType::AdmissionDropped)
                                .error(e.to_string())
                                .build(),
                        );
                        // The slot is still free; try the next head.
                        continue;
                    }

                    self.inner.registry.lock().queue.requeue_head(QueuedSession {
                        id: entry.id,
                        attempts,
                    });
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::agent_service::MockAgentFactory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubHandle {
        reply: String,
        in_flight: AtomicUsize,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl StubHandle {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl AgentHandle for StubHandle {
        async fn converse(&self, _message: &str) -> Result<String, AgentError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn test_config(capacity: usize) -> SessionConfig {
        SessionConfig {
            max_active_sessions: capacity,
            inactivity_timeout_secs: 600,
            auto_create_on_miss: true,
            max_admission_attempts: 5,
            max_message_chars: 5000,
        }
    }

    fn ok_factory() -> MockAgentFactory {
        let mut factory = MockAgentFactory::new();
        factory
            .expect_construct()
            .returning(|| Ok(Arc::new(StubHandle::new("GENERAL\nhello")) as Arc<dyn AgentHandle>));
        factory
    }

    fn manager_with(factory: MockAgentFactory, config: SessionConfig) -> SessionManager {
        SessionManager::new(Arc::new(factory), config, ActivityLogger::disabled())
    }

    /// Let spawned expiry tasks run after the clock moved.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_is_rejected() {
        let manager = manager_with(ok_factory(), test_config(2));

        assert_eq!(
            manager.start_session("x").await.unwrap(),
            StartOutcome::Created
        );
        assert!(matches!(
            manager.start_session("x").await,
            Err(SessionError::DuplicateId(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_overflow_is_queued_in_fifo_order() {
        let manager = manager_with(ok_factory(), test_config(2));

        for id in ["a", "b"] {
            assert_eq!(
                manager.start_session(id).await.unwrap(),
                StartOutcome::Created
            );
        }
        assert_eq!(
            manager.start_session("c").await.unwrap(),
            StartOutcome::Queued { position: 1 }
        );
        assert_eq!(
            manager.start_session("d").await.unwrap(),
            StartOutcome::Queued { position: 2 }
        );

        assert_eq!(manager.active_ids(), vec!["a", "b"]);
        assert_eq!(manager.queued_ids(), vec!["c", "d"]);
        assert!(manager.active_count() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_queued_does_not_double_enqueue() {
        let manager = manager_with(ok_factory(), test_config(1));

        manager.start_session("x").await.unwrap();
        assert_eq!(
            manager.start_session("y").await.unwrap(),
            StartOutcome::Queued { position: 1 }
        );
        assert_eq!(
            manager.start_session("y").await.unwrap(),
            StartOutcome::Queued { position: 1 }
        );
        assert_eq!(manager.queued_ids(), vec!["y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_construction_registers_nothing() {
        let mut factory = MockAgentFactory::new();
        factory
            .expect_construct()
            .times(1)
            .returning(|| Err(AgentError::Construction("runtime down".to_string())));
        factory
            .expect_construct()
            .returning(|| Ok(Arc::new(StubHandle::new("GENERAL\nok")) as Arc<dyn AgentHandle>));
        let manager = manager_with(factory, test_config(2));

        assert!(matches!(
            manager.start_session("x").await,
            Err(SessionError::Agent(AgentError::Construction(_)))
        ));
        assert!(manager.active_ids().is_empty());

        // The id is free again once the failure cleaned up.
        assert_eq!(
            manager.start_session("x").await.unwrap(),
            StartOutcome::Created
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_after_inactivity() {
        let manager = manager_with(ok_factory(), test_config(1));
        manager.start_session("x").await.unwrap();

        tokio::time::advance(Duration::from_millis(599_999)).await;
        settle().await;
        assert_eq!(manager.active_ids(), vec!["x"]);

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert!(manager.active_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_reschedules_the_expiry_timer() {
        let manager = manager_with(ok_factory(), test_config(1));
        manager.start_session("x").await.unwrap();

        // Activity just before the deadline must keep the session alive
        // for a full fresh window.
        tokio::time::advance(Duration::from_millis(599_999)).await;
        settle().await;
        match manager.send_message("x", "ping").await.unwrap() {
            SendOutcome::Replied(reply) => assert!(reply.contains("hello")),
            other => panic!("unexpected outcome: {:?}", other),
        }

        tokio::time::advance(Duration::from_millis(599_990)).await;
        settle().await;
        assert_eq!(manager.active_ids(), vec!["x"]);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(manager.active_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_drains_the_queue_head() {
        let manager = manager_with(ok_factory(), test_config(2));

        manager.start_session("x").await.unwrap();
        tokio::time::advance(Duration::from_secs(300)).await;
        manager.start_session("y").await.unwrap();
        assert_eq!(
            manager.start_session("z").await.unwrap(),
            StartOutcome::Queued { position: 1 }
        );

        // x expires at 600s; y is only 300s old.
        tokio::time::advance(Duration::from_secs(301)).await;
        settle().await;

        assert_eq!(manager.active_ids(), vec!["y", "z"]);
        assert!(manager.queued_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_failure_keeps_head_position() {
        let mut factory = MockAgentFactory::new();
        // A admits, then B's drain construction fails once.
        factory
            .expect_construct()
            .times(1)
            .returning(|| Ok(Arc::new(StubHandle::new("GENERAL\nok")) as Arc<dyn AgentHandle>));
        factory
            .expect_construct()
            .times(1)
            .returning(|| Err(AgentError::Construction("runtime down".to_string())));
        let manager = manager_with(factory, test_config(1));

        manager.start_session("a").await.unwrap();
        manager.start_session("b").await.unwrap();
        manager.start_session("c").await.unwrap();
        assert_eq!(manager.queued_ids(), vec!["b", "c"]);

        tokio::time::advance(Duration::from_secs(601)).await;
        settle().await;

        // b failed construction but was not lost and not reordered after c.
        assert!(manager.active_ids().is_empty());
        assert_eq!(manager.queued_ids(), vec!["b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhaustion_drops_the_head() {
        let mut factory = MockAgentFactory::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        // Call order: a ok, b fail, d ok, b fail (budget), c ok.
        factory.expect_construct().returning(move || {
            match counter.fetch_add(1, Ordering::SeqCst) {
                1 | 3 => Err(AgentError::Construction("runtime down".to_string())),
                _ => Ok(Arc::new(StubHandle::new("GENERAL\nok")) as Arc<dyn AgentHandle>),
            }
        });

        let mut config = test_config(1);
        config.max_admission_attempts = 2;
        let manager = manager_with(factory, config);

        manager.start_session("a").await.unwrap();
        manager.start_session("b").await.unwrap();
        manager.start_session("c").await.unwrap();

        // a expires; b's first attempt fails and b returns to the head.
        tokio::time::advance(Duration::from_secs(601)).await;
        settle().await;
        assert_eq!(manager.queued_ids(), vec!["b", "c"]);

        // A direct admission into the free slot provides the next trigger.
        manager.start_session("d").await.unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;
        settle().await;

        // b exhausted its budget and was dropped; c took the slot.
        assert_eq!(manager.active_ids(), vec!["c"]);
        assert!(manager.queued_ids().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_to_unknown_id_honors_policy() {
        let mut config = test_config(1);
        config.auto_create_on_miss = false;
        let manager = manager_with(ok_factory(), config);

        assert!(matches!(
            manager.send_message("ghost", "hi").await,
            Err(SessionError::NotFound(_))
        ));

        let manager = manager_with(ok_factory(), test_config(1));
        match manager.send_message("ghost", "hi").await.unwrap() {
            SendOutcome::Replied(reply) => assert!(reply.contains("hello")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(manager.active_ids(), vec!["ghost"]);

        // Auto-creation at capacity falls through to the queued outcome.
        assert_eq!(
            manager.send_message("overflow", "hi").await.unwrap(),
            SendOutcome::Queued { position: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_sends_on_one_id_are_serialized() {
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let tracker = max_in_flight.clone();

        let mut factory = MockAgentFactory::new();
        factory.expect_construct().returning(move || {
            let handle = StubHandle {
                reply: "GENERAL\nhello".to_string(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: tracker.clone(),
            };
            Ok(Arc::new(handle) as Arc<dyn AgentHandle>)
        });
        let manager = manager_with(factory, test_config(1));
        manager.start_session("x").await.unwrap();

        let (a, b) = tokio::join!(
            manager.send_message("x", "first"),
            manager.send_message("x", "second")
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_invariant_under_many_starts() {
        let manager = manager_with(ok_factory(), test_config(2));

        for id in ["s1", "s2", "s3", "s4", "s5"] {
            manager.start_session(id).await.unwrap();
            assert!(manager.active_count() <= 2);
        }

        assert_eq!(manager.active_count(), 2);
        assert_eq!(manager.queued_count(), 3);
    }
}
