// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The session manager (spec §4.3): life-cycles sessions, drives their execution, and exposes
//! field-mask-aware queries plus abort/notify/subscribe.

use std::collections::HashMap;
use std::sync::Arc;

use async_latch::AsyncLatch;
use parking_lot::Mutex;
use task_executor::Executor;
use tokio::sync::{broadcast, watch};

use crate::event_bus::{SessionEventBus, SessionLifecycleEvent};
use crate::types::{
    now_millis, FieldMask, Session, SessionConfig, SessionFilter, SessionManagerError,
    SessionStatus,
};
use crate::driver::SessionDriver;

/// Ring buffer capacity for the subscribe-session broadcast; slow subscribers that fall behind
/// see a `Lagged` error on their stream rather than blocking publishers (spec §5 "Log fan-out ...
/// consumer callbacks MUST be non-blocking" applies equally here).
const SUBSCRIBE_CHANNEL_CAPACITY: usize = 1024;

struct SessionHandle {
    state: Mutex<Session>,
    abort: AsyncLatch,
    /// Resolves once the session reaches FINISHED; backs `addSession`'s `ListenableResult`.
    finished: watch::Sender<Option<Session>>,
}

/// Owns every session for the process lifetime. Generic over no persistence: spec §1 "Non-goals"
/// excludes persisting session history beyond allocations, so sessions live only in memory.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
    event_bus: Arc<SessionEventBus>,
    driver: Arc<dyn SessionDriver>,
    executor: Executor,
    updates: broadcast::Sender<Session>,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn SessionDriver>, executor: Executor) -> SessionManager {
        SessionManager {
            sessions: Mutex::new(HashMap::new()),
            event_bus: Arc::new(SessionEventBus::new()),
            driver,
            executor,
            updates: broadcast::channel(SUBSCRIBE_CHANNEL_CAPACITY).0,
        }
    }

    pub fn event_bus(&self) -> Arc<SessionEventBus> {
        self.event_bus.clone()
    }

    /// Assigns a session id, persists it in SUBMITTED, and starts its cooperative execution task,
    /// returning the initial record plus a future that resolves once it reaches FINISHED (spec
    /// §4.3 "addSession").
    pub fn add_session(
        &self,
        config: SessionConfig,
        client_id: Option<String>,
    ) -> (Session, watch::Receiver<Option<Session>>) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(session_id.clone(), config.clone(), client_id);

        let handle = Arc::new(SessionHandle {
            state: Mutex::new(session.clone()),
            abort: AsyncLatch::new(),
            finished: watch::channel(None).0,
        });
        let finished_rx = handle.finished.subscribe();
        self.sessions.lock().insert(session_id.clone(), handle.clone());

        let driver = self.driver.clone();
        let event_bus = self.event_bus.clone();
        let updates = self.updates.clone();
        self.executor.spawn(async move {
            Self::run_session(session_id, config, driver, event_bus, updates, handle).await;
        });

        (session, finished_rx)
    }

    async fn run_session(
        session_id: String,
        config: SessionConfig,
        driver: Arc<dyn SessionDriver>,
        event_bus: Arc<SessionEventBus>,
        updates: broadcast::Sender<Session>,
        handle: Arc<SessionHandle>,
    ) {
        {
            let mut session = handle.state.lock();
            session.status = SessionStatus::Running;
            session.output.started_at_millis = Some(now_millis());
        }
        event_bus.publish(&SessionLifecycleEvent::Started {
            session_id: session_id.clone(),
        });
        let _ = updates.send(handle.state.lock().clone());

        let output = driver.run(&session_id, &config, handle.abort.clone()).await;

        let finished_session = {
            let mut session = handle.state.lock();
            session.status = SessionStatus::Finished;
            session.output = output.clone();
            session.output.finished_at_millis = Some(now_millis());
            session.clone()
        };
        event_bus.publish(&SessionLifecycleEvent::Finished {
            session_id,
            output,
        });
        let _ = updates.send(finished_session.clone());
        let _ = handle.finished.send(Some(finished_session));
    }

    /// Fails with `NotFound` if `id` is unknown (spec §4.3 "getSession").
    pub fn get_session(&self, id: &str, mask: &FieldMask) -> Result<Session, SessionManagerError> {
        let sessions = self.sessions.lock();
        let handle = sessions
            .get(id)
            .ok_or_else(|| SessionManagerError::NotFound(id.to_owned()))?;
        Ok(mask.apply(&handle.state.lock()))
    }

    pub fn get_all_sessions(&self, mask: &FieldMask, filter: &SessionFilter) -> Vec<Session> {
        self.sessions
            .lock()
            .values()
            .map(|h| h.state.lock().clone())
            .filter(|s| filter.matches(s))
            .map(|s| mask.apply(&s))
            .collect()
    }

    /// A fresh receiver of every status-transition broadcast; callers filter to the session ids
    /// they selected and apply their own field mask, matching `SubscribeSession`'s client-driven
    /// selection (spec §4.3).
    pub fn subscribe(&self) -> broadcast::Receiver<Session> {
        self.updates.subscribe()
    }

    /// Delivers a notification only to sessions that are still RUNNING, returning the ids it
    /// actually reached (spec §4.3 "notifySessions ... returns ids actually delivered").
    pub fn notify_sessions(&self, ids: &[String], notification: &str) -> Vec<String> {
        let sessions = self.sessions.lock();
        let mut delivered = Vec::new();
        for id in ids {
            let Some(handle) = sessions.get(id) else {
                continue;
            };
            if handle.state.lock().status != SessionStatus::Running {
                continue;
            }
            self.event_bus.publish(&SessionLifecycleEvent::Notified {
                session_id: id.clone(),
                notification: notification.to_owned(),
            });
            delivered.push(id.clone());
        }
        delivered
    }

    /// Sets `aborted_flag` and signals cancellation; idempotent per session (spec §8
    /// "abortSessions([s]); abortSessions([s]) is equivalent to the first call").
    pub fn abort_sessions(&self, ids: &[String]) {
        let sessions = self.sessions.lock();
        for id in ids {
            let Some(handle) = sessions.get(id) else {
                continue;
            };
            let already_finished = {
                let mut session = handle.state.lock();
                if session.status == SessionStatus::Finished {
                    true
                } else {
                    session.aborted_flag = true;
                    false
                }
            };
            if already_finished {
                continue;
            }
            handle.abort.trigger();
            self.event_bus.publish(&SessionLifecycleEvent::Aborted {
                session_id: id.clone(),
            });
        }
    }

    pub fn has_unarchived_sessions(&self) -> bool {
        self.sessions
            .lock()
            .values()
            .any(|h| h.state.lock().status != SessionStatus::Finished)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::types::SessionOutput;

    struct ImmediateDriver;

    #[async_trait]
    impl SessionDriver for ImmediateDriver {
        async fn run(&self, _session_id: &str, _config: &SessionConfig, _abort: AsyncLatch) -> SessionOutput {
            SessionOutput::default()
        }
    }

    struct WaitsForAbortDriver;

    #[async_trait]
    impl SessionDriver for WaitsForAbortDriver {
        async fn run(&self, _session_id: &str, _config: &SessionConfig, abort: AsyncLatch) -> SessionOutput {
            abort.triggered().await;
            SessionOutput {
                error: Some("aborted".to_owned()),
                ..Default::default()
            }
        }
    }

    fn executor() -> Executor {
        Executor::new()
    }

    #[tokio::test]
    async fn add_session_transitions_to_finished() {
        let manager = SessionManager::new(Arc::new(ImmediateDriver), executor());
        let (session, mut finished) = manager.add_session(SessionConfig::default(), None);
        assert_eq!(session.status, SessionStatus::Submitted);

        finished.changed().await.unwrap();
        let done = finished.borrow().clone().unwrap();
        assert_eq!(done.status, SessionStatus::Finished);
    }

    #[tokio::test]
    async fn get_session_fails_not_found_for_unknown_id() {
        let manager = SessionManager::new(Arc::new(ImmediateDriver), executor());
        let err = manager
            .get_session("missing", &FieldMask::everything())
            .unwrap_err();
        assert_eq!(err, SessionManagerError::NotFound("missing".to_owned()));
    }

    #[tokio::test]
    async fn abort_sessions_is_idempotent() {
        let manager = SessionManager::new(Arc::new(WaitsForAbortDriver), executor());
        let (session, mut finished) = manager.add_session(SessionConfig::default(), None);

        manager.abort_sessions(&[session.session_id.clone()]);
        manager.abort_sessions(&[session.session_id.clone()]);

        finished.changed().await.unwrap();
        let done = finished.borrow().clone().unwrap();
        assert_eq!(done.output.error.as_deref(), Some("aborted"));

        let record = manager
            .get_session(&session.session_id, &FieldMask::everything())
            .unwrap();
        assert!(record.aborted_flag);
    }

    #[tokio::test]
    async fn notify_sessions_only_reaches_running_sessions() {
        let manager = SessionManager::new(Arc::new(ImmediateDriver), executor());
        let delivered = manager.notify_sessions(&["missing".to_owned()], "hello");
        assert!(delivered.is_empty());
    }

    #[tokio::test]
    async fn has_unarchived_sessions_reflects_outstanding_work() {
        let manager = SessionManager::new(Arc::new(ImmediateDriver), executor());
        assert!(!manager.has_unarchived_sessions());
        let (_session, mut finished) = manager.add_session(SessionConfig::default(), None);
        assert!(manager.has_unarchived_sessions());
        finished.changed().await.unwrap();
        assert!(!manager.has_unarchived_sessions());
    }
}
