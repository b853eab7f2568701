//! Session registry: lookup/create, exclusive acquire, broadcast, GC.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{
    DEFAULT_GC_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_SESSION_TIMEOUT,
};
use crate::error::SessionError;
use crate::protocol::message_frame;
use crate::session::{RequestContext, Session, SessionHandler, SessionState};

struct Inner {
    sessions: HashMap<String, Arc<Session>>,
    /// Insertion-ordered view for GC traversal.
    order: Vec<Arc<Session>>,
    acquired: HashSet<String>,
    gc_task: Option<JoinHandle<()>>,
}

/// Owns every session of one endpoint.
///
/// External code holds `Arc<Session>` borrows and mutates sessions only
/// through the operations here and on [`Session`].
pub struct SessionManager {
    name: String,
    handler: Arc<dyn SessionHandler>,
    heartbeat_interval: Duration,
    session_timeout: Duration,
    gc_interval: Duration,
    debug: bool,
    inner: Mutex<Inner>,
}

impl SessionManager {
    pub fn new(name: impl Into<String>, handler: Arc<dyn SessionHandler>) -> Arc<Self> {
        Self::with_intervals(
            name,
            handler,
            DEFAULT_HEARTBEAT_INTERVAL,
            DEFAULT_SESSION_TIMEOUT,
            DEFAULT_GC_INTERVAL,
            false,
        )
    }

    pub fn with_intervals(
        name: impl Into<String>,
        handler: Arc<dyn SessionHandler>,
        heartbeat_interval: Duration,
        session_timeout: Duration,
        gc_interval: Duration,
        debug: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            handler,
            heartbeat_interval,
            session_timeout,
            gc_interval,
            debug,
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                order: Vec::new(),
                acquired: HashSet::new(),
                gc_task: None,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a registered session.
    pub fn get(&self, sid: &str) -> Option<Arc<Session>> {
        self.inner.lock().sessions.get(sid).cloned()
    }

    /// Look up a session, creating and registering it if absent.
    ///
    /// Fails with [`SessionError::Expired`] rather than registering an
    /// expired session.
    pub fn get_or_create(self: &Arc<Self>, sid: &str) -> Result<Arc<Session>, SessionError> {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.get(sid) {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(Session::new(
            sid,
            Arc::clone(&self.handler),
            self.session_timeout,
            self.heartbeat_interval,
            self.debug,
        ));
        self.add_locked(&mut inner, session)
    }

    fn add_locked(
        self: &Arc<Self>,
        inner: &mut Inner,
        session: Arc<Session>,
    ) -> Result<Arc<Session>, SessionError> {
        if session.expired() {
            return Err(SessionError::Expired);
        }
        session.attach_manager(Arc::downgrade(self));
        inner
            .sessions
            .insert(session.id().to_string(), Arc::clone(&session));
        inner.order.push(Arc::clone(&session));
        Ok(session)
    }

    /// Attach a transport exclusively.
    ///
    /// Fails with [`SessionError::Unknown`] for an unregistered session and
    /// [`SessionError::Acquired`] while another transport holds it.
    pub async fn acquire(
        self: &Arc<Self>,
        context: RequestContext,
        session: &Arc<Session>,
    ) -> Result<(), SessionError> {
        {
            let mut inner = self.inner.lock();
            if inner.acquired.contains(session.id()) {
                return Err(SessionError::Acquired);
            }
            if !inner.sessions.contains_key(session.id()) {
                return Err(SessionError::Unknown);
            }
            inner.acquired.insert(session.id().to_string());
        }

        if let Err(err) = session.acquire(context, self, true).await {
            self.inner.lock().acquired.remove(session.id());
            return Err(err);
        }
        Ok(())
    }

    pub fn is_acquired(&self, session: &Session) -> bool {
        self.inner.lock().acquired.contains(session.id())
    }

    /// Detach a transport. Idempotent.
    pub fn release(&self, session: &Arc<Session>) {
        let mut inner = self.inner.lock();
        if inner.acquired.remove(session.id()) {
            session.release();
        }
    }

    /// Snapshot of every non-expired session.
    pub fn active_sessions(&self) -> Vec<Arc<Session>> {
        self.inner
            .lock()
            .sessions
            .values()
            .filter(|session| !session.expired())
            .cloned()
            .collect()
    }

    /// Queue `message` for every non-expired session.
    ///
    /// The frame is serialized once and shared.
    pub fn broadcast(&self, message: &str) {
        let blob = message_frame(message);
        let sessions: Vec<Arc<Session>> =
            self.inner.lock().sessions.values().cloned().collect();
        for session in sessions {
            if !session.expired() {
                session.send_frame(blob.clone());
            }
        }
    }

    /// Drive every non-closed session to CLOSED and empty the registry.
    ///
    /// Safe to call repeatedly; used for host-driven teardown.
    pub async fn clear(&self) {
        let sessions: Vec<Arc<Session>> =
            self.inner.lock().sessions.values().cloned().collect();
        for session in sessions {
            if session.state() != SessionState::Closed {
                session.remote_closed().await;
            }
        }

        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.sessions.clear();
        inner.acquired.clear();
    }

    // -----------------------------------------------------------------------
    // Garbage collection
    // -----------------------------------------------------------------------

    /// Whether the GC task is armed.
    pub fn started(&self) -> bool {
        self.inner.lock().gc_task.is_some()
    }

    /// Arm the GC task. No-op if already armed.
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.gc_task.is_none() {
            let manager = Arc::clone(self);
            inner.gc_task = Some(tokio::spawn(async move {
                loop {
                    tokio::time::sleep(manager.gc_interval).await;
                    manager.gc_pass().await;
                }
            }));
        }
    }

    /// Disarm the GC task. Idempotent.
    pub fn stop(&self) {
        let task = self.inner.lock().gc_task.take();
        if let Some(task) = task {
            task.abort();
        }
    }

    /// One collection pass: release, close out, and drop every session
    /// whose expiry has passed or whose expired flag is set.
    pub async fn gc_pass(&self) {
        let now = Instant::now();
        let candidates: Vec<Arc<Session>> = {
            let inner = self.inner.lock();
            inner
                .order
                .iter()
                .filter(|session| session.expires_at() < now || session.expired())
                .cloned()
                .collect()
        };

        for session in candidates {
            tracing::debug!(manager = %self.name, session = %session.id(), "collecting session");
            if self.is_acquired(&session) {
                self.release(&session);
            }
            if session.state() == SessionState::Open {
                session.remote_close(None).await;
            }
            if session.state() == SessionState::Closing {
                session.remote_closed().await;
            }

            let mut inner = self.inner.lock();
            inner.sessions.remove(session.id());
            inner.order.retain(|s| s.id() != session.id());
            inner.acquired.remove(session.id());
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(task) = inner.gc_task.take() {
            task.abort();
        }
        if !inner.sessions.is_empty() {
            tracing::warn!(
                manager = %self.name,
                sessions = inner.sessions.len(),
                "manager dropped with unclosed sessions; call clear() before shutdown"
            );
        }
    }
}
