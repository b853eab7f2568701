//! SockJS session: per-client state machine, outbound frame queue, heartbeat.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{HandlerError, SessionError};
use crate::manager::SessionManager;
use crate::protocol::{Frame, SockjsMessage};

/// Session lifecycle states. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Open,
    Closing,
    Closed,
}

/// Request details captured when a transport acquires the session.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or("").to_string(),
            headers: parts.headers.clone(),
        }
    }
}

/// Application callback receiving session lifecycle and message events.
///
/// Errors never propagate past the session: a failure while handling
/// [`SockjsMessage::Open`] interrupts the session, any other failure is
/// logged and swallowed.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    async fn handle(&self, message: SockjsMessage, session: Arc<Session>)
        -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> SessionHandler for FnHandler<F>
where
    F: Fn(SockjsMessage, Arc<Session>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        message: SockjsMessage,
        session: Arc<Session>,
    ) -> Result<(), HandlerError> {
        (self.0)(message, session).await
    }
}

/// Wrap an async closure as a [`SessionHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn SessionHandler>
where
    F: Fn(SockjsMessage, Arc<Session>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

struct Inner {
    state: SessionState,
    acquired: bool,
    interrupted: bool,
    expired: bool,
    expires: Instant,
    hits: u64,
    heartbeats: u64,
    heartbeat_consumer: bool,
    heartbeat_consumed: bool,
    heartbeat_task: Option<JoinHandle<()>>,
    queue: VecDeque<Frame>,
    waiter: Option<oneshot::Sender<()>>,
    context: Option<RequestContext>,
    manager: Option<Weak<SessionManager>>,
    error: Option<String>,
}

/// A durable per-client message channel spanning one or more transport
/// connections.
///
/// Shared as `Arc<Session>`; interior state lives behind a mutex that is
/// never held across an await point. The application handler is always
/// invoked with the lock released.
pub struct Session {
    id: String,
    handler: Arc<dyn SessionHandler>,
    timeout: Duration,
    heartbeat_interval: Duration,
    debug: bool,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        handler: Arc<dyn SessionHandler>,
        timeout: Duration,
        heartbeat_interval: Duration,
        debug: bool,
    ) -> Self {
        Self {
            id: id.into(),
            handler,
            timeout,
            heartbeat_interval,
            debug,
            inner: Mutex::new(Inner {
                state: SessionState::New,
                acquired: false,
                interrupted: false,
                expired: false,
                expires: Instant::now() + timeout,
                hits: 0,
                heartbeats: 0,
                heartbeat_consumer: false,
                heartbeat_consumed: true,
                heartbeat_task: None,
                queue: VecDeque::new(),
                waiter: None,
                context: None,
                manager: None,
                error: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn acquired(&self) -> bool {
        self.inner.lock().acquired
    }

    pub fn interrupted(&self) -> bool {
        self.inner.lock().interrupted
    }

    pub fn expired(&self) -> bool {
        self.inner.lock().expired
    }

    pub(crate) fn expires_at(&self) -> Instant {
        self.inner.lock().expires
    }

    pub fn hits(&self) -> u64 {
        self.inner.lock().hits
    }

    pub fn heartbeats(&self) -> u64 {
        self.inner.lock().heartbeats
    }

    /// Number of frames waiting in the outbound queue.
    pub fn message_length(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// The last handler error recorded against this session, if any.
    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    /// The request that acquired this session, while a transport holds it.
    pub fn context(&self) -> Option<RequestContext> {
        self.inner.lock().context.clone()
    }

    /// The manager currently holding this session.
    ///
    /// `None` between registration windows, and after `release`.
    pub fn manager(&self) -> Option<Arc<SessionManager>> {
        self.inner.lock().manager.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn attach_manager(&self, manager: Weak<SessionManager>) {
        self.inner.lock().manager = Some(manager);
    }

    /// Push back the expiry deadline by the session timeout.
    fn tick(&self) {
        self.inner.lock().expires = Instant::now() + self.timeout;
    }

    /// Attach a transport to this session.
    ///
    /// Fails with [`SessionError::Acquired`] if a transport already holds it.
    /// On the first successful acquire the session transitions NEW -> OPEN,
    /// the `o` frame is queued, and the handler observes `Open`; a handler
    /// failure there interrupts the session and queues
    /// `(3000, "Internal error")` instead of propagating.
    pub async fn acquire(
        self: &Arc<Self>,
        context: RequestContext,
        manager: &Arc<SessionManager>,
        with_heartbeat: bool,
    ) -> Result<(), SessionError> {
        let open_dispatch = {
            let mut inner = self.inner.lock();
            if inner.acquired {
                return Err(SessionError::Acquired);
            }
            inner.acquired = true;
            inner.context = Some(context);
            inner.manager = Some(Arc::downgrade(manager));
            inner.heartbeat_consumer = with_heartbeat;
            inner.expires = Instant::now() + self.timeout;
            inner.hits += 1;

            if inner.state == SessionState::New {
                tracing::debug!(session = %self.id, "open session");
                inner.state = SessionState::Open;
                Self::feed(&mut inner, Frame::Open);
                true
            } else {
                false
            }
        };

        if open_dispatch {
            match self
                .handler
                .handle(SockjsMessage::Open, Arc::clone(self))
                .await
            {
                Ok(()) => self.start_heartbeat(),
                Err(err) => {
                    tracing::error!(session = %self.id, error = %err, "open handler failed");
                    let mut inner = self.inner.lock();
                    inner.state = SessionState::Closing;
                    inner.error = Some(err.to_string());
                    inner.interrupted = true;
                    Self::feed(&mut inner, Frame::Close(3000, "Internal error".to_string()));
                }
            }
        }

        Ok(())
    }

    /// Detach the transport. Idempotent.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        inner.acquired = false;
        inner.context = None;
        inner.manager = None;
    }

    fn feed(inner: &mut Inner, frame: Frame) {
        match frame {
            Frame::Message(messages) => {
                if let Some(Frame::Message(tail)) = inner.queue.back_mut() {
                    tail.extend(messages);
                } else {
                    inner.queue.push_back(Frame::Message(messages));
                }
            }
            other => inner.queue.push_back(other),
        }

        if let Some(waiter) = inner.waiter.take() {
            // A send failure means the consumer was cancelled mid-wait; the
            // frame stays queued for the next consumer.
            let _ = waiter.send(());
        }
    }

    /// Queue a message for the client. No-op unless the session is OPEN.
    ///
    /// Consecutive messages coalesce into a single MESSAGE frame.
    pub fn send(&self, message: impl Into<String>) {
        let message = message.into();
        if self.debug {
            tracing::debug!(
                session = %self.id,
                message = %preview(&message),
                "outgoing message"
            );
        }

        let mut inner = self.inner.lock();
        if inner.state != SessionState::Open {
            return;
        }
        Self::feed(&mut inner, Frame::Message(vec![message]));
    }

    /// Queue an already serialized `a[...]` frame verbatim.
    ///
    /// Used by broadcast so the frame is rendered once for all sessions.
    pub fn send_frame(&self, frame: impl Into<String>) {
        let frame = frame.into();
        if self.debug {
            tracing::debug!(session = %self.id, frame = %preview(&frame), "outgoing frame");
        }

        let mut inner = self.inner.lock();
        if inner.state != SessionState::Open {
            return;
        }
        Self::feed(&mut inner, Frame::MessageBlob(frame));
    }

    /// Take the next outbound frame, suspending while the queue is empty.
    ///
    /// Fails with [`SessionError::Closed`] once the session is CLOSED and
    /// the queue has drained.
    pub async fn wait(&self) -> Result<Frame, SessionError> {
        loop {
            let waiter = {
                let mut inner = self.inner.lock();
                if let Some(frame) = inner.queue.pop_front() {
                    if matches!(frame, Frame::Heartbeat) {
                        inner.heartbeat_consumed = true;
                    }
                    return Ok(frame);
                }
                if inner.state == SessionState::Closed {
                    return Err(SessionError::Closed);
                }
                let (tx, rx) = oneshot::channel();
                // Replacing a stale sender covers a consumer cancelled
                // between registration and wake-up.
                inner.waiter = Some(tx);
                rx
            };
            let _ = waiter.await;
        }
    }

    /// Close the session locally with `3000 "Go away!"`.
    pub fn close(&self) {
        self.close_with(3000, "Go away!");
    }

    /// Close the session locally. Idempotent once CLOSING or CLOSED.
    pub fn close_with(&self, code: u16, reason: &str) {
        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
                return;
            }
            if self.debug {
                tracing::debug!(session = %self.id, code, "close session");
            }
            inner.state = SessionState::Closing;
            Self::feed(&mut inner, Frame::Close(code, reason.to_string()));
        }
        self.stop_heartbeat();
    }

    /// Mark the session expired so the next GC pass removes it.
    pub fn expire(&self) {
        self.inner.lock().expired = true;
        self.stop_heartbeat();
    }

    /// Deliver one client message to the handler. Resets the expiry clock.
    pub async fn remote_message(self: &Arc<Self>, message: String) {
        tracing::debug!(session = %self.id, message = %preview(&message), "incoming message");
        self.tick();
        self.dispatch(SockjsMessage::Message(message)).await;
    }

    /// Deliver a batch of client messages to the handler, in order.
    pub async fn remote_messages(self: &Arc<Self>, messages: Vec<String>) {
        self.tick();
        for message in messages {
            tracing::debug!(session = %self.id, message = %preview(&message), "incoming message");
            self.dispatch(SockjsMessage::Message(message)).await;
        }
    }

    /// The remote side started closing. Idempotent once CLOSING or CLOSED.
    pub async fn remote_close(self: &Arc<Self>, error: Option<String>) {
        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
                return;
            }
            tracing::info!(session = %self.id, "close session");
            inner.state = SessionState::Closing;
            if let Some(err) = &error {
                inner.error = Some(err.clone());
                inner.interrupted = true;
            }
        }
        self.dispatch(SockjsMessage::Close(error)).await;
        self.stop_heartbeat();
    }

    /// The remote side is gone. Terminal transition; idempotent.
    pub async fn remote_closed(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closed {
                return;
            }
            tracing::info!(session = %self.id, "session closed");
            inner.state = SessionState::Closed;
        }
        self.expire();
        self.dispatch(SockjsMessage::Closed).await;

        let waiter = self.inner.lock().waiter.take();
        if let Some(waiter) = waiter {
            let _ = waiter.send(());
        }
    }

    async fn dispatch(self: &Arc<Self>, message: SockjsMessage) {
        if let Err(err) = self.handler.handle(message, Arc::clone(self)).await {
            tracing::error!(session = %self.id, error = %err, "handler failed");
        }
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    pub(crate) fn start_heartbeat(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.heartbeat_consumer && inner.heartbeat_task.is_none() {
            let session = Arc::clone(self);
            inner.heartbeat_task = Some(tokio::spawn(async move {
                session.heartbeat_loop().await;
            }));
        }
    }

    /// Idempotent; aborting an already finished task is a no-op.
    pub(crate) fn stop_heartbeat(&self) {
        let task = self.inner.lock().heartbeat_task.take();
        if let Some(task) = task {
            task.abort();
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        enum Fire {
            Dead,
            Stop,
            Beat,
        }

        loop {
            tokio::time::sleep(self.heartbeat_interval).await;

            let fire = {
                let mut inner = self.inner.lock();
                if !inner.heartbeat_consumed {
                    // The previous heartbeat never left the queue; the
                    // consumer is gone.
                    inner.heartbeat_task = None;
                    Fire::Dead
                } else if inner.state != SessionState::Open {
                    inner.heartbeat_task = None;
                    Fire::Stop
                } else {
                    inner.heartbeats += 1;
                    inner.heartbeat_consumed = false;
                    Self::feed(&mut inner, Frame::Heartbeat);
                    Fire::Beat
                }
            };

            match fire {
                Fire::Dead => {
                    self.remote_closed().await;
                    return;
                }
                Fire::Stop => return,
                Fire::Beat => {}
            }
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        write!(f, "id={:?}", self.id)?;
        match inner.state {
            SessionState::Open => write!(f, " connected")?,
            SessionState::Closed => write!(f, " closed")?,
            _ => write!(f, " disconnected")?,
        }
        if inner.acquired {
            write!(f, " acquired")?;
        }
        if !inner.queue.is_empty() {
            write!(f, " queue[{}]", inner.queue.len())?;
        }
        if inner.hits > 0 {
            write!(f, " hits={}", inner.hits)?;
        }
        if inner.heartbeats > 0 {
            write!(f, " heartbeats={}", inner.heartbeats)?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.inner.get_mut().heartbeat_task.take() {
            task.abort();
        }
    }
}

fn preview(message: &str) -> String {
    if message.len() <= 200 {
        message.to_string()
    } else {
        message.chars().take(200).collect()
    }
}
