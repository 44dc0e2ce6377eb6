//! Long-poll channel client.
//!
//! [`RemoteChannel::run`] owns the receive loop: it polls the controller, tracks the
//! session, applies the server-driven retry cadence and hands named events to the
//! [`Dispatcher`]. [`Emitter`] is the cloneable send side given to listeners.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use warden_core::config::RemoteConfig;
use warden_core::metrics as m;

use crate::dispatch::Dispatcher;
use crate::error::RemoteError;
use crate::message::{Action, Message, Outgoing, decode_payload};
use crate::transport::{HttpResponse, Transport};

/// Event name fired after a session is established
pub const CONNECT_EVENT: &str = "connect";
/// Event name fired after a session ends
pub const DISCONNECT_EVENT: &str = "disconnect";

const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Channel tuning
#[derive(Debug, Clone, Copy)]
pub struct ChannelSettings {
    /// Pause before reconnecting after a session ends
    pub reconnect_delay: Duration,
    /// Initial upper bound of the retry back-off; the server may change it
    pub max_retry_interval: Duration,
    /// Per-listener queue capacity
    pub listener_queue_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(30),
            max_retry_interval: Duration::from_secs(10),
            listener_queue_capacity: 32,
        }
    }
}

impl From<&RemoteConfig> for ChannelSettings {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            max_retry_interval: Duration::from_secs(config.max_retry_interval_secs),
            listener_queue_capacity: config.listener_queue_capacity,
        }
    }
}

/// Delay before polling again after a `retry` answer.
///
/// Grows with the time since the last real message, never below one second and
/// never above `max` (itself at least one second).
pub fn retry_delay(since_last_message: Duration, max: Duration) -> Duration {
    since_last_message
        .max(MIN_RETRY_INTERVAL)
        .min(max.max(MIN_RETRY_INTERVAL))
}

#[derive(Debug)]
struct Session {
    state: ChannelState,
    sid: Option<String>,
    last_message: Instant,
    max_retry_interval: Duration,
}

struct Shared<T> {
    transport: T,
    session: RwLock<Session>,
}

impl<T> Shared<T> {
    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }

    fn state(&self) -> ChannelState {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }
}

/// Send side of the channel.
pub struct Emitter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> Emitter<T> {
    /// Sends a named event with a JSON payload.
    ///
    /// # Errors
    /// [`RemoteError::NotConnected`] without a session; transport and status errors
    /// otherwise.
    pub async fn emit(&self, name: &str, data: &Value) -> Result<(), RemoteError> {
        let sid = {
            let session = self
                .shared
                .session
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if session.state != ChannelState::Connected {
                return Err(RemoteError::NotConnected);
            }
            session.sid.clone()
        };

        let response = self
            .shared
            .transport
            .send(sid.as_deref(), &Outgoing::event(name, data))
            .await?;
        if !(200..300).contains(&response.status) {
            return Err(RemoteError::Status(response.status));
        }
        tracing::debug!(event = name, "event emitted");
        Ok(())
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }
}

/// What the receive loop does after a poll
enum Step {
    /// Poll again right away
    Continue,
    /// Poll again after the given back-off
    Retry(Duration),
    /// End the session and reconnect after the configured delay
    Reconnect,
}

/// Receive side of the channel.
pub struct RemoteChannel<T> {
    shared: Arc<Shared<T>>,
    dispatcher: Dispatcher,
    settings: ChannelSettings,
}

impl<T: Transport> RemoteChannel<T> {
    pub fn new(transport: T, settings: ChannelSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                session: RwLock::new(Session {
                    state: ChannelState::Disconnected,
                    sid: None,
                    last_message: Instant::now(),
                    max_retry_interval: settings.max_retry_interval,
                }),
            }),
            dispatcher: Dispatcher::new(settings.listener_queue_capacity),
            settings,
        }
    }

    pub fn emitter(&self) -> Emitter<T> {
        Emitter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Registers a listener for `event`. Must be called inside a tokio runtime.
    pub fn on<F, Fut>(&mut self, event: &str, handler: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.register(event, handler);
        self
    }

    /// Runs the receive loop until `token` is cancelled.
    ///
    /// Transient failures end the session and reconnect after the configured delay.
    /// On cancellation an open session is closed without reconnecting.
    ///
    /// # Errors
    /// [`RemoteError::Protocol`] when the endpoint does not speak the channel protocol.
    pub async fn run(self, token: CancellationToken) -> Result<(), RemoteError> {
        tracing::info!("remote channel started");
        let result = self.receive_loop(&token).await;

        self.end_session().await;
        match &result {
            Ok(()) => tracing::info!("remote channel stopped"),
            Err(e) => tracing::error!(error = %e, "remote channel stopped"),
        }
        self.dispatcher.shutdown().await;
        result
    }

    async fn receive_loop(&self, token: &CancellationToken) -> Result<(), RemoteError> {
        while !token.is_cancelled() {
            let sid = self.shared.with_session(|s| {
                if s.state == ChannelState::Disconnected {
                    s.state = ChannelState::Connecting;
                    s.sid = None;
                    s.last_message = Instant::now();
                }
                s.sid.clone()
            });

            let polled = tokio::select! {
                () = token.cancelled() => break,
                polled = self.shared.transport.poll(sid.as_deref()) => polled,
            };

            let step = match polled {
                Ok(response) => self.on_response(response)?,
                // a silent controller is only expected while the session is being set up
                Err(RemoteError::Timeout) if self.shared.state() != ChannelState::Connected => {
                    Step::Continue
                }
                Err(e @ RemoteError::Protocol(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "poll failed");
                    Step::Reconnect
                }
            };

            let pause = match step {
                Step::Continue => continue,
                Step::Retry(delay) => delay,
                Step::Reconnect => {
                    self.end_session().await;
                    metrics::counter!(m::REMOTE_RECONNECTS_TOTAL).increment(1);
                    tracing::info!(
                        delay_secs = self.settings.reconnect_delay.as_secs(),
                        "reconnect scheduled"
                    );
                    self.settings.reconnect_delay
                }
            };

            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }
        Ok(())
    }

    fn on_response(&self, response: HttpResponse) -> Result<Step, RemoteError> {
        if response.status != 200 && response.status != 404 {
            tracing::warn!(status = response.status, "unexpected poll status");
            return Ok(Step::Reconnect);
        }
        let message = Message::parse(&response.body)?;

        if message.action == Action::Retry {
            let delay = self
                .shared
                .with_session(|s| retry_delay(s.last_message.elapsed(), s.max_retry_interval));
            return Ok(Step::Retry(delay));
        }
        self.shared.with_session(|s| s.last_message = Instant::now());

        match message.action {
            Action::Connect => {
                let Some(sid) = message.sid else {
                    return Err(RemoteError::Protocol(
                        "connect without session id".to_owned(),
                    ));
                };
                tracing::info!(sid = %sid, "remote session established");
                self.shared.with_session(|s| {
                    s.sid = Some(sid);
                    s.state = ChannelState::Connected;
                });
                self.dispatcher.dispatch(CONNECT_EVENT, &Value::Null);
            }
            Action::Event => match message.name {
                Some(name) => {
                    self.dispatcher
                        .dispatch(&name, &decode_payload(message.data));
                }
                None => tracing::warn!("event without name ignored"),
            },
            Action::Disconnect => {
                if self.shared.state() == ChannelState::Connected {
                    tracing::info!("controller closed the session");
                    return Ok(Step::Reconnect);
                }
            }
            Action::SetMaxMsgInterval => match interval_secs(&message.data) {
                Some(secs) => {
                    let max = Duration::from_secs(secs).max(MIN_RETRY_INTERVAL);
                    tracing::debug!(max_secs = max.as_secs(), "retry interval updated");
                    self.shared.with_session(|s| s.max_retry_interval = max);
                }
                None => tracing::warn!(data = %message.data, "invalid max message interval"),
            },
            Action::Retry => {}
            Action::Unknown => tracing::debug!("unknown action ignored"),
        }
        Ok(Step::Continue)
    }

    /// Closes the current session, telling the controller when one was open.
    async fn end_session(&self) {
        let (was_connected, sid) = self.shared.with_session(|s| {
            let was_connected = s.state == ChannelState::Connected;
            s.state = ChannelState::Disconnected;
            (was_connected, s.sid.take())
        });
        if !was_connected {
            return;
        }

        if let Err(e) = self
            .shared
            .transport
            .send(sid.as_deref(), &Outgoing::disconnect())
            .await
        {
            tracing::debug!(error = %e, "disconnect notice not delivered");
        }
        self.dispatcher.dispatch(DISCONNECT_EVENT, &Value::Null);
        tracing::info!("remote session closed");
    }
}

fn interval_secs(data: &Value) -> Option<u64> {
    match decode_payload(data.clone()) {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
        _ => None,
    }
}
