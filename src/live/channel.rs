//! Live-update channel and subscription registry
//!
//! One push connection is shared by every subscription. While the connection
//! is open, subscriptions are registered push-side and updates are dispatched
//! from inbound frames. Otherwise each subscription runs its own poll timer
//! against the content store.
//!
//! ```text
//! Connecting ──ok──► Open ──close──► Reconnecting ──ok──► Open
//!     │                                   │
//!     └──────── max failures ─────────────┴──► DegradedPolling (terminal)
//! ```
//!
//! Registry state sits behind a `std::sync::Mutex` that is never held across
//! an `.await`. Callbacks are invoked after the lock is released.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{ControlFrame, InboundFrame, SubscriptionId, Topic};
use super::transport::{PushConnector, PushLink, WebSocketConnector};
use crate::config::LiveConfig;
use crate::content::ContentStore;
use crate::error::{EngineError, Result};

/// Update callback; receives the payload of each update
pub type Callback = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Reconnecting,
    DegradedPolling,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Reconnecting => "reconnecting",
            ChannelState::DegradedPolling => "degraded_polling",
        }
    }
}

/// How a subscription currently receives updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Push,
    Poll,
}

/// Poll task owned by exactly one subscription; aborted on drop
struct PollTimer(JoinHandle<()>);

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Delivery {
    Push,
    Poll(PollTimer),
}

struct Subscription {
    topic: Topic,
    callback: Callback,
    /// Cleared on unsubscribe so an in-progress delivery is dropped
    active: Arc<AtomicBool>,
    delivery: Delivery,
}

impl Subscription {
    fn mode(&self) -> DeliveryMode {
        match self.delivery {
            Delivery::Push => DeliveryMode::Push,
            Delivery::Poll(_) => DeliveryMode::Poll,
        }
    }
}

struct Registry {
    state: ChannelState,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    /// Sender of the open push link, if any
    outbound: Option<mpsc::UnboundedSender<String>>,
}

impl Registry {
    /// Queue a control frame on the open link
    fn send(&self, frame: &ControlFrame) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or(EngineError::ChannelClosed)?;
        let text = serde_json::to_string(frame)?;
        outbound.send(text).map_err(|_| EngineError::ChannelClosed)
    }
}

struct Inner {
    registry: Mutex<Registry>,
    store: Arc<dyn ContentStore>,
    config: LiveConfig,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_poll(
        &self,
        id: SubscriptionId,
        topic: &Topic,
        callback: Callback,
        active: Arc<AtomicBool>,
    ) -> PollTimer {
        let store = self.store.clone();
        let interval = self.config.poll_interval();
        let path = topic.poll_path();

        PollTimer(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match store.fetch(&path).await {
                    Ok(Some(payload)) => {
                        if active.load(Ordering::Acquire) {
                            callback(payload);
                        }
                    }
                    Ok(None) => {
                        debug!(subscription = %id, path = %path, "Poll found no data");
                    }
                    Err(e) => {
                        warn!(subscription = %id, path = %path, error = %e, "Poll fetch failed");
                    }
                }
            }
        }))
    }

    /// Push link established: (re)register every subscription push-side.
    /// A subscription whose subscribe frame could not be queued polls.
    fn on_open(&self, outbound: mpsc::UnboundedSender<String>) {
        let mut registry = self.registry();
        registry.state = ChannelState::Open;
        registry.outbound = Some(outbound);

        let ids: Vec<SubscriptionId> = registry.subscriptions.keys().copied().collect();
        let mut still_polling = 0;
        for id in ids {
            let Some(sub) = registry.subscriptions.get(&id) else {
                continue;
            };
            let delivery = match registry.send(&ControlFrame::subscribe(id, &sub.topic)) {
                // Dropping the poll timer aborts it
                Ok(()) => Delivery::Push,
                Err(e) => {
                    warn!(subscription = %id, error = %e, "Subscribe frame not sent, polling");
                    still_polling += 1;
                    match sub.delivery {
                        Delivery::Poll(_) => continue,
                        Delivery::Push => Delivery::Poll(self.spawn_poll(
                            id,
                            &sub.topic,
                            sub.callback.clone(),
                            sub.active.clone(),
                        )),
                    }
                }
            };
            if let Some(sub) = registry.subscriptions.get_mut(&id) {
                sub.delivery = delivery;
            }
        }

        info!(
            subscriptions = registry.subscriptions.len(),
            still_polling = still_polling,
            "Live channel open"
        );
    }

    fn on_close(&self) {
        let mut registry = self.registry();
        registry.outbound = None;
        if registry.state != ChannelState::DegradedPolling {
            registry.state = ChannelState::Reconnecting;
        }
    }

    fn on_failure(&self) {
        let mut registry = self.registry();
        if registry.state == ChannelState::Connecting || registry.state == ChannelState::Open {
            registry.state = ChannelState::Reconnecting;
        }
    }

    /// Give up on push for the rest of the session
    fn enter_degraded(&self) {
        let mut registry = self.registry();
        if registry.state == ChannelState::DegradedPolling {
            return;
        }
        registry.state = ChannelState::DegradedPolling;
        registry.outbound = None;

        let push_ids: Vec<SubscriptionId> = registry
            .subscriptions
            .iter()
            .filter(|(_, sub)| matches!(sub.delivery, Delivery::Push))
            .map(|(id, _)| *id)
            .collect();

        for id in &push_ids {
            let Some(sub) = registry.subscriptions.get(id) else {
                continue;
            };
            let timer = self.spawn_poll(*id, &sub.topic, sub.callback.clone(), sub.active.clone());
            if let Some(sub) = registry.subscriptions.get_mut(id) {
                sub.delivery = Delivery::Poll(timer);
            }
        }

        warn!(
            switched = push_ids.len(),
            "Live channel degraded, polling for the rest of the session"
        );
    }

    fn dispatch(&self, text: &str) {
        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed live frame");
                return;
            }
        };

        match frame {
            InboundFrame::Update {
                subscription_id,
                payload,
            } => {
                let target = self
                    .registry()
                    .subscriptions
                    .get(&subscription_id)
                    .filter(|sub| matches!(sub.delivery, Delivery::Push))
                    .map(|sub| (sub.callback.clone(), sub.active.clone()));

                match target {
                    Some((callback, active)) if active.load(Ordering::Acquire) => callback(payload),
                    _ => debug!(subscription = %subscription_id, "Update for unknown subscription"),
                }
            }
            InboundFrame::Error {
                subscription_id,
                message,
            } => {
                warn!(subscription = ?subscription_id, message = %message, "Live endpoint error");
            }
        }
    }
}

/// Delay before reconnect attempt `attempt` (0-based): `base * 2^attempt`
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

async fn run_connection(inner: Arc<Inner>, connector: Arc<dyn PushConnector>) {
    let base = inner.config.reconnect_base();
    let max_attempts = inner.config.max_reconnect_attempts;
    let mut failures: u32 = 0;

    loop {
        match connector.connect().await {
            Ok(PushLink {
                outbound,
                mut inbound,
            }) => {
                failures = 0;
                inner.on_open(outbound);

                while let Some(text) = inbound.recv().await {
                    inner.dispatch(&text);
                }

                warn!("Live channel closed");
                inner.on_close();
            }
            Err(e) => {
                failures += 1;
                warn!(
                    attempt = failures,
                    max_attempts = max_attempts,
                    error = %e,
                    "Live channel connect failed"
                );
                inner.on_failure();

                if failures >= max_attempts {
                    inner.enter_degraded();
                    return;
                }
            }
        }

        let delay = reconnect_delay(base, failures.saturating_sub(1));
        info!(delay_ms = delay.as_millis() as u64, "Reconnecting live channel");
        tokio::time::sleep(delay).await;
    }
}

/// Shared push channel plus the subscription registry.
///
/// Must be used from within a tokio runtime: poll timers and the connection
/// loop are tokio tasks.
pub struct LiveChannel {
    inner: Arc<Inner>,
    connection: Mutex<Option<JoinHandle<()>>>,
}

impl LiveChannel {
    pub fn new(store: Arc<dyn ContentStore>, config: LiveConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    state: ChannelState::Connecting,
                    subscriptions: HashMap::new(),
                    outbound: None,
                }),
                store,
                config,
            }),
            connection: Mutex::new(None),
        }
    }

    /// Connect to the configured endpoint, or poll if there is none
    pub fn start(&self) {
        match self.inner.config.endpoint_url.clone() {
            Some(url) => self.start_with(Arc::new(WebSocketConnector::new(url))),
            None => {
                info!("No live endpoint configured");
                self.inner.enter_degraded();
            }
        }
    }

    /// Run the connection loop over `connector`
    pub fn start_with(&self, connector: Arc<dyn PushConnector>) {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if connection.is_some() {
            debug!("Live channel already started");
            return;
        }
        *connection = Some(tokio::spawn(run_connection(self.inner.clone(), connector)));
    }

    pub fn state(&self) -> ChannelState {
        self.inner.registry().state
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry().subscriptions.len()
    }

    pub fn delivery_mode(&self, id: SubscriptionId) -> Option<DeliveryMode> {
        self.inner.registry().subscriptions.get(&id).map(Subscription::mode)
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> SubscriptionId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        let callback: Callback = Arc::new(callback);
        let active = Arc::new(AtomicBool::new(true));

        let mut registry = self.inner.registry();
        let pushed = registry.state == ChannelState::Open
            && registry.send(&ControlFrame::subscribe(id, &topic)).is_ok();
        let delivery = if pushed {
            Delivery::Push
        } else {
            Delivery::Poll(
                self.inner
                    .spawn_poll(id, &topic, callback.clone(), active.clone()),
            )
        };

        let mode = match delivery {
            Delivery::Push => DeliveryMode::Push,
            Delivery::Poll(_) => DeliveryMode::Poll,
        };
        debug!(subscription = %id, topic = %topic, mode = ?mode, "Subscribed");

        registry.subscriptions.insert(
            id,
            Subscription {
                topic,
                callback,
                active,
                delivery,
            },
        );
        id
    }

    /// Remove a subscription.
    ///
    /// Deliveries that have not reached the `active` check are dropped. The
    /// check and the callback are not atomic, so on a multi-thread runtime a
    /// delivery already past the check may still complete after this
    /// returns. On a current-thread runtime (as the binary uses) no callback
    /// for `id` runs after this returns.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.inner.registry();
        let Some(sub) = registry.subscriptions.remove(&id) else {
            return false;
        };

        sub.active.store(false, Ordering::Release);
        if matches!(sub.delivery, Delivery::Push) {
            if let Err(e) = registry.send(&ControlFrame::unsubscribe(id, &sub.topic)) {
                debug!(subscription = %id, error = %e, "Unsubscribe frame not sent");
            }
        }
        drop(registry);

        debug!(subscription = %id, topic = %sub.topic, "Unsubscribed");
        // Poll timer, if any, is aborted here
        drop(sub);
        true
    }

    /// Stop the connection loop and every poll timer
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        let subscriptions = {
            let mut registry = self.inner.registry();
            registry.outbound = None;
            std::mem::take(&mut registry.subscriptions)
        };
        for sub in subscriptions.values() {
            sub.active.store(false, Ordering::Release);
        }
        info!(dropped = subscriptions.len(), "Live channel shut down");
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        if let Some(handle) = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
