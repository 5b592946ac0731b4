//! Live updates
//!
//! Topic subscriptions delivered over a shared push connection, falling back
//! to per-subscription polling of the content store.

mod channel;
mod messages;
mod transport;

pub use channel::{reconnect_delay, Callback, ChannelState, DeliveryMode, LiveChannel};
pub use messages::{ControlFrame, InboundFrame, SubscriptionId, Topic};
pub use transport::{PushConnector, PushLink, WebSocketConnector};
