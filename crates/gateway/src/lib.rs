//! Gas price notification gateway.
//!
//! Clients connect over WebSocket, register price conditions and receive
//! every price update published on the broker channel while subscribed.
//!
//! ## Architecture
//!
//! ```text
//! Broker channel (Redis pub/sub)
//!         ↓
//! Subscription relay task (one per client condition)
//!         ↓
//! Outbound (per-connection write lock)
//!         ↓
//! WebSocket client ← Session (reads commands, owns subscriptions)
//! ```

pub mod config;
pub mod counter;
pub mod error;
pub mod outbound;
pub mod protocol;
pub mod session;
pub mod subscription;
pub mod ws_server;

pub use config::{BrokerKind, ForwardPolicy, GatewayConfig};
pub use counter::{ConnectionCounter, ConnectionGuard};
pub use error::{GatewayError, Result};
pub use outbound::Outbound;
pub use protocol::{
    Command, CommandKind, Confirmation, Criteria, Operator, PriceUpdate, SubscriptionKey, Tier,
};
pub use session::Session;
pub use subscription::{RelayConfig, Subscription};
pub use ws_server::{create_router, AppState, StatsResponse};
