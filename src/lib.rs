//! StompMQ - Embeddable STOMP 1.1 message broker over WebSocket
//!
//! Clients connect over WebSocket, subscribe to topic destinations with
//! `*`/`**` wildcards, and publish messages; the broker fans each SEND out
//! to every matching subscriber on other sessions, and to in-process
//! subscribers registered through the host [`Broker`] façade. Liveness is
//! tracked with STOMP 1.1 heartbeats; every command runs through a
//! user-extensible middleware pipeline.

pub mod broker;
pub mod codec;
pub mod config;
pub mod destination;
pub mod heartbeat;
pub mod middleware;
pub mod protocol;
pub mod session;
pub mod transport;

pub use broker::{Broker, BrokerConfig, BrokerEvent, Connection};
pub use config::Config;
pub use destination::{Subscription, SubscriptionStore};
pub use heartbeat::Heartbeat;
pub use middleware::{Flow, Interceptor, Pipeline};
pub use protocol::{Body, Command, Frame, Headers, ProtocolError};
pub use session::{Session, SessionState};
pub use transport::{MockTransport, Transport, TransportError};
