//! `vitalsync` - Real-time telemetry synchronization for mmWave vital-signs dashboards
//!
//! This library maintains a bounded, always-consistent view of a live radar
//! sensor stream: WebSocket transport channels with automatic reconnection,
//! typed message routing, and a reducer-driven state store whose aggregated
//! collections never grow without bound.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod bounded;
pub mod channel;
pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod registry;
pub mod router;
pub mod store;
pub mod telemetry;

pub use channel::{ConnectionPhase, ReconnectPolicy, TransportChannel};
pub use config::Config;
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use registry::{ChannelName, ChannelRegistry};
pub use router::{MessageRouter, SubscriptionHandle};
pub use store::{LiveStateStore, StateSnapshot, StoreLimits};
