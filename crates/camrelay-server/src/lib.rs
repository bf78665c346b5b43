//! # camrelay-server
//!
//! The relay proper: keeps the last camera frame announced over pub/sub and
//! serves it over HTTP.
//!
//! - [`subscriber::EventSubscriber`]: applies `preview` notifications to the
//!   shared [`LastFrame`](camrelay_core::LastFrame) cell
//! - [`query`]: the `GET /` endpoint returning `{"src": ...}`
//! - [`idle::IdleLifecycleManager`]: debounced countdown that shuts the relay
//!   down when nobody has queried it for a while
//! - [`shutdown::ShutdownCoordinator`]: one `CancellationToken` for the whole process
//! - [`relay::Relay`]: wiring and ordered teardown

#![deny(unsafe_code)]

pub mod config;
pub mod idle;
pub mod query;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod subscriber;

pub use config::RelayConfig;
pub use idle::{IdleLifecycleManager, IdleState};
pub use relay::{Relay, RunningRelay};
pub use server::{ListenHandle, RelayServer};
pub use shutdown::{ShutdownCoordinator, ShutdownReason};
pub use subscriber::EventSubscriber;
