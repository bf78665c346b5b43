//! # camrelay-core
//!
//! Shared vocabulary for the camera frame relay:
//!
//! - **Frames**: [`Origin`] (immutable base URL) and [`LastFrame`] (the single
//!   last-write-wins cell holding the most recent absolute frame URL)
//! - **Events**: [`PreviewEvent`], the payload of the `preview` notification
//! - **Errors**: [`RelayError`] via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//! - **Defaults**: startup constants in [`constants`]

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod frame;
pub mod logging;

pub use errors::{RelayError, Result};
pub use events::PreviewEvent;
pub use frame::{LastFrame, Origin};
