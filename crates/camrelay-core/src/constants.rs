//! Startup defaults shared by the relay crates.

use std::time::Duration;

/// Default origin of the camera pub/sub server.
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8000";
/// Default pub/sub namespace carrying preview notifications.
pub const DEFAULT_NAMESPACE: &str = "/cam";
/// Default HTTP port for the query endpoint.
pub const DEFAULT_PORT: u16 = 3001;
/// Default bind host for the query endpoint.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default idle countdown before the relay shuts itself down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5000);
/// Name of the pub/sub event announcing a new frame.
pub const PREVIEW_EVENT: &str = "preview";
