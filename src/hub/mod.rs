//! Connection to the homee hub.
//!
//! A session is opened in two steps:
//! - Request an access token over HTTP with the user's credentials
//! - Open the WebSocket with that token and ask for the full state

pub mod auth;
pub mod session;

pub use session::{DeviceSession, HubSession};

/// Port of the hub's local API, both HTTP and WebSocket.
pub const HUB_PORT: u16 = 7681;
