//! Client for the card battle game.
//!
//! The session core (protocol, selection, state machine, reconnect policy)
//! is platform independent; `web` drives it from a browser page.

pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod protocol;
pub mod reconnect;
pub mod selection;
pub mod session;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use protocol::{Card, ClientMessage, ServerEvent, Stat};
pub use session::{Effect, SessionState};
