//! Fancifier rewrites your own outgoing chat messages in place.
//!
//! Every outgoing message in a configured chat runs through that chat's
//! plugin chain. When the chain changes the text and the message is still
//! the newest one in its chat, the daemon edits it through the transport.
//! Configuration is hot-reloaded without dropping in-flight events.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod providers;

pub mod daemon;
pub mod pipeline;
pub mod plugins;
pub mod safeguard;
pub mod telegram;
pub mod transport;
