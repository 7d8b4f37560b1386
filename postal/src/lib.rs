//! Outbox-to-SMTP relay.
//!
//! [`controller::Postal`] is the deserialized settings file; running it opens
//! the outbox, starts the local and outer dispatch lanes, and drains them
//! when an operator asks it to stop.

pub mod config;
pub mod controller;

pub use controller::Postal;
