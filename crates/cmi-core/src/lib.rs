//! Core domain + application logic for the CountMeIn poll bot.
//!
//! This crate is intentionally framework-agnostic. The chat transport, the
//! persistent store and the outbound delivery channel live behind ports
//! (traits) implemented in adapter crates.

pub mod app;
pub mod config;
pub mod conversation;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod events;
pub mod keyboard;
pub mod logging;
pub mod outbox;
pub mod poll;
pub mod store;
pub mod texts;
pub mod vote;

pub use errors::{Error, Result};
