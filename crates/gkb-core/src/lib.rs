//! Core domain + application logic for the gated-content Telegram bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and MongoDB live
//! behind ports (traits) implemented in adapter crates.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod continuation;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod forms;
pub mod logging;
pub mod menu;
pub mod messaging;
pub mod ports;
pub mod session;

pub use errors::{Error, Result};
