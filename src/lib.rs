//! Portfolio Site Configuration Library
//!
//! This module exports the resolution engine, the consumer bindings, and the
//! CLI runners for testing and integration.

pub mod bindings;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
