//! Rate Relay: resilient P2P exchange-rate acquisition and delivery.
//!
//! This library crate exposes the core modules for integration testing.

pub mod audit;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod pipeline;
pub mod renderer;
pub mod scheduler;
pub mod scraper;
pub mod server;
