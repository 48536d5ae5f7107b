//! Core types and configuration for the price statistics system.
//!
//! This crate provides shared types used across all other crates:
//! - Observation and derived record types
//! - Lookup and price-basis selectors
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, RollingPeriodConfig, SeriesSettings};
pub use error::{Error, Result};
pub use types::*;
