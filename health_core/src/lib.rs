#![forbid(unsafe_code)]

//! Typed client for a native health-data service.
//!
//! This crate provides:
//! - Identifier enums and the identifier capability registry
//! - Units, unit families and preferred-unit resolution
//! - Domain records (samples, correlations, workouts, statistics)
//! - The bridge trait and the marshalling between wire and typed forms
//! - Change subscriptions fanned out from one event stream
//! - An in-memory bridge backed by a JSON fixture

pub mod error;
pub mod identifiers;
pub mod units;
pub mod registry;
pub mod types;
pub mod bridge;
pub mod marshal;
pub mod memory;
pub mod subscription;
pub mod client;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{BridgeError, Error, Result};
pub use identifiers::*;
pub use types::*;
pub use units::{resolve_unit, Unit, UnitFamily, UnitRequest};
pub use registry::{Registry, RegistryEntry};
pub use bridge::HealthBridge;
pub use memory::{Fixture, MemoryBridge};
pub use subscription::{Subscription, SubscriptionUpdate};
pub use client::{HealthClient, QueryOptions, WorkoutQueryOptions};
pub use config::Config;
