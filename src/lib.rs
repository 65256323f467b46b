// src/lib.rs

//! Content scheduling engine: confidence-weighted selection, budget and
//! diversity enforcement, atomic idempotent reservations, and audience
//! fatigue monitoring.

pub mod alerts;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reservation;
pub mod saturation;
pub mod scheduler;
pub mod selection;
pub mod stats;
pub mod store;
pub mod tasks;
pub mod types;

pub use config::{EngineConfig, OrchestratorConfig};
pub use error::CoreError;
pub use scheduler::{ScheduleOutcome, ScheduleState, Scheduler};
pub use types::{Item, RestrictionSet, SchedulePlan, ScheduleRequest};
