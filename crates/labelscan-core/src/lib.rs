//! # labelscan-core
//!
//! Shared types for the labelscan pipeline:
//! - `Error`/`Result` used across all crates
//! - Centralized default constants
//! - Structured-logging field name constants
//! - The analysis data model (records, flags, structured items)

pub mod defaults;
pub mod error;
pub mod logging;
pub mod record;

pub use error::{Error, Result};
pub use record::{
    AnalysisRecord, CallFailure, Decision, ImageFormat, ImagePayload, IngredientItem,
    NutritionItem, PrecheckInfo, QualityFlags, ReportNumberValidation, Suitability,
};
