//! Core domain types, configuration, and placeholder substitution
//! for generating KPI decks.

pub mod config;
pub mod error;
pub mod substitute;
pub mod types;

pub use config::{
    GeneratorConfig, ImagePlacement, SpreadsheetConfig, SubstitutionOptions, TrendImagesConfig,
    WorksheetSelector, CONFIG_FILE_NAME,
};
pub use error::{Error, Result};
pub use substitute::{KeyMatching, Replacement, SubstitutionPlan, SubstitutionScope};
pub use types::{KpiMap, KpiValue, TrendDirection};
