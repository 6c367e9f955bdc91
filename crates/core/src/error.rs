//! Error types for KPI deck generation.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while generating a deck from KPI data.
///
/// Every variant is fatal to the run; nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// Low-level I/O failure not covered by a more specific variant.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The generator configuration is missing, malformed, or inconsistent.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The KPI spreadsheet could not be opened or decoded.
    #[error("Failed to load spreadsheet: {0}")]
    SpreadsheetLoadError(String),

    /// The worksheet selector did not match any worksheet.
    #[error("Worksheet not found: {0}")]
    WorksheetNotFoundError(String),

    /// Placeholder names and values do not line up row for row.
    #[error("KPI layout error: {0}")]
    KpiLayoutError(String),

    /// The deck template is missing or structurally invalid.
    #[error("Failed to load template: {0}")]
    TemplateLoadError(String),

    /// Applying replacements produced invalid slide content, or a key
    /// pattern could not be compiled.
    #[error("Substitution error: {0}")]
    SubstitutionError(String),

    /// A trend image asset could not be read or is of an unsupported type.
    #[error("Failed to load image: {0}")]
    ImageLoadError(String),

    /// The output deck could not be written.
    #[error("Failed to write output: {0}")]
    WriteError(String),
}
