//! Generator configuration, loaded once from `generator.config.json`.
//!
//! The configuration is a plain value passed to each stage of the pipeline.
//! File names are relative to the assets folder.

use crate::substitute::{KeyMatching, SubstitutionScope};
use crate::{Error, Result, TrendDirection};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// File name of the configuration inside the assets folder.
pub const CONFIG_FILE_NAME: &str = "generator.config.json";

/// Top-level generator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Where to find the KPIs in the spreadsheet.
    pub kpi_excel_file_config: SpreadsheetConfig,

    /// Template deck file name.
    pub template_ppt_file_name: String,

    /// Output deck file name.
    pub output_ppt_file_name: String,

    /// Trend images; when present, image injection is enabled and
    /// `img`-prefixed KPIs are not substituted as text.
    #[serde(default)]
    pub images: Option<TrendImagesConfig>,

    #[serde(default)]
    pub substitution: SubstitutionOptions,
}

impl GeneratorConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Whether the trend image step runs.
    pub fn images_enabled(&self) -> bool {
        self.images.is_some()
    }

    fn validate(&self) -> Result<()> {
        let sheet = &self.kpi_excel_file_config;
        for (field, value) in [
            ("placeholdersColumnIndex", sheet.placeholders_column_index),
            ("valuesColumnIndex", sheet.values_column_index),
            ("dataRowStartIndex", sheet.data_row_start_index),
        ] {
            if value == 0 {
                return Err(Error::ConfigError(format!(
                    "{} is 1-based and must be at least 1",
                    field
                )));
            }
        }
        if let WorksheetSelector::Index(0) = sheet.worksheet_index_or_name {
            return Err(Error::ConfigError(
                "worksheetIndexOrName is 1-based and must be at least 1".to_string(),
            ));
        }
        if let Some(images) = &self.images {
            let (w, h) = images.placement.size;
            if w <= 0.0 || h <= 0.0 {
                return Err(Error::ConfigError(format!(
                    "Image size must be positive, got {}x{}",
                    w, h
                )));
            }
        }
        Ok(())
    }
}

/// Spreadsheet layout of the KPI table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetConfig {
    pub filename: String,
    pub worksheet_index_or_name: WorksheetSelector,
    /// 1-based column holding placeholder names.
    pub placeholders_column_index: u32,
    /// 1-based column holding values.
    pub values_column_index: u32,
    /// 1-based row of the first KPI.
    pub data_row_start_index: u32,
}

/// Selects a worksheet by 1-based position or by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WorksheetSelector {
    Index(usize),
    Name(String),
}

impl fmt::Display for WorksheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{}", i),
            Self::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Image file names per trend direction, inside `<assets>/images`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendImagesConfig {
    pub stable: String,
    pub ascending: String,
    pub descending: String,
    #[serde(default)]
    pub placement: ImagePlacement,
}

impl TrendImagesConfig {
    /// File name of the image for a direction.
    pub fn file_for(&self, direction: TrendDirection) -> &str {
        match direction {
            TrendDirection::Ascending => &self.ascending,
            TrendDirection::Descending => &self.descending,
            TrendDirection::Stable => &self.stable,
        }
    }
}

/// Where the four trend images go. Coordinates and size are in points.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImagePlacement {
    /// Zero-based slide position.
    pub slide_index: usize,
    /// Top-left corner for `img_1` through `img_4`.
    pub positions: [(f64, f64); 4],
    /// Width and height shared by all four images.
    pub size: (f64, f64),
}

impl Default for ImagePlacement {
    fn default() -> Self {
        Self {
            slide_index: 3,
            positions: [(150.0, 210.0), (800.0, 210.0), (150.0, 400.0), (800.0, 400.0)],
            size: (50.0, 50.0),
        }
    }
}

/// Substitution behavior switches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubstitutionOptions {
    pub scope: SubstitutionScope,
    pub key_matching: KeyMatching,
    /// Round `tv` values to one decimal and add `+` to positive ones.
    pub format_trend_values: bool,
}

impl Default for SubstitutionOptions {
    fn default() -> Self {
        Self {
            scope: SubstitutionScope::default(),
            key_matching: KeyMatching::default(),
            format_trend_values: true,
        }
    }
}
