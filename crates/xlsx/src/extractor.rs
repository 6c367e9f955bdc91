//! KPI extraction from a worksheet.

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use kpi_core::types::format_number;
use kpi_core::{Error, KpiMap, KpiValue, Result, SpreadsheetConfig, WorksheetSelector};
use std::io::{Read, Seek};
use std::path::Path;

/// Reads a two-column KPI table (placeholder name, value) from a worksheet.
///
/// Columns and rows are 1-based, as in the spreadsheet UI.
#[derive(Debug, Clone)]
pub struct KpiExtractor {
    worksheet: WorksheetSelector,
    name_column: u32,
    value_column: u32,
    start_row: u32,
}

impl KpiExtractor {
    /// Create an extractor for the given layout.
    pub fn new(worksheet: WorksheetSelector, name_column: u32, value_column: u32, start_row: u32) -> Self {
        Self {
            worksheet,
            name_column,
            value_column,
            start_row,
        }
    }

    /// Create an extractor from the spreadsheet section of the config.
    pub fn from_config(config: &SpreadsheetConfig) -> Self {
        Self::new(
            config.worksheet_index_or_name.clone(),
            config.placeholders_column_index,
            config.values_column_index,
            config.data_row_start_index,
        )
    }

    /// Open an xlsx file and extract its KPIs.
    pub fn extract_file(&self, path: &Path) -> Result<KpiMap> {
        let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| {
            Error::SpreadsheetLoadError(format!("Failed to open '{}': {}", path.display(), e))
        })?;
        let range = self.read_worksheet(&mut workbook)?;
        self.extract_from_range(&range)
    }

    /// Extract KPIs from an xlsx workbook held in any seekable reader.
    pub fn extract<R: Read + Seek>(&self, reader: R) -> Result<KpiMap> {
        let mut workbook = Xlsx::new(reader)
            .map_err(|e| Error::SpreadsheetLoadError(format!("Failed to open workbook: {}", e)))?;
        let range = self.read_worksheet(&mut workbook)?;
        self.extract_from_range(&range)
    }

    /// Resolve the worksheet selector and load the sheet's cells.
    fn read_worksheet<R: Read + Seek>(&self, workbook: &mut Xlsx<R>) -> Result<Range<Data>> {
        let names = workbook.sheet_names();
        let name = match &self.worksheet {
            WorksheetSelector::Index(index) => index
                .checked_sub(1)
                .and_then(|i| names.get(i))
                .cloned(),
            WorksheetSelector::Name(name) => names.iter().find(|n| *n == name).cloned(),
        }
        .ok_or_else(|| {
            Error::WorksheetNotFoundError(format!(
                "{} (available: {})",
                self.worksheet,
                names.join(", ")
            ))
        })?;

        log::debug!("Reading worksheet '{}'", name);
        workbook.worksheet_range(&name).map_err(|e| {
            Error::SpreadsheetLoadError(format!("Failed to read worksheet '{}': {}", name, e))
        })
    }

    /// Pair placeholder names with values, row by row, from the start row to
    /// the last used row.
    ///
    /// Rows where both cells are empty are skipped. A value without a name
    /// means the two columns are out of step and fails the whole extraction.
    pub fn extract_from_range(&self, range: &Range<Data>) -> Result<KpiMap> {
        if self.name_column == 0 || self.value_column == 0 || self.start_row == 0 {
            return Err(Error::ConfigError(
                "Spreadsheet columns and rows are 1-based".to_string(),
            ));
        }

        let mut kpis = KpiMap::new();

        let Some((last_row, _)) = range.end() else {
            log::warn!("Worksheet {} is empty", self.worksheet);
            return Ok(kpis);
        };

        let name_col = self.name_column - 1;
        let value_col = self.value_column - 1;

        for row in (self.start_row - 1)..=last_row {
            let name = cell_name(range.get_value((row, name_col)));
            let value = cell_value(range.get_value((row, value_col)));

            match name {
                Some(name) => kpis.insert(name, value),
                None if value.is_absent() => continue,
                None => {
                    return Err(Error::KpiLayoutError(format!(
                        "Row {} has a value ({}) but no placeholder name; \
                         placeholder names and values are misaligned",
                        row + 1,
                        value
                    )));
                }
            }
        }

        Ok(kpis)
    }
}

/// Placeholder name of a cell, or None if the cell is blank.
fn cell_name(cell: Option<&Data>) -> Option<String> {
    let name = match cell? {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => bool_text(*b).to_string(),
        Data::DateTime(dt) => format_number(dt.as_f64()),
    };
    (!name.is_empty()).then_some(name)
}

/// Resolve a value cell. Formula cells carry their cached result here.
fn cell_value(cell: Option<&Data>) -> KpiValue {
    match cell {
        None | Some(Data::Empty) => KpiValue::Absent,
        Some(Data::String(s)) if s.is_empty() => KpiValue::Absent,
        Some(Data::String(s)) | Some(Data::DateTimeIso(s)) | Some(Data::DurationIso(s)) => {
            KpiValue::Text(s.clone())
        }
        Some(Data::Int(i)) => KpiValue::Number(*i as f64),
        Some(Data::Float(f)) => KpiValue::Number(*f),
        Some(Data::Bool(b)) => KpiValue::Text(bool_text(*b).to_string()),
        Some(Data::DateTime(dt)) => KpiValue::Number(dt.as_f64()),
        Some(Data::Error(e)) => {
            log::warn!("Cell error {:?} treated as an empty value", e);
            KpiValue::Absent
        }
    }
}

fn bool_text(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}
