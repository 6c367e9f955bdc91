//! XLSX backend for reading KPI tables.
//!
//! Reads a placeholder column and a value column from one worksheet and
//! resolves each value to a [`kpi_core::KpiValue`].

pub mod extractor;

pub use extractor::KpiExtractor;
