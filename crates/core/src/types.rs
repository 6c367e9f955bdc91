//! Domain types for KPI values read from the spreadsheet.

use std::fmt;

/// A resolved KPI cell value.
///
/// Formula cells are resolved to their computed result before they get here,
/// so downstream code never sees formula text.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum KpiValue {
    /// A numeric value (including date serials).
    Number(f64),
    /// A text value.
    Text(String),
    /// No value; renders as the empty string.
    #[default]
    Absent,
}

impl KpiValue {
    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether this value renders as nothing.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Render the value as replacement text.
    pub fn render(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
            Self::Absent => String::new(),
        }
    }
}

impl fmt::Display for KpiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<f64> for KpiValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for KpiValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for KpiValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Format a number in shortest round-trip form.
///
/// Integral values print without a fraction (`1000`), and negative zero
/// prints as `0`. Magnitudes from `1e21` up and below `1e-6` use exponent
/// form with an explicit sign (`1e+21`, `1.5e-7`).
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        };
    }
    format!("{}", n)
}

/// Placeholder key to value mapping, in spreadsheet row order.
///
/// Keys are unique. Inserting an existing key replaces its value but keeps
/// the position of the first occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiMap {
    entries: Vec<(String, KpiValue)>,
}

impl KpiMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a KPI.
    pub fn insert(&mut self, key: impl Into<String>, value: KpiValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up a KPI by key.
    pub fn get(&self, key: &str) -> Option<&KpiValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KpiValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, KpiValue)> for KpiMap {
    fn from_iter<I: IntoIterator<Item = (K, KpiValue)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Direction of a trend, used to pick an arrow image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendDirection {
    Ascending,
    Descending,
    Stable,
}

impl TrendDirection {
    /// Classify a KPI value by sign. Anything that is not a strictly
    /// positive or strictly negative number is stable.
    pub fn from_value(value: Option<&KpiValue>) -> Self {
        match value.and_then(KpiValue::as_number) {
            Some(n) if n < 0.0 => Self::Descending,
            Some(n) if n > 0.0 => Self::Ascending,
            _ => Self::Stable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
            Self::Stable => "stable",
        }
    }
}
