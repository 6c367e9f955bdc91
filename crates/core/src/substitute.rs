//! Placeholder substitution plan.
//!
//! A [`SubstitutionPlan`] is built once from the KPI map and then applied to
//! every piece of slide text. Entries are applied in map order, each one over
//! the output of the previous one, in a single pass. A later key can match
//! text that an earlier replacement introduced, and applying a plan twice is
//! not a no-op in general.

use crate::config::SubstitutionOptions;
use crate::types::format_number;
use crate::{Error, KpiMap, KpiValue, Result};
use regex::{NoExpand, Regex};
use serde::Deserialize;
use std::borrow::Cow;

/// Prefix of trend value KPIs (`tvgrowth` replaces `growth`).
pub const TREND_VALUE_PREFIX: &str = "tv";

/// Prefix of KPIs consumed only by the trend image step.
pub const IMAGE_ONLY_PREFIX: &str = "img";

/// Where replacements are applied within a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionScope {
    /// Inside each text node only; markup is never touched.
    #[default]
    Text,
    /// Over the whole serialized slide, which is re-parsed afterwards.
    Document,
}

/// How placeholder keys are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMatching {
    /// Keys match themselves exactly; regex metacharacters are escaped.
    #[default]
    Literal,
    /// Keys are regular expressions.
    Pattern,
}

/// One compiled replacement.
#[derive(Debug, Clone)]
pub struct Replacement {
    /// Effective key, after stripping any `tv` prefix.
    pub key: String,
    /// Text inserted in place of every match.
    pub text: String,
    matching: KeyMatching,
    pattern: Regex,
}

impl Replacement {
    /// Replace every match of this key in `haystack` with `text`, inserted
    /// verbatim (no `$1` expansion).
    pub fn replace_with<'h>(&self, haystack: &'h str, text: &str) -> Cow<'h, str> {
        self.pattern.replace_all(haystack, NoExpand(text))
    }

    /// Number of matches of this key in `haystack`.
    pub fn count_in(&self, haystack: &str) -> usize {
        self.pattern.find_iter(haystack).count()
    }

    pub fn matching(&self) -> KeyMatching {
        self.matching
    }

    /// The same replacement for a different key, compiled with the same
    /// matching mode.
    pub fn rekeyed(&self, key: &str) -> Result<Self> {
        Ok(Self {
            key: key.to_string(),
            text: self.text.clone(),
            matching: self.matching,
            pattern: compile_key(key, self.matching)?,
        })
    }
}

/// Ordered list of replacements derived from a KPI map.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionPlan {
    replacements: Vec<Replacement>,
}

impl SubstitutionPlan {
    /// Build a plan from the KPI map.
    ///
    /// When `skip_image_only` is set, `img`-prefixed keys are left out.
    pub fn build(kpis: &KpiMap, options: &SubstitutionOptions, skip_image_only: bool) -> Result<Self> {
        let mut replacements = Vec::with_capacity(kpis.len());

        for (key, value) in kpis.iter() {
            if skip_image_only && key.starts_with(IMAGE_ONLY_PREFIX) {
                log::debug!("Skipping image-only KPI '{}'", key);
                continue;
            }

            let (key, text) = match key.strip_prefix(TREND_VALUE_PREFIX) {
                Some(stripped) if options.format_trend_values => {
                    (stripped, format_trend_value(value).render())
                }
                Some(stripped) => (stripped, value.render()),
                None => (key, value.render()),
            };

            if key.is_empty() {
                log::warn!("Skipping KPI with empty placeholder key");
                continue;
            }

            let pattern = compile_key(key, options.key_matching)?;
            replacements.push(Replacement {
                key: key.to_string(),
                text,
                matching: options.key_matching,
                pattern,
            });
        }

        Ok(Self { replacements })
    }

    pub fn replacements(&self) -> &[Replacement] {
        &self.replacements
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Apply every replacement to `text` in order.
    ///
    /// Returns the new text and the total number of matches replaced.
    pub fn apply(&self, text: &str) -> (String, usize) {
        let mut current = text.to_string();
        let mut replaced = 0;
        for replacement in &self.replacements {
            let count = replacement.count_in(&current);
            if count == 0 {
                continue;
            }
            replaced += count;
            current = replacement
                .replace_with(&current, &replacement.text)
                .into_owned();
        }
        (current, replaced)
    }
}

fn compile_key(key: &str, matching: KeyMatching) -> Result<Regex> {
    let source = match matching {
        KeyMatching::Literal => regex::escape(key),
        KeyMatching::Pattern => key.to_string(),
    };
    Regex::new(&source).map_err(|e| {
        Error::SubstitutionError(format!("Invalid placeholder pattern '{}': {}", key, e))
    })
}

/// Round a trend value to one decimal and mark positive values with `+`.
///
/// Halves round toward positive infinity. Non-numeric values pass through.
pub fn format_trend_value(value: &KpiValue) -> KpiValue {
    match value {
        KpiValue::Number(n) if n.is_finite() => {
            let scaled = n * 10.0;
            let mut rounded = scaled.round();
            // f64::round sends negative halves away from zero.
            if rounded - scaled == -0.5 {
                rounded += 1.0;
            }
            let rounded = rounded / 10.0;
            if rounded > 0.0 {
                KpiValue::Text(format!("+{}", format_number(rounded)))
            } else {
                KpiValue::Number(rounded)
            }
        }
        other => other.clone(),
    }
}
