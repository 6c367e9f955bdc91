//! Composing a finished deck from a template and a KPI map.

use crate::deck::Deck;
use crate::images::{PlacedImage, TrendImageInjector};
use crate::rewrite::substitute_slides;
use kpi_core::{GeneratorConfig, KpiMap, Result, SubstitutionPlan};
use std::path::PathBuf;

/// What a composition run changed.
#[derive(Debug, Clone, Default)]
pub struct CompositionSummary {
    pub slides: usize,
    pub replacements: usize,
    pub images: Vec<PlacedImage>,
}

/// Applies KPI substitutions and, when configured, trend images to a deck.
pub struct DeckComposer<'a> {
    config: &'a GeneratorConfig,
    images_dir: PathBuf,
}

impl<'a> DeckComposer<'a> {
    /// Create a composer. Trend images are read from `images_dir`.
    pub fn new(config: &'a GeneratorConfig, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            images_dir: images_dir.into(),
        }
    }

    /// Rewrite every slide with the KPI values, then place trend images.
    pub fn compose(&self, deck: &mut Deck, kpis: &KpiMap) -> Result<CompositionSummary> {
        let options = &self.config.substitution;
        let plan = SubstitutionPlan::build(kpis, options, self.config.images_enabled())?;
        log::debug!(
            "Substituting {} placeholders ({:?} scope, {:?} keys)",
            plan.replacements().len(),
            options.scope,
            options.key_matching
        );

        let replacements = substitute_slides(deck, &plan, options.scope)?;

        let images = match &self.config.images {
            Some(images) => TrendImageInjector::new(images, &self.images_dir).inject(deck, kpis)?,
            None => Vec::new(),
        };

        Ok(CompositionSummary {
            slides: deck.slide_count(),
            replacements,
            images,
        })
    }
}
