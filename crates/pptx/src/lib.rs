//! PPTX (Office Open XML) backend for KPI deck generation.
//!
//! A .pptx file is a ZIP archive of XML parts. The template is loaded in
//! full, slide parts are rewritten in memory, and the archive is written
//! back out under a new name.

pub mod composer;
pub mod deck;
pub mod images;
pub mod rewrite;

#[cfg(test)]
pub(crate) mod fixtures;

pub use composer::{CompositionSummary, DeckComposer};
pub use deck::Deck;
pub use images::{PlacedImage, TrendImageInjector, TREND_KPI_KEYS};
pub use rewrite::{rewrite_document, rewrite_text_nodes, substitute_slides};
