//! CLI tool that fills a PowerPoint template with KPI values from a spreadsheet.

use anyhow::{Context, Result};
use clap::Parser;
use kpi_core::{GeneratorConfig, CONFIG_FILE_NAME};
use kpi_pptx::{Deck, DeckComposer};
use kpi_xlsx::KpiExtractor;
use std::path::{Path, PathBuf};

/// Generate a KPI deck from the assets folder.
///
/// The assets folder holds generator.config.json, the spreadsheet, the
/// template, and an images/ folder for trend arrows.
#[derive(Parser, Debug)]
#[command(name = "kpi-deck")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Assets folder (default: ./assets, or next to the executable in packaged builds)
    #[arg(short, long)]
    assets: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stdout)
        .init();

    let assets = match args.assets {
        Some(dir) => dir,
        None => default_assets_folder()?,
    };

    let config_path = assets.join(CONFIG_FILE_NAME);
    let config = GeneratorConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    run(&config, &assets)?;
    Ok(())
}

/// Assets folder under the current working directory.
#[cfg(not(feature = "packaged"))]
fn default_assets_folder() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    Ok(cwd.join("assets"))
}

/// Assets folder next to the executable.
#[cfg(feature = "packaged")]
fn default_assets_folder() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the executable")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Executable has no parent directory"))?;
    Ok(dir.join("assets"))
}

/// Load the KPIs, fill the template, and save the output deck.
///
/// Returns the path of the written deck.
fn run(config: &GeneratorConfig, assets: &Path) -> Result<PathBuf> {
    let sheet = &config.kpi_excel_file_config;
    let excel_path = assets.join(&sheet.filename);
    log::info!("Loading KPI from {}", excel_path.display());
    let kpis = KpiExtractor::from_config(sheet)
        .extract_file(&excel_path)
        .with_context(|| format!("Failed to load KPIs from {}", excel_path.display()))?;
    log::info!("KPI loaded ({} entries)", kpis.len());

    let template_path = assets.join(&config.template_ppt_file_name);
    log::info!("Generating PowerPoint from {}", template_path.display());
    let mut deck = Deck::open(&template_path)
        .with_context(|| format!("Failed to load template {}", template_path.display()))?;

    let summary = DeckComposer::new(config, assets.join("images"))
        .compose(&mut deck, &kpis)
        .context("Failed to fill the template")?;
    log::info!(
        "Applied {} replacements across {} slides",
        summary.replacements,
        summary.slides
    );
    if !summary.images.is_empty() {
        log::info!("Placed {} trend images", summary.images.len());
    }

    let output_path = assets.join(&config.output_ppt_file_name);
    deck.save(&output_path)
        .with_context(|| format!("Failed to save {}", output_path.display()))?;
    log::info!("PowerPoint generated and saved at {}", output_path.display());

    Ok(output_path)
}
