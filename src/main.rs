use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use nsw_map::config::AppConfig;
use nsw_map::data::{Ingestor, LoadOutcome, SourceLocator};
use nsw_map::render::{self, RenderStyle};
use nsw_map::validate::Validator;
use nsw_map::view::{MapMode, MapView};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the point data to a PNG map
    Render {
        /// Config file; `config.toml` is used if present when omitted
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// CSV file to load; the bundled sample data when omitted
        #[arg(short, long, value_name = "CSV")]
        input: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = MapMode::Dot)]
        mode: MapMode,
        /// Overrides `output.image` from the config
        #[arg(short, long, value_name = "PNG")]
        output: Option<PathBuf>,
    },
    /// Validate a CSV file and print a summary as JSON
    Check {
        /// Config file; `config.toml` is used if present when omitted
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(short, long, value_name = "CSV")]
        input: Option<PathBuf>,
    },
}

fn locator(input: &Option<PathBuf>) -> SourceLocator {
    match input {
        Some(path) => SourceLocator::Path(path.clone()),
        None => SourceLocator::Sample,
    }
}

async fn load(config: &AppConfig, input: &Option<PathBuf>) -> anyhow::Result<nsw_map::PointSet> {
    let ingestor = Ingestor::new(Validator::new(config.region));
    let source = locator(input);
    match ingestor.load_from_source(&source).await {
        Ok(LoadOutcome::Applied(points)) => Ok(points),
        Ok(LoadOutcome::Superseded) => bail!("load of {} was superseded", source),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", source)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render {
            config,
            input,
            mode,
            output,
        } => {
            let app_config = AppConfig::load_or_default(config.as_deref())?;
            let points = load(&app_config, input).await?;

            let mut view = MapView::new(app_config.view_options()?, *mode, |_| {});
            view.set_points(points);
            view.frame(Instant::now());

            let img = render::rasterize(view.scene(), view.viewport(), &RenderStyle::default());
            let path = output.clone().unwrap_or_else(|| app_config.output.image.clone());
            render::write_png(&img, &path)?;
            info!(mode = ?view.mode(), stats = ?view.stats(), "render complete");
        }
        Commands::Check { config, input } => {
            let app_config = AppConfig::load_or_default(config.as_deref())?;
            let points = load(&app_config, input).await?;
            let summary = points.summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
