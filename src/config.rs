use crate::aggregate::Partitioning;
use crate::regions::RegionSet;
use crate::scale::{hex_to_rgba, Palette, ScaleKind};
use crate::types::RegionBounds;
use crate::view::ViewOptions;
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Every section is optional; an empty file means NSW with default styling.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub region: RegionBounds,
    pub scale: ScaleConfig,
    pub view: ViewConfig,
    pub aggregation: AggregationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScaleConfig {
    pub palette: Vec<String>, // Hex codes, cold to hot
    pub kind: ScaleKind,
    pub min_radius: f64,
    pub max_radius: f64,
    pub no_data_color: String,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            palette: ["#2c7bb6", "#abd9e9", "#ffffbf", "#fdae61", "#d7191c"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            kind: ScaleKind::Linear,
            min_radius: 3.0,
            max_radius: 12.0,
            no_data_color: "#d9d9d9".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewConfig {
    pub width: u32,
    pub height: u32,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub debounce_ms: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 720,
            min_zoom: 0.0,
            max_zoom: 6.0,
            debounce_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AggregationConfig {
    Grid {
        rows: usize,
        cols: usize,
    },
    Regions {
        geojson: PathBuf,
        #[serde(default = "default_name_property")]
        name_property: String,
    },
}

fn default_name_property() -> String {
    "name".to_string()
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig::Grid { rows: 8, cols: 8 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub image: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::from("map.png"),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.check()?;
        Ok(config)
    }

    /// An explicit path must exist. Without one, `config.toml` in the working
    /// directory is used if present, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from_file(default)
                } else {
                    tracing::info!("no {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn check(&self) -> Result<()> {
        let r = &self.region;
        ensure!(
            r.min_lat < r.max_lat && r.min_lon < r.max_lon,
            "region bounds are empty or inverted"
        );
        ensure!(
            self.scale.min_radius >= 0.0 && self.scale.min_radius <= self.scale.max_radius,
            "min_radius must be between 0 and max_radius"
        );
        ensure!(
            self.view.width > 0 && self.view.height > 0,
            "view width and height must be positive"
        );
        ensure!(
            self.view.min_zoom <= self.view.max_zoom,
            "min_zoom must not exceed max_zoom"
        );
        if let AggregationConfig::Grid { rows, cols } = self.aggregation {
            ensure!(rows > 0 && cols > 0, "grid needs at least one row and column");
        }
        Palette::from_hex(&self.scale.palette).context("Invalid scale palette")?;
        hex_to_rgba(&self.scale.no_data_color).context("Invalid no_data_color")?;
        Ok(())
    }

    pub fn partitioning(&self) -> Result<Partitioning> {
        Ok(match &self.aggregation {
            AggregationConfig::Grid { rows, cols } => Partitioning::Grid {
                rows: *rows,
                cols: *cols,
            },
            AggregationConfig::Regions {
                geojson,
                name_property,
            } => Partitioning::Regions(Arc::new(RegionSet::load(geojson, name_property)?)),
        })
    }

    pub fn view_options(&self) -> Result<ViewOptions> {
        Ok(ViewOptions {
            bounds: self.region,
            width: self.view.width,
            height: self.view.height,
            min_zoom: self.view.min_zoom,
            max_zoom: self.view.max_zoom,
            debounce: Duration::from_millis(self.view.debounce_ms),
            palette: Palette::from_hex(&self.scale.palette)?,
            scale_kind: self.scale.kind,
            min_radius: self.scale.min_radius,
            max_radius: self.scale.max_radius,
            no_data: hex_to_rgba(&self.scale.no_data_color)?,
            partitioning: self.partitioning()?,
        })
    }
}
