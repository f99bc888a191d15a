//! Loads point records from CSV, validates them against a fixed region and
//! renders them as a dot map or a choropleth.

pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod parser;
pub mod projector;
pub mod regions;
pub mod render;
pub mod scale;
pub mod stats;
pub mod types;
pub mod validate;
pub mod view;

pub use data::{Ingestor, LoadOutcome, LoadStatus, PointSet, SourceLocator};
pub use error::{ErrorKind, IngestError, IngestResult};
pub use types::{DataPoint, GeoCoord, RegionBounds, ScreenPoint};
pub use view::{InputEvent, MapMode, MapView, RenderState, Scene, ViewOptions};
