//! The interactive map surface.
//!
//! `MapView` owns the viewport and the interaction state, and turns the
//! current point set into a [`Scene`]. Work is split by what it depends on:
//!
//! * color and radius scales depend only on the point set,
//! * choropleth bins depend only on the point set and the partitioning,
//! * screen positions depend on the point set and the viewport.
//!
//! Each is recomputed only when its inputs change. Input events are queued
//! and folded into a single viewport update per [`MapView::frame`] call.

use crate::aggregate::{aggregate, AggregationBin, Partitioning};
use crate::data::PointSet;
use crate::projector::Viewport;
use crate::scale::{Breakpoint, ColorScale, Palette, RadiusScale, ScaleKind};
use crate::types::{GeoCoord, RegionBounds, ScreenPoint};
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const EMPTY_MESSAGE: &str =
    "No data to display. Load a CSV with columns: name, latitude, longitude, value, category";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MapMode {
    Dot,
    Choropleth,
}

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub bounds: RegionBounds,
    pub width: u32,
    pub height: u32,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Quiet period after the last wheel event before zooming ends.
    pub debounce: Duration,
    pub palette: Palette,
    pub scale_kind: ScaleKind,
    pub min_radius: f64,
    pub max_radius: f64,
    pub no_data: Rgba<u8>,
    pub partitioning: Partitioning,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            bounds: RegionBounds::NSW,
            width: 960,
            height: 720,
            min_zoom: 0.0,
            max_zoom: 6.0,
            debounce: Duration::from_millis(150),
            palette: Palette::default(),
            scale_kind: ScaleKind::Linear,
            min_radius: 3.0,
            max_radius: 12.0,
            no_data: Rgba([217, 217, 217, 255]),
            partitioning: Partitioning::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown(ScreenPoint),
    PointerMove(ScreenPoint),
    PointerUp(ScreenPoint),
    /// `delta` in zoom levels, positive zooms in.
    Wheel { delta: f64, at: ScreenPoint },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    Panning { last: ScreenPoint },
    Zooming { last_wheel: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderState {
    /// No points to show.
    Idle,
    Ready {
        mode: MapMode,
        interaction: Option<Interaction>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// Index into the point set.
    pub point: usize,
    pub position: ScreenPoint,
    pub radius: f64,
    pub fill: Rgba<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinShade {
    /// Index into the scene's bins.
    pub bin: usize,
    pub top_left: ScreenPoint,
    pub bottom_right: ScreenPoint,
    pub fill: Rgba<u8>,
    pub has_data: bool,
}

#[derive(Debug, Clone)]
pub enum Scene {
    Empty {
        message: String,
    },
    Dots {
        markers: Vec<Marker>,
        legend: Vec<Breakpoint>,
    },
    Choropleth {
        bins: Arc<[AggregationBin]>,
        shades: Vec<BinShade>,
        legend: Vec<Breakpoint>,
    },
}

/// Call counters for the expensive steps, used to check caching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub scale_builds: usize,
    pub aggregations: usize,
    pub projection_passes: usize,
    pub viewport_updates: usize,
}

#[derive(Debug)]
struct Scales {
    color: ColorScale,
    radius: RadiusScale,
}

#[derive(Debug, Default)]
struct PendingInput {
    pan: (f64, f64),
    zoom: f64,
    anchor: Option<ScreenPoint>,
}

impl PendingInput {
    fn is_empty(&self) -> bool {
        self.pan == (0.0, 0.0) && self.zoom == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SceneKey {
    points: u64,
    viewport: u64,
    mode: MapMode,
}

pub struct MapView {
    options: ViewOptions,
    mode: MapMode,
    on_mode_change: Box<dyn FnMut(MapMode)>,
    points: PointSet,
    points_epoch: u64,
    viewport: Viewport,
    viewport_version: u64,
    interaction: Option<Interaction>,
    pending: PendingInput,
    scales: Option<(u64, Arc<Scales>)>,
    bins: Option<(u64, Arc<[AggregationBin]>)>,
    scene: Scene,
    scene_key: Option<SceneKey>,
    stats: RenderStats,
}

impl MapView {
    pub fn new(options: ViewOptions, mode: MapMode, on_mode_change: impl FnMut(MapMode) + 'static) -> Self {
        let viewport = initial_viewport(&options);
        Self {
            options,
            mode,
            on_mode_change: Box::new(on_mode_change),
            points: PointSet::empty(),
            points_epoch: 0,
            viewport,
            viewport_version: 0,
            interaction: None,
            pending: PendingInput::default(),
            scales: None,
            bins: None,
            scene: Scene::Empty {
                message: EMPTY_MESSAGE.to_string(),
            },
            scene_key: None,
            stats: RenderStats::default(),
        }
    }

    pub fn state(&self) -> RenderState {
        if self.points.is_empty() {
            RenderState::Idle
        } else {
            RenderState::Ready {
                mode: self.mode,
                interaction: self.interaction,
            }
        }
    }

    pub fn mode(&self) -> MapMode {
        self.mode
    }

    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Swaps in a new point set. Passing the set already shown is a no-op.
    pub fn set_points(&mut self, points: PointSet) {
        if self.points_epoch > 0 && self.points.same_as(&points) {
            return;
        }
        info!(version = points.version(), points = points.len(), "map received point set");
        self.points = points;
        self.points_epoch += 1;
        self.scales = None;
        self.bins = None;
        if self.points.is_empty() {
            self.interaction = None;
            self.pending = PendingInput::default();
        }
    }

    /// Mode change decided by the caller.
    pub fn set_mode(&mut self, mode: MapMode) {
        if self.mode != mode {
            debug!(?mode, "switching map mode");
            self.mode = mode;
        }
    }

    /// Mode toggle from within the map; reported upward, not applied.
    pub fn request_mode(&mut self, mode: MapMode) {
        if self.mode != mode {
            (self.on_mode_change)(mode);
        }
    }

    /// Restores the initial viewport, as on an explicit reload.
    pub fn reload(&mut self) {
        self.viewport = initial_viewport(&self.options);
        self.viewport_version += 1;
        self.interaction = None;
        self.pending = PendingInput::default();
    }

    pub fn handle_event(&mut self, event: InputEvent, now: Instant) {
        if self.points.is_empty() {
            return;
        }
        match event {
            InputEvent::PointerDown(p) => {
                self.interaction = Some(Interaction::Panning { last: p });
            }
            InputEvent::PointerMove(p) => {
                if let Some(Interaction::Panning { last }) = self.interaction {
                    self.queue_pan(last, p);
                    self.interaction = Some(Interaction::Panning { last: p });
                }
            }
            InputEvent::PointerUp(p) => {
                if let Some(Interaction::Panning { last }) = self.interaction {
                    self.queue_pan(last, p);
                    self.interaction = None;
                }
            }
            InputEvent::Wheel { delta, at } => {
                if delta.is_finite() {
                    self.pending.zoom += delta;
                    self.pending.anchor = Some(at);
                }
                if !matches!(self.interaction, Some(Interaction::Panning { .. })) {
                    self.interaction = Some(Interaction::Zooming { last_wheel: now });
                }
            }
        }
    }

    fn queue_pan(&mut self, from: ScreenPoint, to: ScreenPoint) {
        self.pending.pan.0 += to.x - from.x;
        self.pending.pan.1 += to.y - from.y;
    }

    /// Advances one animation frame: applies queued input once, ends a wheel
    /// zoom after the debounce period, and returns the scene, rebuilding it
    /// only if the points, viewport or mode changed.
    pub fn frame(&mut self, now: Instant) -> &Scene {
        if let Some(Interaction::Zooming { last_wheel }) = self.interaction {
            if now.saturating_duration_since(last_wheel) >= self.options.debounce {
                self.interaction = None;
            }
        }

        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            let before = self.viewport;
            if pending.pan != (0.0, 0.0) {
                self.viewport.pan_by(pending.pan.0, pending.pan.1);
            }
            if pending.zoom != 0.0 {
                let (w, h) = self.viewport.size();
                let anchor = pending.anchor.unwrap_or(ScreenPoint::new(w / 2.0, h / 2.0));
                self.viewport.zoom_at(pending.zoom, anchor);
            }
            if self.viewport != before {
                self.viewport_version += 1;
                self.stats.viewport_updates += 1;
            }
        }

        let key = SceneKey {
            points: self.points_epoch,
            viewport: self.viewport_version,
            mode: self.mode,
        };
        if self.scene_key != Some(key) {
            self.scene = self.build_scene();
            self.scene_key = Some(key);
        }
        &self.scene
    }

    /// Current scene without advancing a frame.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scales(&mut self) -> Arc<Scales> {
        match &self.scales {
            Some((epoch, scales)) if *epoch == self.points_epoch => Arc::clone(scales),
            _ => {
                let points = self.points.points();
                let scales = Arc::new(Scales {
                    color: ColorScale::build(points, &self.options.palette, self.options.scale_kind),
                    radius: RadiusScale::build(points, self.options.min_radius, self.options.max_radius),
                });
                self.stats.scale_builds += 1;
                self.scales = Some((self.points_epoch, Arc::clone(&scales)));
                scales
            }
        }
    }

    fn bins(&mut self) -> Arc<[AggregationBin]> {
        match &self.bins {
            Some((epoch, bins)) if *epoch == self.points_epoch => Arc::clone(bins),
            _ => {
                let bins: Arc<[AggregationBin]> = aggregate(
                    self.points.points(),
                    &self.options.partitioning,
                    &self.options.bounds,
                )
                .into();
                self.stats.aggregations += 1;
                debug!(bins = bins.len(), "aggregated points into bins");
                self.bins = Some((self.points_epoch, Arc::clone(&bins)));
                bins
            }
        }
    }

    fn build_scene(&mut self) -> Scene {
        if self.points.is_empty() {
            return Scene::Empty {
                message: EMPTY_MESSAGE.to_string(),
            };
        }

        let scales = self.scales();
        let legend = scales.color.breakpoints();
        self.stats.projection_passes += 1;

        match self.mode {
            MapMode::Dot => {
                let markers = self
                    .points
                    .points()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| {
                        self.viewport.project_visible(p.coord()).map(|position| Marker {
                            point: i,
                            position,
                            radius: scales.radius.radius_for(p.value),
                            fill: scales.color.color_for(p.value),
                        })
                    })
                    .collect();
                Scene::Dots { markers, legend }
            }
            MapMode::Choropleth => {
                let bins = self.bins();
                let shades = bins
                    .iter()
                    .enumerate()
                    .filter_map(|(i, bin)| {
                        let extent = bin.boundary.extent();
                        let top_left = self.viewport.project(GeoCoord::new(extent.max_lat, extent.min_lon));
                        let bottom_right = self.viewport.project(GeoCoord::new(extent.min_lat, extent.max_lon));
                        self.overlaps_canvas(top_left, bottom_right).then(|| BinShade {
                            bin: i,
                            top_left,
                            bottom_right,
                            fill: bin
                                .mean
                                .map_or(self.options.no_data, |m| scales.color.color_for(m)),
                            has_data: bin.count > 0,
                        })
                    })
                    .collect();
                Scene::Choropleth { bins, shades, legend }
            }
        }
    }

    fn overlaps_canvas(&self, top_left: ScreenPoint, bottom_right: ScreenPoint) -> bool {
        let (w, h) = self.viewport.size();
        top_left.x <= w && bottom_right.x >= 0.0 && top_left.y <= h && bottom_right.y >= 0.0
    }
}

fn initial_viewport(options: &ViewOptions) -> Viewport {
    Viewport::new(
        options.bounds,
        options.width,
        options.height,
        options.min_zoom,
        options.max_zoom,
    )
}
