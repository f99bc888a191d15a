use crate::regions::RegionSet;
use crate::types::{DataPoint, GeoCoord, RegionBounds};
use geo::{BoundingRect, Contains, Point};
use std::sync::Arc;

/// How choropleth mode carves the region into bins.
#[derive(Debug, Clone)]
pub enum Partitioning {
    /// Equal-sized cells over the region bounding box; row 0 is the northern edge.
    Grid { rows: usize, cols: usize },
    /// Named polygons, e.g. local government areas.
    Regions(Arc<RegionSet>),
}

impl Default for Partitioning {
    fn default() -> Self {
        Partitioning::Grid { rows: 8, cols: 8 }
    }
}

#[derive(Debug, Clone)]
pub enum BinBoundary {
    Cell(RegionBounds),
    Region { set: Arc<RegionSet>, index: usize },
}

impl BinBoundary {
    pub fn contains(&self, coord: GeoCoord) -> bool {
        match self {
            BinBoundary::Cell(cell) => cell.contains(coord),
            BinBoundary::Region { set, index } => set.regions()[*index]
                .geometry
                .contains(&Point::new(coord.lon, coord.lat)),
        }
    }

    /// Geographic bounding box of the boundary.
    pub fn extent(&self) -> RegionBounds {
        match self {
            BinBoundary::Cell(cell) => *cell,
            BinBoundary::Region { set, index } => match set.regions()[*index].geometry.bounding_rect() {
                Some(r) => RegionBounds {
                    min_lat: r.min().y,
                    max_lat: r.max().y,
                    min_lon: r.min().x,
                    max_lon: r.max().x,
                },
                None => RegionBounds {
                    min_lat: 0.0,
                    max_lat: 0.0,
                    min_lon: 0.0,
                    max_lon: 0.0,
                },
            },
        }
    }
}

/// One choropleth area with the statistics of the points inside it.
#[derive(Debug, Clone)]
pub struct AggregationBin {
    pub label: String,
    pub boundary: BinBoundary,
    pub count: usize,
    /// `None` when the bin holds no points.
    pub mean: Option<f64>,
}

/// Assigns every point to exactly one bin and builds fresh bins, empty ones
/// included, in a stable order.
pub fn aggregate(points: &[DataPoint], partitioning: &Partitioning, bounds: &RegionBounds) -> Vec<AggregationBin> {
    match partitioning {
        Partitioning::Grid { rows, cols } => aggregate_grid(points, (*rows).max(1), (*cols).max(1), bounds),
        Partitioning::Regions(set) => aggregate_regions(points, set),
    }
}

fn aggregate_grid(points: &[DataPoint], rows: usize, cols: usize, bounds: &RegionBounds) -> Vec<AggregationBin> {
    let cell_h = bounds.lat_span() / rows as f64;
    let cell_w = bounds.lon_span() / cols as f64;

    let mut acc = Accumulator::new(rows * cols);
    for p in points {
        // `as` saturates, so stray or NaN offsets still land in an edge cell.
        let row = (((bounds.max_lat - p.latitude) / cell_h) as usize).min(rows - 1);
        let col = (((p.longitude - bounds.min_lon) / cell_w) as usize).min(cols - 1);
        acc.add(row * cols + col, p.value);
    }

    acc.finish(|i| {
        let (row, col) = (i / cols, i % cols);
        let cell = RegionBounds {
            min_lat: bounds.max_lat - (row + 1) as f64 * cell_h,
            max_lat: bounds.max_lat - row as f64 * cell_h,
            min_lon: bounds.min_lon + col as f64 * cell_w,
            max_lon: bounds.min_lon + (col + 1) as f64 * cell_w,
        };
        (format!("r{}c{}", row, col), BinBoundary::Cell(cell))
    })
}

fn aggregate_regions(points: &[DataPoint], set: &Arc<RegionSet>) -> Vec<AggregationBin> {
    let mut acc = Accumulator::new(set.len());
    for p in points {
        acc.add(set.locate(p.coord()), p.value);
    }
    acc.finish(|index| {
        (
            set.regions()[index].name.clone(),
            BinBoundary::Region {
                set: Arc::clone(set),
                index,
            },
        )
    })
}

struct Accumulator {
    counts: Vec<usize>,
    sums: Vec<f64>,
}

impl Accumulator {
    fn new(bins: usize) -> Self {
        Self {
            counts: vec![0; bins],
            sums: vec![0.0; bins],
        }
    }

    fn add(&mut self, bin: usize, value: f64) {
        self.counts[bin] += 1;
        self.sums[bin] += value;
    }

    fn finish(self, describe: impl Fn(usize) -> (String, BinBoundary)) -> Vec<AggregationBin> {
        self.counts
            .into_iter()
            .zip(self.sums)
            .enumerate()
            .map(|(i, (count, sum))| {
                let (label, boundary) = describe(i);
                AggregationBin {
                    label,
                    boundary,
                    count,
                    mean: (count > 0).then(|| sum / count as f64),
                }
            })
            .collect()
    }
}
