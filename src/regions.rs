use crate::types::GeoCoord;
use anyhow::{anyhow, ensure, Context, Result};
use geo::{BoundingRect, Centroid, Contains, MultiPolygon, Point};
use geojson::GeoJson;
use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject, AABB};
use std::fs;
use std::path::Path;
use tracing::info;

/// A named sub-region used as a choropleth bin.
#[derive(Debug, Clone)]
pub struct NamedRegion {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

// Bounding box of one region, indexed by position in `RegionSet::regions`.
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Region polygons with an envelope index for containment lookups and a
/// centroid index for points that fall between polygons.
pub struct RegionSet {
    regions: Vec<NamedRegion>,
    envelopes: RTree<RegionEnvelope>,
    centroids: RTree<GeomWithData<[f64; 2], usize>>,
}

impl std::fmt::Debug for RegionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionSet")
            .field("regions", &self.regions.len())
            .finish()
    }
}

impl RegionSet {
    pub fn new(regions: Vec<NamedRegion>) -> Result<Self> {
        ensure!(!regions.is_empty(), "region set must contain at least one region");

        let mut envelopes = Vec::with_capacity(regions.len());
        let mut centroids = Vec::with_capacity(regions.len());
        for (index, region) in regions.iter().enumerate() {
            let rect = region
                .geometry
                .bounding_rect()
                .ok_or_else(|| anyhow!("region '{}' has empty geometry", region.name))?;
            envelopes.push(RegionEnvelope {
                index,
                aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            });
            let c = region.geometry.centroid().unwrap_or_else(|| rect.center().into());
            centroids.push(GeomWithData::new([c.x(), c.y()], index));
        }

        Ok(Self {
            regions,
            envelopes: RTree::bulk_load(envelopes),
            centroids: RTree::bulk_load(centroids),
        })
    }

    /// Reads a GeoJSON FeatureCollection; each Polygon/MultiPolygon feature
    /// becomes a region named by `name_property`.
    pub fn load(path: &Path, name_property: &str) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to open region GeoJSON: {:?}", path))?;
        let set = Self::from_geojson_str(&text, name_property)
            .with_context(|| format!("Failed to load regions from {:?}", path))?;
        info!(regions = set.len(), path = ?path, "loaded aggregation regions");
        Ok(set)
    }

    pub fn from_geojson_str(text: &str, name_property: &str) -> Result<Self> {
        let geojson: GeoJson = text.parse().context("Failed to parse region GeoJSON")?;
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => return Err(anyhow!("Region GeoJSON must be a FeatureCollection")),
        };

        let mut regions = Vec::new();
        for (i, feature) in collection.features.into_iter().enumerate() {
            let name = match feature.properties.as_ref().and_then(|p| p.get(name_property)) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => format!("region-{}", i),
            };

            let Some(geometry) = feature.geometry else {
                continue;
            };
            let geometry: geo::Geometry<f64> = geometry
                .value
                .try_into()
                .map_err(|e| anyhow!("Failed to convert geometry of '{}': {:?}", name, e))?;
            let geometry = match geometry {
                geo::Geometry::MultiPolygon(mp) => mp,
                geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                _ => continue,
            };

            regions.push(NamedRegion { name, geometry });
        }

        Self::new(regions)
    }

    pub fn regions(&self) -> &[NamedRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Index of the region owning `coord`. Overlaps resolve to the lowest
    /// index; points outside every polygon go to the nearest centroid.
    pub fn locate(&self, coord: GeoCoord) -> usize {
        let point = Point::new(coord.lon, coord.lat);
        let envelope = AABB::from_point([coord.lon, coord.lat]);

        let containing = self
            .envelopes
            .locate_in_envelope_intersecting(&envelope)
            .filter(|candidate| self.regions[candidate.index].geometry.contains(&point))
            .map(|candidate| candidate.index)
            .min();

        containing.unwrap_or_else(|| {
            self.centroids
                .nearest_neighbor(&[coord.lon, coord.lat])
                .map(|nearest| nearest.data)
                .unwrap_or(0)
        })
    }
}
