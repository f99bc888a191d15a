use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub lat: f64,
    pub lon: f64,
}

impl GeoCoord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Canvas position in pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The latitude/longitude rectangle the map supports. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl RegionBounds {
    /// New South Wales.
    pub const NSW: RegionBounds = RegionBounds {
        min_lat: -37.505,
        max_lat: -28.157,
        min_lon: 140.999,
        max_lon: 153.638,
    };

    pub fn contains(&self, coord: GeoCoord) -> bool {
        (self.min_lat..=self.max_lat).contains(&coord.lat)
            && (self.min_lon..=self.max_lon).contains(&coord.lon)
    }

    pub fn center(&self) -> GeoCoord {
        GeoCoord::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn clamp(&self, coord: GeoCoord) -> GeoCoord {
        GeoCoord::new(
            coord.lat.clamp(self.min_lat, self.max_lat),
            coord.lon.clamp(self.min_lon, self.max_lon),
        )
    }
}

impl Default for RegionBounds {
    fn default() -> Self {
        Self::NSW
    }
}

/// One input row, column name to raw string, in header order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Case-insensitive lookup; the first matching column wins.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
    pub category: String,
}

impl DataPoint {
    pub fn coord(&self) -> GeoCoord {
        GeoCoord::new(self.latitude, self.longitude)
    }

    /// Renders the point back into a row with the canonical column names.
    pub fn to_record(&self) -> RawRecord {
        RawRecord::new(vec![
            ("name".to_string(), self.name.clone()),
            ("latitude".to_string(), self.latitude.to_string()),
            ("longitude".to_string(), self.longitude.to_string()),
            ("value".to_string(), self.value.to_string()),
            ("category".to_string(), self.category.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lookup_ignores_case() {
        let rec = RawRecord::new(vec![("Latitude".into(), "-33.8".into())]);
        assert_eq!(rec.get("latitude"), Some("-33.8"));
        assert_eq!(rec.get("LATITUDE"), Some("-33.8"));
        assert_eq!(rec.get("longitude"), None);
    }

    #[test]
    fn nsw_bounds_are_inclusive() {
        let b = RegionBounds::NSW;
        assert!(b.contains(GeoCoord::new(b.min_lat, b.max_lon)));
        assert!(b.contains(GeoCoord::new(-33.87, 151.21)));
        assert!(!b.contains(GeoCoord::new(-37.81, 144.96)));
    }

    #[test]
    fn clamp_pulls_coordinates_inside() {
        let b = RegionBounds::NSW;
        let c = b.clamp(GeoCoord::new(0.0, 200.0));
        assert_eq!(c, GeoCoord::new(b.max_lat, b.max_lon));
    }
}
