use crate::error::{IngestError, IngestResult};
use crate::parser::ParsedTable;
use crate::types::{DataPoint, GeoCoord, RawRecord, RegionBounds, DEFAULT_CATEGORY};
use std::fmt;
use tracing::debug;

pub const REQUIRED_COLUMNS: [&str; 5] = ["name", "latitude", "longitude", "value", "category"];

/// Points that survived validation plus how many rows did not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    pub points: Vec<DataPoint>,
    /// Parser drops plus validator rejections.
    pub rejected: usize,
}

/// Why a single row was excluded. Only logged; callers see the count.
#[derive(Debug, Clone, PartialEq)]
pub enum RowRejection {
    MissingField(&'static str),
    EmptyName,
    NotANumber { column: &'static str, raw: String },
    OutOfBounds(GeoCoord),
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRejection::MissingField(col) => write!(f, "missing field '{}'", col),
            RowRejection::EmptyName => write!(f, "empty name"),
            RowRejection::NotANumber { column, raw } => {
                write!(f, "'{}' is not a finite number in column '{}'", raw, column)
            }
            RowRejection::OutOfBounds(c) => {
                write!(f, "({}, {}) lies outside the region", c.lat, c.lon)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    bounds: RegionBounds,
}

impl Validator {
    pub fn new(bounds: RegionBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &RegionBounds {
        &self.bounds
    }

    /// Checks the header once, then filters rows. Never short-circuits on a
    /// bad row; only a missing required column aborts.
    pub fn validate(&self, table: &ParsedTable) -> IngestResult<Validated> {
        check_schema(&table.headers)?;

        let mut out = Validated {
            points: Vec::with_capacity(table.records.len()),
            rejected: table.dropped_rows,
        };

        for (row, record) in table.records.iter().enumerate() {
            match self.validate_record(record) {
                Ok(point) => out.points.push(point),
                Err(reason) => {
                    debug!(row, %reason, "rejecting row");
                    out.rejected += 1;
                }
            }
        }

        Ok(out)
    }

    pub fn validate_record(&self, record: &RawRecord) -> Result<DataPoint, RowRejection> {
        let name = field(record, "name")?;
        if name.is_empty() {
            return Err(RowRejection::EmptyName);
        }

        let latitude = number(record, "latitude")?;
        let longitude = number(record, "longitude")?;
        let value = number(record, "value")?;

        let coord = GeoCoord::new(latitude, longitude);
        if !self.bounds.contains(coord) {
            return Err(RowRejection::OutOfBounds(coord));
        }

        let category = match field(record, "category")? {
            "" => DEFAULT_CATEGORY.to_string(),
            c => c.to_string(),
        };

        Ok(DataPoint {
            name: name.to_string(),
            latitude,
            longitude,
            value,
            category,
        })
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(RegionBounds::NSW)
    }
}

/// Every required column must appear in the header, in any case.
pub fn check_schema(headers: &[String]) -> IngestResult<()> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !headers.iter().any(|h| h.eq_ignore_ascii_case(required)))
        .map(|required| required.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestError::Schema { missing })
    }
}

fn field<'a>(record: &'a RawRecord, column: &'static str) -> Result<&'a str, RowRejection> {
    record
        .get(column)
        .map(str::trim)
        .ok_or(RowRejection::MissingField(column))
}

fn number(record: &RawRecord, column: &'static str) -> Result<f64, RowRejection> {
    let raw = field(record, column)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(RowRejection::NotANumber {
            column,
            raw: raw.to_string(),
        }),
    }
}
