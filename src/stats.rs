use crate::types::DataPoint;
use serde::Serialize;
use std::collections::BTreeSet;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn min_max(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let mut iter = values.into_iter();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

/// Headline numbers for a point set: what the shell shows above the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub points: usize,
    pub rejected: usize,
    pub categories: usize,
    pub value_range: Option<(f64, f64)>,
    pub mean_value: Option<f64>,
}

impl Summary {
    pub fn of(points: &[DataPoint], rejected: usize) -> Self {
        let categories: BTreeSet<&str> = points.iter().map(|p| p.category.as_str()).collect();
        Self {
            points: points.len(),
            rejected,
            categories: categories.len(),
            value_range: min_max(points.iter().map(|p| p.value)),
            mean_value: mean(&points.iter().map(|p| p.value).collect::<Vec<_>>()),
        }
    }
}
