use crate::stats::min_max;
use crate::types::DataPoint;
use anyhow::{anyhow, ensure, Result};
use image::Rgba;
use serde::{Deserialize, Serialize};

/// Parses `#rrggbb` (the leading `#` is optional).
pub fn hex_to_rgba(hex: &str) -> Result<Rgba<u8>> {
    let digits = hex.trim().trim_start_matches('#');
    ensure!(
        digits.len() == 6 && digits.is_ascii(),
        "color '{}' is not in #rrggbb form",
        hex
    );
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| anyhow!("color '{}' is not valid hex", hex))
    };
    Ok(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255]))
}

fn lerp_color(a: Rgba<u8>, b: Rgba<u8>, t: f64) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    Rgba([mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2]), mix(a[3], b[3])])
}

/// Ordered color stops, at least three of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    stops: Vec<Rgba<u8>>,
}

impl Palette {
    pub fn new(stops: Vec<Rgba<u8>>) -> Result<Self> {
        ensure!(
            stops.len() >= 3,
            "a palette needs at least 3 color stops, got {}",
            stops.len()
        );
        Ok(Self { stops })
    }

    pub fn from_hex<S: AsRef<str>>(hex: &[S]) -> Result<Self> {
        let stops = hex
            .iter()
            .map(|h| hex_to_rgba(h.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(stops)
    }

    /// Blue through pale yellow to red.
    pub fn cold_to_hot() -> Self {
        Self {
            stops: vec![
                Rgba([44, 123, 182, 255]),
                Rgba([171, 217, 233, 255]),
                Rgba([255, 255, 191, 255]),
                Rgba([253, 174, 97, 255]),
                Rgba([215, 25, 28, 255]),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn stops(&self) -> &[Rgba<u8>] {
        &self.stops
    }

    /// Color at position `t` in `[0, 1]` along the whole gradient.
    pub fn at(&self, t: f64) -> Rgba<u8> {
        let last = self.stops.len() - 1;
        let pos = t.clamp(0.0, 1.0) * last as f64;
        let i = (pos.floor() as usize).min(last - 1);
        lerp_color(self.stops[i], self.stops[i + 1], pos - i as f64)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::cold_to_hot()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    #[default]
    Linear,
    Quantile,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Breakpoint {
    pub threshold: f64,
    pub color: [u8; 4],
}

/// Value to color mapping derived from one point set. Rebuilt, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    thresholds: Vec<f64>,
    colors: Vec<Rgba<u8>>,
    constant: Option<Rgba<u8>>,
}

impl ColorScale {
    pub fn build(points: &[DataPoint], palette: &Palette, kind: ScaleKind) -> Self {
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        Self::from_values(&values, palette, kind)
    }

    pub fn from_values(values: &[f64], palette: &Palette, kind: ScaleKind) -> Self {
        let (lo, hi) = match min_max(values.iter().copied()) {
            Some((lo, hi)) if hi > lo => (lo, hi),
            range => {
                // All values equal, or nothing to scale.
                let mid = palette.at(0.5);
                return Self {
                    thresholds: vec![range.map(|(lo, _)| lo).unwrap_or(0.0)],
                    colors: vec![mid],
                    constant: Some(mid),
                };
            }
        };

        let steps = (palette.len() - 1) as f64;
        let thresholds = match kind {
            ScaleKind::Linear => (0..palette.len())
                .map(|i| lerp(lo, hi, i as f64 / steps))
                .collect(),
            ScaleKind::Quantile => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                (0..palette.len())
                    .map(|i| quantile(&sorted, i as f64 / steps))
                    .collect()
            }
        };

        Self {
            thresholds,
            colors: palette.stops().to_vec(),
            constant: None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }

    pub fn color_for(&self, value: f64) -> Rgba<u8> {
        if let Some(c) = self.constant {
            return c;
        }
        let last = self.thresholds.len() - 1;
        if value <= self.thresholds[0] {
            return self.colors[0];
        }
        if value >= self.thresholds[last] {
            return self.colors[last];
        }
        // thresholds[upper - 1] <= value < thresholds[upper]
        let upper = self.thresholds.partition_point(|&t| t <= value);
        if upper == 0 {
            return self.colors[0];
        }
        if upper > last {
            return self.colors[last];
        }
        let lower = upper - 1;
        lerp_color(
            self.colors[lower],
            self.colors[upper],
            fraction(value, self.thresholds[lower], self.thresholds[upper]),
        )
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.thresholds
            .iter()
            .zip(&self.colors)
            .map(|(&threshold, color)| Breakpoint {
                threshold,
                color: color.0,
            })
            .collect()
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = (i + 1).min(sorted.len() - 1);
    lerp(sorted[i], sorted[j], pos - i as f64)
}

// Weighted form so `hi - lo` is never formed; it can overflow near f64::MAX.
fn lerp(lo: f64, hi: f64, t: f64) -> f64 {
    lo * (1.0 - t) + hi * t
}

/// Position of `value` in `[lo, hi]`, clamped to `[0, 1]`. Operands are halved
/// first so the differences stay finite for any finite inputs.
fn fraction(value: f64, lo: f64, hi: f64) -> f64 {
    let t = (value / 2.0 - lo / 2.0) / (hi / 2.0 - lo / 2.0);
    if t.is_nan() {
        0.0
    } else {
        t.clamp(0.0, 1.0)
    }
}

/// Linear value to marker radius mapping, clamped to the configured range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusScale {
    domain: Option<(f64, f64)>,
    min_radius: f64,
    max_radius: f64,
}

impl RadiusScale {
    pub fn build(points: &[DataPoint], min_radius: f64, max_radius: f64) -> Self {
        Self {
            domain: min_max(points.iter().map(|p| p.value)).filter(|(lo, hi)| hi > lo),
            min_radius,
            max_radius,
        }
    }

    pub fn radius_for(&self, value: f64) -> f64 {
        match self.domain {
            Some((lo, hi)) => lerp(self.min_radius, self.max_radius, fraction(value, lo, hi)),
            None => (self.min_radius + self.max_radius) / 2.0,
        }
    }

    pub fn as_fn(&self) -> impl Fn(f64) -> f64 + '_ {
        move |v| self.radius_for(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette3() -> Palette {
        Palette::new(vec![
            Rgba([0, 0, 255, 255]),
            Rgba([0, 255, 0, 255]),
            Rgba([255, 0, 0, 255]),
        ])
        .unwrap()
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(hex_to_rgba("#d7191c").unwrap(), Rgba([215, 25, 28, 255]));
        assert_eq!(hex_to_rgba("2C7BB6").unwrap(), Rgba([44, 123, 182, 255]));
        assert!(hex_to_rgba("#12345").is_err());
        assert!(hex_to_rgba("#zzzzzz").is_err());
    }

    #[test]
    fn palette_requires_three_stops() {
        assert!(Palette::from_hex(&["#000000", "#ffffff"]).is_err());
        let palette = Palette::from_hex(&["#000000", "#777777", "#ffffff"]).unwrap();
        assert_eq!(palette.len(), 3);
        assert!(!palette.is_empty());
    }

    #[test]
    fn linear_scale_hits_stops_and_interpolates() {
        let scale = ColorScale::from_values(&[0.0, 50.0, 100.0], &palette3(), ScaleKind::Linear);
        assert_eq!(scale.color_for(0.0), Rgba([0, 0, 255, 255]));
        assert_eq!(scale.color_for(50.0), Rgba([0, 255, 0, 255]));
        assert_eq!(scale.color_for(100.0), Rgba([255, 0, 0, 255]));
        assert_eq!(scale.color_for(75.0), Rgba([128, 128, 0, 255]));
        // clamped outside the observed range
        assert_eq!(scale.color_for(-10.0), Rgba([0, 0, 255, 255]));
        assert_eq!(scale.color_for(1e9), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn quantile_thresholds_follow_the_distribution() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        let scale = ColorScale::from_values(&values, &palette3(), ScaleKind::Quantile);
        let thresholds: Vec<f64> = scale.breakpoints().iter().map(|b| b.threshold).collect();
        assert_eq!(thresholds, vec![1.0, 3.0, 100.0]);
        assert_eq!(scale.color_for(3.0), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn identical_values_give_the_midpoint_everywhere() {
        let scale = ColorScale::from_values(&[7.0, 7.0, 7.0], &palette3(), ScaleKind::Linear);
        assert!(scale.is_constant());
        for v in [-1.0, 7.0, 1000.0] {
            assert_eq!(scale.color_for(v), Rgba([0, 255, 0, 255]));
        }
    }

    #[test]
    fn radius_is_linear_and_clamped() {
        let r = RadiusScale {
            domain: Some((0.0, 100.0)),
            min_radius: 2.0,
            max_radius: 12.0,
        };
        assert_eq!(r.radius_for(0.0), 2.0);
        assert_eq!(r.radius_for(50.0), 7.0);
        assert_eq!(r.radius_for(100.0), 12.0);
        assert_eq!(r.radius_for(-5.0), 2.0);
        assert_eq!(r.radius_for(500.0), 12.0);
    }

    #[test]
    fn extreme_finite_values_stay_finite() {
        let values = [-1e308, 1e308];
        for kind in [ScaleKind::Linear, ScaleKind::Quantile] {
            let scale = ColorScale::from_values(&values, &palette3(), kind);
            let thresholds: Vec<f64> = scale.breakpoints().iter().map(|b| b.threshold).collect();
            assert_eq!(thresholds, vec![-1e308, 0.0, 1e308]);
            assert_eq!(scale.color_for(-1e308), Rgba([0, 0, 255, 255]));
            assert_eq!(scale.color_for(0.0), Rgba([0, 255, 0, 255]));
            assert_eq!(scale.color_for(1e308), Rgba([255, 0, 0, 255]));
            assert_eq!(scale.color_for(5e307), Rgba([128, 128, 0, 255]));
        }

        let pts: Vec<DataPoint> = values
            .iter()
            .map(|&value| DataPoint {
                name: "p".into(),
                latitude: -33.0,
                longitude: 150.0,
                value,
                category: "c".into(),
            })
            .collect();
        let r = RadiusScale::build(&pts, 2.0, 12.0);
        assert_eq!(r.radius_for(-1e308), 2.0);
        assert_eq!(r.radius_for(0.0), 7.0);
        assert_eq!(r.radius_for(1e308), 12.0);
    }

    #[test]
    fn degenerate_radius_is_the_midpoint() {
        let r = RadiusScale::build(&[], 4.0, 10.0);
        let f = r.as_fn();
        assert_eq!(f(0.0), 7.0);
        assert_eq!(f(99.0), 7.0);
    }
}
