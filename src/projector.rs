use crate::types::{GeoCoord, RegionBounds, ScreenPoint};

/// Center, zoom and canvas size of the map, plus the limits they are kept in.
///
/// Projection is equirectangular: pixels per degree of latitude is
/// `base_scale * 2^zoom`, longitude is additionally shortened by the cosine of
/// the region's central latitude. `base_scale` fits the whole region into the
/// canvas at zoom 0. Both factors are fixed for the life of the viewport, so
/// `unproject(project(c)) == c` up to rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    center: GeoCoord,
    zoom: f64,
    width: f64,
    height: f64,
    bounds: RegionBounds,
    min_zoom: f64,
    max_zoom: f64,
    base_scale: f64,
    lon_factor: f64,
}

impl Viewport {
    pub fn new(bounds: RegionBounds, width: u32, height: u32, min_zoom: f64, max_zoom: f64) -> Self {
        let width = width.max(1) as f64;
        let height = height.max(1) as f64;
        let (min_zoom, max_zoom) = if min_zoom <= max_zoom {
            (min_zoom, max_zoom)
        } else {
            (max_zoom, min_zoom)
        };
        let lon_factor = bounds.center().lat.to_radians().cos();
        let base_scale = (width / (bounds.lon_span() * lon_factor)).min(height / bounds.lat_span());
        Self {
            center: bounds.center(),
            zoom: min_zoom,
            width,
            height,
            bounds,
            min_zoom,
            max_zoom,
            base_scale,
            lon_factor,
        }
    }

    pub fn center(&self) -> GeoCoord {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn zoom_range(&self) -> (f64, f64) {
        (self.min_zoom, self.max_zoom)
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn bounds(&self) -> &RegionBounds {
        &self.bounds
    }

    /// Pixels per degree of latitude at the current zoom.
    pub fn scale(&self) -> f64 {
        self.base_scale * 2f64.powf(self.zoom)
    }

    pub fn project(&self, coord: GeoCoord) -> ScreenPoint {
        let s = self.scale();
        ScreenPoint::new(
            self.width / 2.0 + (coord.lon - self.center.lon) * s * self.lon_factor,
            self.height / 2.0 - (coord.lat - self.center.lat) * s,
        )
    }

    pub fn unproject(&self, point: ScreenPoint) -> GeoCoord {
        let s = self.scale();
        GeoCoord::new(
            self.center.lat - (point.y - self.height / 2.0) / s,
            self.center.lon + (point.x - self.width / 2.0) / (s * self.lon_factor),
        )
    }

    /// Like `project`, but `None` once the result is more than a canvas
    /// width/height beyond the edge, so far-off geometry is never drawn.
    pub fn project_visible(&self, coord: GeoCoord) -> Option<ScreenPoint> {
        let p = self.project(coord);
        self.is_near_canvas(p).then_some(p)
    }

    pub fn is_near_canvas(&self, p: ScreenPoint) -> bool {
        let mx = self.width;
        let my = self.height;
        p.x.is_finite()
            && p.y.is_finite()
            && (-mx..=self.width + mx).contains(&p.x)
            && (-my..=self.height + my).contains(&p.y)
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = if zoom.is_nan() {
            self.min_zoom
        } else {
            zoom.clamp(self.min_zoom, self.max_zoom)
        };
    }

    pub fn set_center(&mut self, center: GeoCoord) {
        self.center = self.bounds.clamp(center);
    }

    /// Drags the map content by a screen delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        let target = self.unproject(ScreenPoint::new(self.width / 2.0 - dx, self.height / 2.0 - dy));
        self.set_center(target);
    }

    /// Zooms by `delta` levels keeping the coordinate under `anchor` fixed
    /// (until the center clamp kicks in).
    pub fn zoom_at(&mut self, delta: f64, anchor: ScreenPoint) {
        let fixed = self.unproject(anchor);
        self.set_zoom(self.zoom + delta);
        let s = self.scale();
        self.set_center(GeoCoord::new(
            fixed.lat + (anchor.y - self.height / 2.0) / s,
            fixed.lon - (anchor.x - self.width / 2.0) / (s * self.lon_factor),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(RegionBounds::NSW, 800, 600, 0.0, 6.0)
    }

    fn close(a: GeoCoord, b: GeoCoord) -> bool {
        (a.lat - b.lat).abs() < 1e-9 && (a.lon - b.lon).abs() < 1e-9
    }

    #[test]
    fn region_fits_canvas_at_min_zoom() {
        let vp = viewport();
        let b = RegionBounds::NSW;
        for corner in [
            GeoCoord::new(b.min_lat, b.min_lon),
            GeoCoord::new(b.max_lat, b.max_lon),
        ] {
            let p = vp.project(corner);
            assert!(p.x >= -1e-6 && p.x <= 800.0 + 1e-6, "x = {}", p.x);
            assert!(p.y >= -1e-6 && p.y <= 600.0 + 1e-6, "y = {}", p.y);
        }
        let c = vp.project(b.center());
        assert!((c.x - 400.0).abs() < 1e-9 && (c.y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn north_is_up() {
        let vp = viewport();
        let south = vp.project(GeoCoord::new(-36.0, 150.0));
        let north = vp.project(GeoCoord::new(-30.0, 150.0));
        assert!(north.y < south.y);
    }

    #[test]
    fn unproject_inverts_project() {
        let mut vp = viewport();
        vp.zoom_at(2.5, ScreenPoint::new(120.0, 80.0));
        let c = GeoCoord::new(-33.8688, 151.2093);
        assert!(close(vp.unproject(vp.project(c)), c));
    }

    #[test]
    fn zoom_is_clamped() {
        let mut vp = viewport();
        vp.set_zoom(99.0);
        assert_eq!(vp.zoom(), 6.0);
        vp.set_zoom(-3.0);
        assert_eq!(vp.zoom(), 0.0);
        vp.set_zoom(f64::NAN);
        assert_eq!(vp.zoom(), 0.0);
    }

    #[test]
    fn pan_moves_content_with_pointer_and_clamps() {
        let mut vp = viewport();
        vp.set_zoom(3.0);
        let sydney = GeoCoord::new(-33.87, 151.21);
        let before = vp.project(sydney);
        vp.pan_by(25.0, -10.0);
        let after = vp.project(sydney);
        assert!((after.x - before.x - 25.0).abs() < 1e-6);
        assert!((after.y - before.y + 10.0).abs() < 1e-6);

        vp.pan_by(1e7, 1e7);
        assert!(RegionBounds::NSW.contains(vp.center()));
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut vp = viewport();
        let anchor = ScreenPoint::new(500.0, 350.0);
        let under = vp.unproject(anchor);
        vp.zoom_at(1.0, anchor);
        let p = vp.project(under);
        assert!((p.x - anchor.x).abs() < 1e-6 && (p.y - anchor.y).abs() < 1e-6);
    }

    #[test]
    fn far_points_are_culled() {
        let mut vp = viewport();
        vp.set_zoom(6.0);
        assert!(vp.project_visible(vp.center()).is_some());
        assert!(vp.project_visible(GeoCoord::new(-28.2, 141.0)).is_none());
        assert!(vp.project_visible(GeoCoord::new(-37.4, 153.6)).is_none());
    }
}
