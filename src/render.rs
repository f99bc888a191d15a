use crate::aggregate::BinBoundary;
use crate::projector::Viewport;
use crate::types::{GeoCoord, ScreenPoint};
use crate::view::{BinShade, Marker, Scene};
use anyhow::{Context, Result};
use image::{ImageFormat, Pixel, Rgba, RgbaImage};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::info;

const HATCH_SPACING: u32 = 12;

#[derive(Debug, Clone, Copy)]
pub struct RenderStyle {
    pub background: Rgba<u8>,
    /// Region bounding box and bin edges.
    pub outline: Rgba<u8>,
    /// Stripes drawn when there is nothing to show.
    pub hatch: Rgba<u8>,
    pub marker_opacity: f64,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            background: Rgba([248, 248, 244, 255]),
            outline: Rgba([90, 90, 90, 255]),
            hatch: Rgba([210, 210, 210, 255]),
            marker_opacity: 0.8,
        }
    }
}

/// Draws a scene onto a canvas the size of `viewport`.
pub fn rasterize(scene: &Scene, viewport: &Viewport, style: &RenderStyle) -> RgbaImage {
    let (w, h) = viewport.size();
    let mut img = RgbaImage::from_pixel(w as u32, h as u32, style.background);

    match scene {
        Scene::Empty { .. } => hatch(&mut img, style.hatch),
        Scene::Dots { markers, .. } => {
            draw_region_outline(&mut img, viewport, style.outline);
            let alpha = (style.marker_opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
            for marker in markers {
                fill_circle(&mut img, marker, alpha);
            }
        }
        Scene::Choropleth { bins, shades, .. } => {
            for shade in shades {
                match &bins[shade.bin].boundary {
                    BinBoundary::Cell(_) => fill_cell(&mut img, shade, style.outline),
                    boundary @ BinBoundary::Region { .. } => fill_region(&mut img, viewport, boundary, shade),
                }
            }
            draw_region_outline(&mut img, viewport, style.outline);
        }
    }
    img
}

pub fn write_png(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write image {:?}", path))?;
    info!(path = ?path, width = img.width(), height = img.height(), "wrote map image");
    Ok(())
}

// Pixel range covering [a, b) on an axis of `limit` pixels.
fn clip_span(a: f64, b: f64, limit: u32) -> Option<(u32, u32)> {
    let lo = a.min(b).floor().max(0.0);
    let hi = a.max(b).ceil().min(limit as f64);
    (lo < hi).then(|| (lo as u32, hi as u32))
}

fn hatch(img: &mut RgbaImage, color: Rgba<u8>) {
    for (x, y, px) in img.enumerate_pixels_mut() {
        if (x + y) % HATCH_SPACING < 2 {
            *px = color;
        }
    }
}

fn draw_region_outline(img: &mut RgbaImage, viewport: &Viewport, color: Rgba<u8>) {
    let b = viewport.bounds();
    let tl = viewport.project(GeoCoord::new(b.max_lat, b.min_lon));
    let br = viewport.project(GeoCoord::new(b.min_lat, b.max_lon));
    stroke_rect(img, tl, br, color);
}

fn stroke_rect(img: &mut RgbaImage, tl: ScreenPoint, br: ScreenPoint, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let in_x = |x: f64| x >= 0.0 && x < w as f64;
    let in_y = |y: f64| y >= 0.0 && y < h as f64;

    if let Some((x0, x1)) = clip_span(tl.x, br.x, w) {
        for y in [tl.y, br.y - 1.0].into_iter().filter(|y| in_y(*y)) {
            for x in x0..x1 {
                img.put_pixel(x, y as u32, color);
            }
        }
    }
    if let Some((y0, y1)) = clip_span(tl.y, br.y, h) {
        for x in [tl.x, br.x - 1.0].into_iter().filter(|x| in_x(*x)) {
            for y in y0..y1 {
                img.put_pixel(x as u32, y, color);
            }
        }
    }
}

fn fill_cell(img: &mut RgbaImage, shade: &BinShade, edge: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let (Some((x0, x1)), Some((y0, y1))) = (
        clip_span(shade.top_left.x, shade.bottom_right.x, w),
        clip_span(shade.top_left.y, shade.bottom_right.y, h),
    ) else {
        return;
    };
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, shade.fill);
        }
    }
    let mut faint = edge;
    faint[3] = 60;
    for y in y0..y1 {
        for x in x0..x1 {
            if y == y0 || x == x0 {
                img.get_pixel_mut(x, y).blend(&faint);
            }
        }
    }
}

fn fill_region(img: &mut RgbaImage, viewport: &Viewport, boundary: &BinBoundary, shade: &BinShade) {
    let (w, h) = img.dimensions();
    let (Some((x0, x1)), Some((y0, y1))) = (
        clip_span(shade.top_left.x, shade.bottom_right.x, w),
        clip_span(shade.top_left.y, shade.bottom_right.y, h),
    ) else {
        return;
    };

    let inside: Vec<(u32, u32)> = (y0..y1)
        .into_par_iter()
        .flat_map_iter(|y| {
            (x0..x1)
                .filter(move |&x| {
                    let centre = ScreenPoint::new(x as f64 + 0.5, y as f64 + 0.5);
                    boundary.contains(viewport.unproject(centre))
                })
                .map(move |x| (x, y))
        })
        .collect();

    for (x, y) in inside {
        img.put_pixel(x, y, shade.fill);
    }
}

fn fill_circle(img: &mut RgbaImage, marker: &Marker, alpha: u8) {
    let (w, h) = img.dimensions();
    let ScreenPoint { x: cx, y: cy } = marker.position;
    let r = marker.radius.max(0.5);
    let (Some((x0, x1)), Some((y0, y1))) = (clip_span(cx - r, cx + r, w), clip_span(cy - r, cy + r, h)) else {
        return;
    };

    let mut fill = marker.fill;
    fill[3] = alpha;
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy <= r * r {
                img.get_pixel_mut(x, y).blend(&fill);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Partitioning;
    use crate::data::PointSet;
    use crate::regions::tests::TWO_SQUARES;
    use crate::regions::RegionSet;
    use crate::types::DataPoint;
    use crate::view::{MapMode, MapView, ViewOptions};
    use std::sync::Arc;
    use std::time::Instant;

    fn options() -> ViewOptions {
        ViewOptions {
            width: 200,
            height: 150,
            ..ViewOptions::default()
        }
    }

    fn sydney() -> PointSet {
        PointSet::new(
            1,
            vec![
                DataPoint {
                    name: "Sydney".into(),
                    latitude: -33.87,
                    longitude: 151.21,
                    value: 10.0,
                    category: "city".into(),
                },
                DataPoint {
                    name: "Broken Hill".into(),
                    latitude: -31.95,
                    longitude: 141.47,
                    value: 2.0,
                    category: "town".into(),
                },
            ],
            0,
        )
    }

    #[test]
    fn empty_scene_is_hatched() {
        let mut view = MapView::new(options(), MapMode::Dot, |_| {});
        let style = RenderStyle::default();
        view.frame(Instant::now());
        let img = rasterize(view.scene(), view.viewport(), &style);
        assert_eq!(img.dimensions(), (200, 150));
        assert_eq!(*img.get_pixel(0, 0), style.hatch);
        assert_eq!(*img.get_pixel(5, 0), style.background);
    }

    #[test]
    fn markers_are_drawn_at_their_projection() {
        let mut view = MapView::new(options(), MapMode::Dot, |_| {});
        view.set_points(sydney());
        let style = RenderStyle::default();
        let scene = view.frame(Instant::now()).clone();
        let img = rasterize(&scene, view.viewport(), &style);

        let Scene::Dots { markers, .. } = &scene else {
            panic!("expected dots");
        };
        let p = markers[0].position;
        let px = img.get_pixel(p.x as u32, p.y as u32);
        assert_ne!(*px, style.background);
        // hottest value, so the red end of the palette dominates
        assert!(px[0] > px[2]);
    }

    #[test]
    fn region_bins_fill_their_interior() {
        let set = Arc::new(RegionSet::from_geojson_str(TWO_SQUARES, "name").unwrap());
        let opts = ViewOptions {
            partitioning: Partitioning::Regions(set),
            ..options()
        };
        let no_data = opts.no_data;
        let mut view = MapView::new(opts, MapMode::Choropleth, |_| {});
        view.set_points(sydney());
        let scene = view.frame(Instant::now()).clone();
        let img = rasterize(&scene, view.viewport(), &RenderStyle::default());

        let inside_west = view.viewport().project(GeoCoord::new(-33.0, 144.0));
        let gap = view.viewport().project(GeoCoord::new(-33.0, 147.5));
        let west = *img.get_pixel(inside_west.x as u32, inside_west.y as u32);
        assert_ne!(west, RenderStyle::default().background);
        assert_ne!(west, no_data);
        assert_eq!(*img.get_pixel(gap.x as u32, gap.y as u32), RenderStyle::default().background);
    }

    #[test]
    fn writes_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("map.png");
        let img = RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 255]));
        write_png(&img, &path).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (4, 3));
        assert_eq!(*back.get_pixel(3, 2), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn clip_span_handles_offscreen_and_reversed() {
        assert_eq!(clip_span(-5.0, 3.2, 10), Some((0, 4)));
        assert_eq!(clip_span(8.0, 2.0, 10), Some((2, 8)));
        assert_eq!(clip_span(20.0, 30.0, 10), None);
    }
}
