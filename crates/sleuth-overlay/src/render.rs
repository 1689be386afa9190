//! Rasterise frames onto an image with `tiny-skia`.
//!
//! `tiny-skia` works on premultiplied RGBA while the rest of the workspace
//! uses straight RGBA, so every pixmap crossing the boundary is converted.

use image::{ImageBuffer, Rgba, imageops};
use sleuth_core::{Color, Point, Rect, RgbaImage};
use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

use crate::primitive::{Arrow, Frame, Image, Primitive, Shape, ShapeOutline};

/// Default side of a checkerboard square, in pixels.
pub const CHECKER_SQUARE: u32 = 16;

/// Errors from rasterising a frame.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },

    #[error("region {0:?} lies outside the image")]
    OutsideImage(Rect),
}

/// Draw `frame` over a copy of `base`.
///
/// # Errors
///
/// Returns [`RenderError::Canvas`] if `base` has a zero extent.
pub fn render_frame(base: &RgbaImage, frame: &Frame) -> Result<RgbaImage, RenderError> {
    let mut pixmap = rgba_to_pixmap(base)?;
    draw_primitives(&mut pixmap, &frame.primitives, Transform::identity());
    Ok(pixmap_to_rgba(&pixmap))
}

/// Draw `frame` over the part of `base` covered by `region`.
///
/// The region is clipped to the image and widened to whole pixels. Returns
/// the rendered tile and its top-left corner in image coordinates.
///
/// # Errors
///
/// Returns [`RenderError::OutsideImage`] if `region` does not overlap `base`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn render_region(
    base: &RgbaImage,
    frame: &Frame,
    region: Rect,
) -> Result<(RgbaImage, (u32, u32)), RenderError> {
    let (width, height) = base.dimensions();
    let bounds = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));
    let clipped = region
        .intersect(&bounds)
        .ok_or(RenderError::OutsideImage(region))?;

    let x0 = clipped.x.floor() as u32;
    let y0 = clipped.y.floor() as u32;
    let x1 = (clipped.max_x().ceil() as u32).min(width);
    let y1 = (clipped.max_y().ceil() as u32).min(height);

    let tile = imageops::crop_imm(base, x0, y0, x1 - x0, y1 - y0).to_image();
    let mut pixmap = rgba_to_pixmap(&tile)?;
    let transform = Transform::from_translate(-(x0 as f32), -(y0 as f32));
    draw_primitives(&mut pixmap, &frame.primitives, transform);
    Ok((pixmap_to_rgba(&pixmap), (x0, y0)))
}

/// Gray and light-gray checkerboard used behind transparent images.
///
/// A square of side 0 is treated as 1.
#[must_use]
pub fn checkerboard(width: u32, height: u32, square: u32) -> RgbaImage {
    let square = square.max(1);
    let dark = Color::GRAY.to_rgba();
    let light = Color::LIGHT_GRAY.to_rgba();
    ImageBuffer::from_fn(width, height, |x, y| {
        if (x / square + y / square) % 2 == 1 {
            light
        } else {
            dark
        }
    })
}

pub(crate) fn draw_primitives(pixmap: &mut Pixmap, primitives: &[Primitive], transform: Transform) {
    for primitive in primitives {
        match primitive {
            Primitive::Shape(shape) => draw_shape(pixmap, shape, transform),
            Primitive::Arrow(arrow) => draw_arrow(pixmap, arrow, transform),
            Primitive::Image(blit) => draw_image(pixmap, blit, transform),
        }
    }
}

pub(crate) fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn stroke(width: f64) -> Stroke {
    Stroke {
        width: width as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn polygon_path(points: &[Point]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in rest {
        pb.line_to(p.x as f32, p.y as f32);
    }
    pb.close();
    pb.finish()
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn outline_path(outline: &ShapeOutline) -> Option<Path> {
    match outline {
        ShapeOutline::Ellipse {
            center,
            radius_x,
            radius_y,
        } => {
            let rect = tiny_skia::Rect::from_xywh(
                (center.x - radius_x) as f32,
                (center.y - radius_y) as f32,
                (radius_x * 2.0) as f32,
                (radius_y * 2.0) as f32,
            )?;
            PathBuilder::from_oval(rect)
        }
        ShapeOutline::Rectangle(r) => {
            let rect = tiny_skia::Rect::from_xywh(
                r.x as f32,
                r.y as f32,
                r.width as f32,
                r.height as f32,
            )?;
            Some(PathBuilder::from_rect(rect))
        }
        ShapeOutline::Polygon(points) => polygon_path(points),
    }
}

pub(crate) fn draw_shape(pixmap: &mut Pixmap, shape: &Shape, transform: Transform) {
    // Zero-sized extents have no path to draw.
    let Some(path) = outline_path(&shape.outline) else {
        return;
    };
    if let Some(fill) = shape.fill {
        pixmap.fill_path(&path, &paint(fill), FillRule::Winding, transform, None);
    }
    if let Some(color) = shape.stroke {
        pixmap.stroke_path(&path, &paint(color), &stroke(shape.stroke_width), transform, None);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn draw_arrow(pixmap: &mut Pixmap, arrow: &Arrow, transform: Transform) {
    let paint = paint(arrow.color);

    let mut pb = PathBuilder::new();
    pb.move_to(arrow.from.x as f32, arrow.from.y as f32);
    pb.line_to(arrow.shaft_end.x as f32, arrow.shaft_end.y as f32);
    if let Some(shaft) = pb.finish() {
        pixmap.stroke_path(&shaft, &paint, &stroke(arrow.width), transform, None);
    }

    if let Some(head) = polygon_path(&arrow.head) {
        pixmap.fill_path(&head, &paint, FillRule::Winding, transform, None);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn draw_image(pixmap: &mut Pixmap, blit: &Image, transform: Transform) {
    let Ok(source) = rgba_to_pixmap(&blit.image) else {
        return;
    };
    pixmap.draw_pixmap(
        blit.at.x.round() as i32,
        blit.at.y.round() as i32,
        source.as_ref(),
        &PixmapPaint::default(),
        transform,
        None,
    );
}

/// Straight RGBA to a premultiplied pixmap.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn rgba_to_pixmap(image: &RgbaImage) -> Result<Pixmap, RenderError> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })?;
    for (dst, src) in pixmap.data_mut().chunks_exact_mut(4).zip(image.pixels()) {
        let a = u16::from(src[3]);
        dst[0] = (u16::from(src[0]) * a / 255) as u8;
        dst[1] = (u16::from(src[1]) * a / 255) as u8;
        dst[2] = (u16::from(src[2]) * a / 255) as u8;
        dst[3] = src[3];
    }
    Ok(pixmap)
}

/// Premultiplied pixmap to straight RGBA.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let data = pixmap.data();
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (pixel, px) in img.pixels_mut().zip(data.chunks_exact(4)) {
        let a = px[3];
        *pixel = if a == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            let r = u16::from(px[0]) * 255 / u16::from(a);
            let g = u16::from(px[1]) * 255 / u16::from(a);
            let b = u16::from(px[2]) * 255 / u16::from(a);
            Rgba([r as u8, g as u8, b as u8, a])
        };
    }
    img
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sleuth_core::{Anchor, Finding, Severity};

    use super::*;
    use crate::config::OverlayConfig;
    use crate::primitive::frame_for;

    fn black(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]))
    }

    #[test]
    fn checkerboard_alternates() {
        let board = checkerboard(64, 32, 16);
        assert_eq!(*board.get_pixel(0, 0), Color::GRAY.to_rgba());
        assert_eq!(*board.get_pixel(16, 0), Color::LIGHT_GRAY.to_rgba());
        assert_eq!(*board.get_pixel(16, 16), Color::GRAY.to_rgba());
        assert_eq!(*board.get_pixel(5, 20), Color::LIGHT_GRAY.to_rgba());
    }

    #[test]
    fn checkerboard_zero_square_does_not_divide_by_zero() {
        let board = checkerboard(2, 2, 0);
        assert_ne!(board.get_pixel(0, 0), board.get_pixel(1, 0));
    }

    #[test]
    fn pixmap_conversion_keeps_opaque_pixels() {
        let mut img = black(3, 1);
        img.put_pixel(1, 0, Rgba([10, 200, 30, 255]));
        let back = pixmap_to_rgba(&rgba_to_pixmap(&img).unwrap());
        assert_eq!(back, img);
    }

    #[test]
    fn zero_sized_base_is_rejected() {
        let f = Finding::new("p", Severity::Error, Anchor::point(0.0, 0.0));
        let frame = frame_for(&f, &OverlayConfig::default(), 1.0);
        assert!(matches!(
            render_frame(&RgbaImage::new(0, 0), &frame),
            Err(RenderError::Canvas { .. })
        ));
    }

    #[test]
    fn frame_paints_extent_in_severity_colour() {
        let f = Finding::new("r", Severity::Critical, Anchor::rectangle(20.0, 20.0, 10.0, 10.0));
        let frame = frame_for(&f, &OverlayConfig::default(), 1.0);
        let out = render_frame(&black(40, 40), &frame).unwrap();
        let centre = out.get_pixel(20, 20);
        assert!(centre[0] > 200, "{centre:?}");
        assert_eq!(*out.get_pixel(2, 2), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn region_matches_full_render() {
        let f = Finding::new("cm", Severity::Critical, Anchor::rectangle(30.0, 30.0, 6.0, 6.0))
            .with_source(Anchor::rectangle(10.0, 10.0, 6.0, 6.0));
        let frame = frame_for(&f, &OverlayConfig::default(), 0.6);
        let base = black(48, 48);

        let full = render_frame(&base, &frame).unwrap();
        let (tile, (x0, y0)) = render_region(&base, &frame, frame.dirty).unwrap();
        assert_eq!((x0, y0), (2, 2));
        assert_eq!(tile.dimensions(), (36, 36));
        for (x, y, px) in tile.enumerate_pixels() {
            let expected = full.get_pixel(x + x0, y + y0);
            let close = px.0.iter().zip(expected.0).all(|(a, b)| a.abs_diff(b) <= 2);
            assert!(close, "at ({x}, {y}): {px:?} vs {expected:?}");
        }
    }

    #[test]
    fn region_outside_image_is_rejected() {
        let f = Finding::new("p", Severity::Error, Anchor::point(0.0, 0.0));
        let frame = frame_for(&f, &OverlayConfig::default(), 1.0);
        let err = render_region(&black(8, 8), &frame, Rect::new(20.0, 20.0, 4.0, 4.0));
        assert!(matches!(err, Err(RenderError::OutsideImage(_))));
    }

    #[test]
    fn embedded_image_is_blitted() {
        let patch = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]));
        let f = Finding::new("patch", Severity::Error, Anchor::image(2.0, 3.0, patch));
        let frame = frame_for(&f, &OverlayConfig::default(), 1.0);
        let out = render_frame(&black(10, 10), &frame).unwrap();
        assert_eq!(*out.get_pixel(3, 4), Rgba([0, 255, 0, 255]));
        assert_eq!(*out.get_pixel(7, 4), Rgba([0, 0, 0, 255]));
    }
}
