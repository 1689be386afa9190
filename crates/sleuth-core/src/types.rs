//! Shared types for the sleuth analysis core.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::session::SessionError;

/// Re-export `RgbaImage` so downstream crates can reference raster data
/// without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// An axis-aligned rectangle in image coordinates.
///
/// A rectangle with zero width and height is a valid, degenerate
/// rectangle: it marks a single point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Horizontal extent (never negative).
    pub width: f64,
    /// Vertical extent (never negative).
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A zero-sized rectangle located at `p`.
    #[must_use]
    pub const fn at_point(p: Point) -> Self {
        Self::new(p.x, p.y, 0.0, 0.0)
    }

    /// The smallest rectangle spanning two corner points, in any order.
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self::new(x, y, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    /// Right edge.
    #[must_use]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Centre point.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            self.width.mul_add(0.5, self.x),
            self.height.mul_add(0.5, self.y),
        )
    }

    /// Returns `true` if the rectangle has no area.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Returns `true` if `p` lies inside or on the edge of the rectangle.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.max_x() && p.y >= self.y && p.y <= self.max_y()
    }

    /// Returns `true` if `other` lies entirely within this rectangle.
    #[must_use]
    pub fn contains_rect(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// The smallest rectangle containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Self::new(x, y, max_x - x, max_y - y)
    }

    /// Grow the rectangle by `margin` on every side.
    #[must_use]
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            margin.mul_add(2.0, self.width),
            margin.mul_add(2.0, self.height),
        )
    }

    /// Intersection with `other`, or `None` if they do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        (max_x > x && max_y > y).then(|| Self::new(x, y, max_x - x, max_y - y))
    }
}

/// A straight (non-premultiplied) RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const RED: Self = Self::rgb(255, 0, 0);
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    pub const GRAY: Self = Self::rgb(128, 128, 128);
    pub const LIGHT_GRAY: Self = Self::rgb(192, 192, 192);

    /// An opaque colour.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// A colour with explicit alpha.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// The same colour with alpha multiplied by `factor` (clamped to 0..=1).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn with_alpha_scaled(self, factor: f32) -> Self {
        let a = (f32::from(self.a) * factor.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }

    /// The same colour at half its alpha. Used for glyph backgrounds.
    #[must_use]
    pub const fn half_alpha(self) -> Self {
        Self {
            a: self.a / 2,
            ..self
        }
    }

    /// Convert to an `image` pixel.
    #[must_use]
    pub const fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

/// Metadata groups extracted from the image container.
///
/// Maps a group name (e.g. an EXIF directory) to its tags, each
/// mapping a tag name to a human-readable description.
pub type Metadata = BTreeMap<String, BTreeMap<String, String>>;

/// The immutable raster handed to every analyser of a run.
///
/// Holds straight RGBA samples plus whatever metadata the session could
/// extract. Construction rejects zero-sized rasters.
#[derive(Debug, Clone)]
pub struct ImageMatrix {
    pixels: RgbaImage,
    metadata: Metadata,
}

impl ImageMatrix {
    /// Wrap a decoded raster.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MalformedImage`] if either dimension is zero.
    pub fn new(pixels: RgbaImage, metadata: Metadata) -> Result<Self, SessionError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(SessionError::MalformedImage(format!(
                "raster has zero extent ({}x{})",
                pixels.width(),
                pixels.height()
            )));
        }
        Ok(Self { pixels, metadata })
    }

    /// The raster samples.
    #[must_use]
    pub const fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Metadata groups (possibly empty).
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Raster dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.pixels.width(),
            height: self.pixels.height(),
        }
    }

    /// Look up a single tag in a metadata group.
    #[must_use]
    pub fn tag(&self, group: &str, tag: &str) -> Option<&str> {
        self.metadata
            .get(group)
            .and_then(|tags| tags.get(tag))
            .map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    // --- Rect tests ---

    #[test]
    fn rect_union_spans_both() {
        let a = Rect::new(10.0, 10.0, 0.0, 0.0);
        let b = Rect::new(90.0, 90.0, 0.0, 0.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(10.0, 10.0, 80.0, 80.0));
    }

    #[test]
    fn rect_union_with_contained_rect_is_identity() {
        let outer = Rect::new(0.0, 0.0, 100.0, 50.0);
        let inner = Rect::new(10.0, 10.0, 5.0, 5.0);
        assert_eq!(outer.union(&inner), outer);
    }

    #[test]
    fn rect_expand_grows_every_side() {
        let r = Rect::at_point(Point::new(10.0, 10.0)).expand(5.0);
        assert_eq!(r, Rect::new(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn rect_from_corners_normalizes_order() {
        let r = Rect::from_corners(Point::new(30.0, 5.0), Point::new(10.0, 25.0));
        assert_eq!(r, Rect::new(10.0, 5.0, 20.0, 20.0));
    }

    #[test]
    fn rect_degenerate_and_contains() {
        let p = Rect::at_point(Point::new(3.0, 4.0));
        assert!(p.is_degenerate());
        assert!(p.contains(Point::new(3.0, 4.0)));
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!r.is_degenerate());
        assert!(r.contains(Point::new(10.0, 0.0)));
        assert!(!r.contains(Point::new(10.5, 0.0)));
        assert!(r.contains_rect(&Rect::new(2.0, 2.0, 3.0, 3.0)));
    }

    #[test]
    fn rect_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersect(&b), Some(Rect::new(5.0, 5.0, 5.0, 5.0)));
        let c = Rect::new(20.0, 20.0, 1.0, 1.0);
        assert_eq!(a.intersect(&c), None);
    }

    // --- Color tests ---

    #[test]
    fn color_alpha_scaling() {
        let c = Color::RED.with_alpha_scaled(0.5);
        assert_eq!(c.a, 128);
        assert_eq!(Color::RED.with_alpha_scaled(2.0).a, 255);
        assert_eq!(Color::RED.half_alpha().a, 127);
    }

    // --- ImageMatrix tests ---

    #[test]
    fn image_matrix_rejects_zero_extent() {
        let result = ImageMatrix::new(RgbaImage::new(0, 10), Metadata::new());
        assert!(matches!(result, Err(SessionError::MalformedImage(_))));
    }

    #[test]
    fn image_matrix_tag_lookup() {
        let mut metadata = Metadata::new();
        metadata
            .entry("Exif IFD0".to_string())
            .or_default()
            .insert("Software".to_string(), "Editor 2.0".to_string());
        let matrix = ImageMatrix::new(RgbaImage::new(4, 4), metadata).unwrap();
        assert_eq!(matrix.tag("Exif IFD0", "Software"), Some("Editor 2.0"));
        assert_eq!(matrix.tag("Exif IFD0", "Model"), None);
        assert_eq!(
            matrix.dimensions(),
            Dimensions {
                width: 4,
                height: 4
            }
        );
    }

    #[test]
    fn dimensions_serde_round_trip() {
        let d = Dimensions {
            width: 640,
            height: 480,
        };
        let json = serde_json::to_string(&d).unwrap();
        let deserialized: Dimensions = serde_json::from_str(&json).unwrap();
        assert_eq!(d, deserialized);
    }
}
