//! The findings model: one reported anomaly per [`Finding`].
//!
//! A finding always has a primary [`Anchor`] and may carry a second
//! "source" anchor marking where the anomaly was copied or resampled
//! from. Each anchor owns exactly one [`Extent`], so combinations such as
//! "circle and rectangle on the same anchor" cannot be expressed.
//!
//! Findings are immutable and identified by [`FindingId`], not by value:
//! two structurally identical findings stay individually selectable and
//! individually cached. They are shared as [`FindingRef`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use geo::BoundingRect;
use serde::{Deserialize, Serialize};

use crate::types::{Color, Point, Rect, RgbaImage};

/// Ordered criticality of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// All severities, lowest first.
    pub const ALL: [Self; 4] = [Self::Info, Self::Warning, Self::Error, Self::Critical];

    /// Display colour associated with the level, if any.
    ///
    /// `Info` carries no colour; consumers pick their own fallback.
    #[must_use]
    pub const fn color(self) -> Option<Color> {
        match self {
            Self::Info => None,
            Self::Warning => Some(Color::rgb(255, 200, 0)),
            Self::Error => Some(Color::rgb(255, 96, 0)),
            Self::Critical => Some(Color::rgb(255, 0, 0)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
        })
    }
}

/// A free-form closed outline in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Outline {
    /// An arbitrary polygon (exterior ring; holes are ignored for bounds).
    Polygon(geo::Polygon<f64>),
    /// An axis-aligned ellipse.
    Ellipse {
        center: Point,
        radius_x: f64,
        radius_y: f64,
    },
    /// An axis-aligned rectangle.
    Rectangle(Rect),
}

impl Outline {
    /// Build a polygon outline from its exterior vertices.
    #[must_use]
    pub fn polygon(points: &[Point]) -> Self {
        let ring: Vec<(f64, f64)> = points.iter().map(|p| (p.x, p.y)).collect();
        Self::Polygon(geo::Polygon::new(geo::LineString::from(ring), vec![]))
    }

    /// Axis-aligned bounds of the outline.
    ///
    /// An empty polygon has no bounds; callers fall back to the anchor.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        match self {
            Self::Polygon(polygon) => polygon.bounding_rect().map(|r| {
                Rect::from_corners(
                    Point::new(r.min().x, r.min().y),
                    Point::new(r.max().x, r.max().y),
                )
            }),
            Self::Ellipse {
                center,
                radius_x,
                radius_y,
            } => Some(Rect::new(
                center.x - radius_x,
                center.y - radius_y,
                radius_x * 2.0,
                radius_y * 2.0,
            )),
            Self::Rectangle(rect) => Some(*rect),
        }
    }

    /// Exterior vertices of a polygon outline, without the closing point.
    #[must_use]
    pub fn vertices(&self) -> Vec<Point> {
        match self {
            Self::Polygon(polygon) => {
                let mut points: Vec<Point> = polygon
                    .exterior()
                    .points()
                    .map(|p| Point::new(p.x(), p.y()))
                    .collect();
                if points.len() > 1 && points.first() == points.last() {
                    points.pop();
                }
                points
            }
            Self::Ellipse { .. } | Self::Rectangle(_) => Vec::new(),
        }
    }
}

/// The single visual capability attached to an anchor.
#[derive(Debug, Clone)]
pub enum Extent {
    /// A dimensionless point.
    Point,
    /// A circle of the given radius centred on the anchor.
    Circle { radius: f64 },
    /// A rectangle centred on the anchor.
    Rectangle { width: f64, height: f64 },
    /// A free-form outline placed near the anchor.
    Outline(Outline),
    /// A small raster composited with its top-left corner at the anchor.
    Image(Arc<RgbaImage>),
}

impl Extent {
    /// Short machine-friendly name of the capability.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Circle { .. } => "circle",
            Self::Rectangle { .. } => "rectangle",
            Self::Outline(_) => "outline",
            Self::Image(_) => "image",
        }
    }
}

/// A location plus the capability drawn there.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub location: Point,
    pub extent: Extent,
}

impl Anchor {
    /// A bare point.
    #[must_use]
    pub const fn point(x: f64, y: f64) -> Self {
        Self {
            location: Point::new(x, y),
            extent: Extent::Point,
        }
    }

    /// A circle of `radius` centred at `(x, y)`.
    #[must_use]
    pub const fn circle(x: f64, y: f64, radius: f64) -> Self {
        Self {
            location: Point::new(x, y),
            extent: Extent::Circle { radius },
        }
    }

    /// A `width`×`height` rectangle centred at `(x, y)`.
    #[must_use]
    pub const fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            location: Point::new(x, y),
            extent: Extent::Rectangle { width, height },
        }
    }

    /// A free-form outline anchored at `(x, y)`.
    #[must_use]
    pub const fn outline(x: f64, y: f64, outline: Outline) -> Self {
        Self {
            location: Point::new(x, y),
            extent: Extent::Outline(outline),
        }
    }

    /// An embedded raster with its top-left corner at `(x, y)`.
    #[must_use]
    pub fn image(x: f64, y: f64, image: RgbaImage) -> Self {
        Self {
            location: Point::new(x, y),
            extent: Extent::Image(Arc::new(image)),
        }
    }
}

/// Process-unique identity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FindingId(u64);

impl FindingId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One reported anomaly.
///
/// Deliberately not `Clone`: a copy would share the identity of the
/// original. Share findings through [`FindingRef`].
#[derive(Debug)]
pub struct Finding {
    id: FindingId,
    label: String,
    severity: Severity,
    primary: Anchor,
    source: Option<Anchor>,
}

/// Shared handle to an immutable finding.
pub type FindingRef = Arc<Finding>;

impl Finding {
    /// Create a finding with a fresh identity.
    #[must_use]
    pub fn new(label: impl Into<String>, severity: Severity, primary: Anchor) -> Self {
        Self {
            id: FindingId::next(),
            label: label.into(),
            severity,
            primary,
            source: None,
        }
    }

    /// Attach a source anchor (copy-move origin, resample correlate, ...).
    ///
    /// A finding with a source is always drawn with a correspondence
    /// arrow from the source to the primary location.
    #[must_use]
    pub fn with_source(mut self, source: Anchor) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub const fn id(&self) -> FindingId {
        self.id
    }

    /// One-line caption, used verbatim in report trees.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub const fn primary(&self) -> &Anchor {
        &self.primary
    }

    #[must_use]
    pub const fn source(&self) -> Option<&Anchor> {
        self.source.as_ref()
    }

    /// Primary location.
    #[must_use]
    pub const fn location(&self) -> Point {
        self.primary.location
    }

    /// The embedded raster, if the primary anchor carries one.
    #[must_use]
    pub fn embedded_image(&self) -> Option<&Arc<RgbaImage>> {
        match &self.primary.extent {
            Extent::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Wrap into a shared handle.
    #[must_use]
    pub fn into_ref(self) -> FindingRef {
        Arc::new(self)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
    }

    #[test]
    fn info_has_no_color() {
        assert!(Severity::Info.color().is_none());
        assert_eq!(Severity::Critical.color(), Some(Color::RED));
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }

    #[test]
    fn identical_findings_have_distinct_ids() {
        let a = Finding::new("same", Severity::Warning, Anchor::point(1.0, 1.0));
        let b = Finding::new("same", Severity::Warning, Anchor::point(1.0, 1.0));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn with_source_sets_source_anchor() {
        let f = Finding::new("moved", Severity::Critical, Anchor::point(10.0, 10.0))
            .with_source(Anchor::point(90.0, 90.0));
        assert_eq!(f.source().unwrap().location, Point::new(90.0, 90.0));
        assert_eq!(f.location(), Point::new(10.0, 10.0));
    }

    #[test]
    fn embedded_image_only_on_image_extent() {
        let f = Finding::new(
            "patch",
            Severity::Error,
            Anchor::image(0.0, 0.0, RgbaImage::new(3, 2)),
        );
        assert_eq!(f.embedded_image().unwrap().dimensions(), (3, 2));
        let g = Finding::new("dot", Severity::Error, Anchor::point(0.0, 0.0));
        assert!(g.embedded_image().is_none());
    }

    #[test]
    fn polygon_outline_bounds() {
        let outline = Outline::polygon(&[
            Point::new(2.0, 3.0),
            Point::new(12.0, 5.0),
            Point::new(7.0, 13.0),
        ]);
        assert_eq!(outline.bounds(), Some(Rect::new(2.0, 3.0, 10.0, 10.0)));
        assert_eq!(outline.vertices().len(), 3);
    }

    #[test]
    fn empty_polygon_has_no_bounds() {
        assert_eq!(Outline::polygon(&[]).bounds(), None);
    }

    #[test]
    fn ellipse_outline_bounds() {
        let outline = Outline::Ellipse {
            center: Point::new(20.0, 20.0),
            radius_x: 6.0,
            radius_y: 3.0,
        };
        assert_eq!(outline.bounds(), Some(Rect::new(14.0, 17.0, 12.0, 6.0)));
    }

    #[test]
    fn display_uses_label() {
        let f = Finding::new("Cloned region", Severity::Critical, Anchor::point(0.0, 0.0));
        assert_eq!(f.to_string(), "Cloned region");
    }
}
