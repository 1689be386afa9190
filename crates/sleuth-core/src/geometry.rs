//! Geometry resolution for findings.
//!
//! Turns a [`Finding`] into the rectangles and arrow geometry that the
//! overlay needs: primary bounds, source bounds, the combined dirty
//! rectangle, and the correspondence arrow from source to primary.

use crate::finding::{Anchor, Extent, Finding};
use crate::types::{Point, Rect};

/// Margin added around the combined bounds to cover stroke width and
/// arrowheads.
pub const DIRTY_MARGIN: f64 = 5.0;

/// Length of the arrowhead barbs.
pub const ARROW_WIDTH: f64 = 12.0;

/// Half-angle between the arrow shaft and each barb.
pub const ARROW_ANGLE: f64 = 20.0_f64.to_radians();

/// Axis-aligned bounds of one anchor.
///
/// Circles and rectangles are centred on the anchor, images extend
/// right and down from it, outlines use their own bounds, and a bare
/// point degenerates to a zero-sized rectangle at the location.
#[must_use]
pub fn anchor_bounds(anchor: &Anchor) -> Rect {
    let Point { x, y } = anchor.location;
    match &anchor.extent {
        Extent::Point => Rect::at_point(anchor.location),
        Extent::Circle { radius } => Rect::new(x - radius, y - radius, radius * 2.0, radius * 2.0),
        Extent::Rectangle { width, height } => {
            Rect::new(x - width / 2.0, y - height / 2.0, *width, *height)
        }
        Extent::Outline(outline) => outline
            .bounds()
            .unwrap_or_else(|| Rect::at_point(anchor.location)),
        Extent::Image(image) => Rect::new(x, y, f64::from(image.width()), f64::from(image.height())),
    }
}

/// Bounds of the finding's primary anchor.
#[must_use]
pub fn primary_bounds(finding: &Finding) -> Rect {
    anchor_bounds(finding.primary())
}

/// Bounds of the finding's source anchor, if it has one.
#[must_use]
pub fn source_bounds(finding: &Finding) -> Option<Rect> {
    finding.source().map(anchor_bounds)
}

/// Region to invalidate when the finding is drawn: the union of the
/// primary and source bounds, grown by `margin`.
#[must_use]
pub fn dirty_rect_with_margin(finding: &Finding, margin: f64) -> Rect {
    let primary = primary_bounds(finding);
    let combined = source_bounds(finding).map_or(primary, |source| primary.union(&source));
    combined.expand(margin)
}

/// [`dirty_rect_with_margin`] with the default [`DIRTY_MARGIN`].
#[must_use]
pub fn dirty_rect(finding: &Finding) -> Rect {
    dirty_rect_with_margin(finding, DIRTY_MARGIN)
}

/// A directed correspondence arrow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrow {
    /// Where the shaft starts (the source anchor).
    pub tail: Point,
    /// The arrow tip (the primary anchor).
    pub tip: Point,
    /// Where the shaft ends, half an arrowhead back from the tip so the
    /// square line cap does not poke through the head.
    pub shaft_end: Point,
    /// The two barb corners of the triangular head.
    pub barbs: [Point; 2],
    /// Direction of travel, `atan2(dy, dx)` from tail to tip.
    pub angle: f64,
}

impl Arrow {
    /// Compute the arrow from `tail` to `tip` with the given head size.
    #[must_use]
    pub fn between(tail: Point, tip: Point, head_width: f64, head_angle: f64) -> Self {
        let angle = (tip.y - tail.y).atan2(tip.x - tail.x);
        let back = angle + std::f64::consts::PI;
        let shaft_end = Point::new(
            (head_width / 2.0).mul_add(back.cos(), tip.x),
            (head_width / 2.0).mul_add(back.sin(), tip.y),
        );
        let barb = |offset: f64| {
            Point::new(
                head_width.mul_add((back + offset).cos(), tip.x),
                head_width.mul_add((back + offset).sin(), tip.y),
            )
        };
        Self {
            tail,
            tip,
            shaft_end,
            barbs: [barb(head_angle), barb(-head_angle)],
            angle,
        }
    }

    /// The closed triangle of the arrowhead: tip then both barbs.
    #[must_use]
    pub const fn head(&self) -> [Point; 3] {
        [self.tip, self.barbs[0], self.barbs[1]]
    }
}

/// The correspondence arrow for a finding with a source, using the
/// default head geometry.
#[must_use]
pub fn correspondence_arrow(finding: &Finding) -> Option<Arrow> {
    finding
        .source()
        .map(|source| Arrow::between(source.location, finding.location(), ARROW_WIDTH, ARROW_ANGLE))
}
