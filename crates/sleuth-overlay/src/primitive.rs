//! Draw primitives and the frame of one finding.
//!
//! [`frame_for`] turns a finding into an ordered list of primitives:
//!
//! 1. primary point marker (omitted when the primary carries an image)
//! 2. source point marker (or the source's embedded image) and source
//!    extent, in blue
//! 3. primary extent, in the severity colour
//! 4. embedded image blit
//! 5. correspondence arrow, in white, on top of everything
//!
//! Fills are scaled by the pulse opacity; outlines stay opaque.

use std::sync::Arc;

use sleuth_core::finding::{Anchor, Extent, Finding, FindingId, Outline};
use sleuth_core::geometry::{self, dirty_rect_with_margin};
use sleuth_core::{Color, Point, Rect, RgbaImage};

use crate::config::OverlayConfig;

/// Colour of the source anchor and its extent.
pub const SOURCE_COLOR: Color = Color::BLUE;

/// Colour of the correspondence arrow.
pub const ARROW_COLOR: Color = Color::WHITE;

/// Fallback for severities without a colour.
pub const FALLBACK_COLOR: Color = Color::RED;

/// Closed outline of a shape primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeOutline {
    Ellipse {
        center: Point,
        radius_x: f64,
        radius_y: f64,
    },
    Rectangle(Rect),
    Polygon(Vec<Point>),
}

impl ShapeOutline {
    /// A circle.
    #[must_use]
    pub const fn circle(center: Point, radius: f64) -> Self {
        Self::Ellipse {
            center,
            radius_x: radius,
            radius_y: radius,
        }
    }

    /// Axis-aligned bounds.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Ellipse {
                center,
                radius_x,
                radius_y,
            } => Rect::new(
                center.x - radius_x,
                center.y - radius_y,
                radius_x * 2.0,
                radius_y * 2.0,
            ),
            Self::Rectangle(rect) => *rect,
            Self::Polygon(points) => points
                .iter()
                .map(|p| Rect::at_point(*p))
                .reduce(|a, b| a.union(&b))
                .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0)),
        }
    }
}

/// A filled and/or outlined shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub outline: ShapeOutline,
    pub fill: Option<Color>,
    pub stroke: Option<Color>,
    pub stroke_width: f64,
}

/// A correspondence arrow: a shaft plus a filled triangular head.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrow {
    pub from: Point,
    pub to: Point,
    /// Where the shaft stops, inside the head.
    pub shaft_end: Point,
    /// Tip and both barbs.
    pub head: [Point; 3],
    pub color: Color,
    pub width: f64,
}

/// An embedded raster drawn with its top-left corner at `at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub at: Point,
    pub image: Arc<RgbaImage>,
}

/// One drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Shape(Shape),
    Arrow(Arrow),
    Image(Image),
}

impl Primitive {
    /// Axis-aligned bounds, ignoring stroke width.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Shape(shape) => shape.outline.bounds(),
            Self::Arrow(arrow) => arrow
                .head
                .iter()
                .fold(Rect::from_corners(arrow.from, arrow.to), |acc, p| {
                    acc.union(&Rect::at_point(*p))
                }),
            Self::Image(blit) => Rect::new(
                blit.at.x,
                blit.at.y,
                f64::from(blit.image.width()),
                f64::from(blit.image.height()),
            ),
        }
    }
}

/// Everything needed to draw one finding at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub finding: FindingId,
    /// Pulse opacity the fills were scaled by.
    pub opacity: f32,
    /// Primitives in paint order.
    pub primitives: Vec<Primitive>,
    /// Region to invalidate for this finding.
    pub dirty: Rect,
}

/// Colour used for a finding's primary anchor.
#[must_use]
pub fn finding_color(finding: &Finding) -> Color {
    finding.severity().color().unwrap_or(FALLBACK_COLOR)
}

/// Outline of an anchor's extent, or `None` for points and images.
#[must_use]
pub fn extent_outline(anchor: &Anchor) -> Option<ShapeOutline> {
    let Point { x, y } = anchor.location;
    match &anchor.extent {
        Extent::Point | Extent::Image(_) => None,
        Extent::Circle { radius } => Some(ShapeOutline::circle(anchor.location, *radius)),
        Extent::Rectangle { width, height } => Some(ShapeOutline::Rectangle(Rect::new(
            x - width / 2.0,
            y - height / 2.0,
            *width,
            *height,
        ))),
        Extent::Outline(outline @ Outline::Polygon(_)) => {
            Some(ShapeOutline::Polygon(outline.vertices()))
        }
        Extent::Outline(Outline::Ellipse {
            center,
            radius_x,
            radius_y,
        }) => Some(ShapeOutline::Ellipse {
            center: *center,
            radius_x: *radius_x,
            radius_y: *radius_y,
        }),
        Extent::Outline(Outline::Rectangle(rect)) => Some(ShapeOutline::Rectangle(*rect)),
    }
}

fn point_marker(at: Point, config: &OverlayConfig, color: Color, opacity: f32) -> Primitive {
    extent_shape(
        ShapeOutline::circle(at, config.point_radius),
        color,
        opacity,
        config.stroke_width,
    )
}

fn extent_shape(outline: ShapeOutline, color: Color, opacity: f32, width: f64) -> Primitive {
    Primitive::Shape(Shape {
        outline,
        fill: Some(color.with_alpha_scaled(opacity)),
        stroke: Some(color),
        stroke_width: width,
    })
}

/// Build the frame of `finding` at pulse `opacity`.
#[must_use]
pub fn frame_for(finding: &Finding, config: &OverlayConfig, opacity: f32) -> Frame {
    let color = finding_color(finding);
    let primary = finding.primary();
    let mut primitives = Vec::new();

    if finding.embedded_image().is_none() {
        primitives.push(point_marker(primary.location, config, color, opacity));
    }

    if let Some(source) = finding.source() {
        if let Extent::Image(image) = &source.extent {
            primitives.push(Primitive::Image(Image {
                at: source.location,
                image: Arc::clone(image),
            }));
        } else {
            primitives.push(point_marker(source.location, config, SOURCE_COLOR, opacity));
        }
        if let Some(outline) = extent_outline(source) {
            primitives.push(extent_shape(outline, SOURCE_COLOR, opacity, config.stroke_width));
        }
    }

    if let Some(outline) = extent_outline(primary) {
        primitives.push(extent_shape(outline, color, opacity, config.stroke_width));
    }

    if let Some(image) = finding.embedded_image() {
        primitives.push(Primitive::Image(Image {
            at: primary.location,
            image: Arc::clone(image),
        }));
    }

    if let Some(source) = finding.source() {
        let arrow = geometry::Arrow::between(
            source.location,
            primary.location,
            config.arrow_width,
            config.arrow_angle(),
        );
        primitives.push(Primitive::Arrow(Arrow {
            from: arrow.tail,
            to: arrow.tip,
            shaft_end: arrow.shaft_end,
            head: arrow.head(),
            color: ARROW_COLOR,
            width: config.stroke_width,
        }));
    }

    Frame {
        finding: finding.id(),
        opacity,
        primitives,
        dirty: dirty_rect_with_margin(finding, config.dirty_margin),
    }
}
