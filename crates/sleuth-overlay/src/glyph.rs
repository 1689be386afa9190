//! Per-finding glyphs for list and tree views.
//!
//! A glyph is a 16x16 icon chosen from the finding's capabilities, first
//! match wins:
//!
//! 1. thumbnail of the embedded image
//! 2. triangle, when the finding has a source
//! 3. rectangle, for rectangle and outline extents
//! 4. circle
//! 5. point
//!
//! Shapes are filled with the severity colour at half alpha and outlined in
//! the full colour.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::imageops::{self, FilterType};
use log::debug;
use parking_lot::RwLock;
use serde::Serialize;
use sleuth_core::finding::{Extent, Finding, FindingId};
use sleuth_core::{Color, Point, Rect, RgbaImage};
use tiny_skia::{Pixmap, Transform};

use crate::primitive::{Shape, ShapeOutline};
use crate::render::{draw_shape, pixmap_to_rgba};

/// Side of a glyph, in pixels.
pub const GLYPH_SIZE: u32 = 16;

/// Side of an embedded-image thumbnail inside a glyph.
pub const THUMBNAIL_SIZE: u32 = 14;

/// Colour for severities without one.
pub const GLYPH_FALLBACK_COLOR: Color = Color::BLACK;

const GLYPH_STROKE_WIDTH: f64 = 2.0;

/// Which icon a glyph shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlyphKind {
    Thumbnail,
    Triangle,
    Rectangle,
    Circle,
    Point,
}

impl GlyphKind {
    /// Pick the icon for `finding`.
    #[must_use]
    pub fn for_finding(finding: &Finding) -> Self {
        if finding.embedded_image().is_some() {
            return Self::Thumbnail;
        }
        if finding.source().is_some() {
            return Self::Triangle;
        }
        match finding.primary().extent {
            Extent::Rectangle { .. } | Extent::Outline(_) => Self::Rectangle,
            Extent::Circle { .. } => Self::Circle,
            Extent::Point | Extent::Image(_) => Self::Point,
        }
    }

    fn outline(self) -> Option<ShapeOutline> {
        let center = Point::new(8.0, 8.0);
        match self {
            Self::Thumbnail => None,
            Self::Triangle => Some(ShapeOutline::Polygon(vec![
                Point::new(4.0, 4.0),
                Point::new(11.0, 8.0),
                Point::new(4.0, 12.0),
            ])),
            Self::Rectangle => Some(ShapeOutline::Rectangle(Rect::new(4.0, 4.0, 8.0, 8.0))),
            Self::Circle => Some(ShapeOutline::circle(center, 4.0)),
            Self::Point => Some(ShapeOutline::circle(center, 2.0)),
        }
    }
}

/// A rendered glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub kind: GlyphKind,
    pub image: RgbaImage,
}

/// Render the glyph of `finding`.
#[must_use]
pub fn render_glyph(finding: &Finding) -> Glyph {
    let kind = GlyphKind::for_finding(finding);
    let image = match (finding.embedded_image(), kind.outline()) {
        (Some(embedded), _) => thumbnail(embedded),
        (None, Some(outline)) => {
            let color = finding.severity().color().unwrap_or(GLYPH_FALLBACK_COLOR);
            shape_icon(&Shape {
                outline,
                fill: Some(color.half_alpha()),
                stroke: Some(color),
                stroke_width: GLYPH_STROKE_WIDTH,
            })
        }
        (None, None) => RgbaImage::new(GLYPH_SIZE, GLYPH_SIZE),
    };
    Glyph { kind, image }
}

fn thumbnail(embedded: &RgbaImage) -> RgbaImage {
    let scaled = imageops::resize(embedded, THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle);
    let mut icon = RgbaImage::new(GLYPH_SIZE, GLYPH_SIZE);
    imageops::overlay(&mut icon, &scaled, 1, 1);
    icon
}

fn shape_icon(shape: &Shape) -> RgbaImage {
    let Some(mut pixmap) = Pixmap::new(GLYPH_SIZE, GLYPH_SIZE) else {
        return RgbaImage::new(GLYPH_SIZE, GLYPH_SIZE);
    };
    draw_shape(&mut pixmap, shape, Transform::identity());
    pixmap_to_rgba(&pixmap)
}

/// Lazily populated glyphs keyed by finding identity.
///
/// Readers share the lock; a miss renders outside any lock and the first
/// insert for a key wins, so concurrent first touches may render twice but
/// every caller receives the same [`Arc`]. Entries are never evicted.
#[derive(Debug, Default)]
pub struct GlyphCache {
    glyphs: RwLock<HashMap<FindingId, Arc<Glyph>>>,
    renders: AtomicUsize,
}

impl GlyphCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The glyph of `finding`, rendering it on first use.
    pub fn get(&self, finding: &Finding) -> Arc<Glyph> {
        let id = finding.id();
        if let Some(glyph) = self.glyphs.read().get(&id) {
            return Arc::clone(glyph);
        }

        let rendered = Arc::new(render_glyph(finding));
        self.renders.fetch_add(1, Ordering::Relaxed);
        debug!("rendered {:?} glyph for finding {id}", rendered.kind);

        Arc::clone(self.glyphs.write().entry(id).or_insert(rendered))
    }

    /// The cached glyph of `id`, without rendering.
    #[must_use]
    pub fn cached(&self, id: FindingId) -> Option<Arc<Glyph>> {
        self.glyphs.read().get(&id).cloned()
    }

    /// Number of glyph renders so far, including ones that lost an insert
    /// race.
    #[must_use]
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.glyphs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.glyphs.read().is_empty()
    }
}
