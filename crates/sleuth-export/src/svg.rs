//! SVG export serializer.
//!
//! Converts overlay primitives into a standalone SVG document sized to the
//! analysed image, using the [`svg`] crate for document construction and
//! XML escaping. Shapes keep their fill and stroke colours; embedded
//! rasters are not inlined and appear as dashed placeholder rectangles.
//!
//! Optional [`SvgMetadata`] embeds `<title>` and `<desc>` elements.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::Text;
use svg::node::element::{Description, Ellipse, Group, Line, Polygon, Rectangle, Title};

use sleuth_core::{Color, Dimensions, Point};
use sleuth_overlay::{Arrow, Image, Primitive, Shape, ShapeOutline};

/// Stroke of embedded-image placeholders.
const PLACEHOLDER_STROKE: &str = "#808080";

/// Metadata to embed in the SVG document.
///
/// When present, a `<title>` and/or `<desc>` element is emitted right
/// after the opening `<svg>` tag. Text is XML-escaped by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, typically the image name.
    pub title: Option<&'a str>,

    /// Document description, typically the finding label.
    pub description: Option<&'a str>,
}

fn hex(color: Color) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
}

fn opacity(color: Color) -> f64 {
    f64::from(color.a) / 255.0
}

fn points_attr(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shape_group(shape: &Shape) -> Group {
    let mut group = Group::new();
    group = match shape.fill {
        Some(fill) => group
            .set("fill", hex(fill))
            .set("fill-opacity", opacity(fill)),
        None => group.set("fill", "none"),
    };
    group = match shape.stroke {
        Some(stroke) => group
            .set("stroke", hex(stroke))
            .set("stroke-opacity", opacity(stroke))
            .set("stroke-width", shape.stroke_width),
        None => group.set("stroke", "none"),
    };

    match &shape.outline {
        ShapeOutline::Ellipse {
            center,
            radius_x,
            radius_y,
        } => group.add(
            Ellipse::new()
                .set("cx", center.x)
                .set("cy", center.y)
                .set("rx", *radius_x)
                .set("ry", *radius_y),
        ),
        ShapeOutline::Rectangle(rect) => group.add(
            Rectangle::new()
                .set("x", rect.x)
                .set("y", rect.y)
                .set("width", rect.width)
                .set("height", rect.height),
        ),
        ShapeOutline::Polygon(points) => {
            group.add(Polygon::new().set("points", points_attr(points)))
        }
    }
}

fn arrow_group(arrow: &Arrow) -> Group {
    let color = hex(arrow.color);
    let shaft = Line::new()
        .set("x1", arrow.from.x)
        .set("y1", arrow.from.y)
        .set("x2", arrow.shaft_end.x)
        .set("y2", arrow.shaft_end.y)
        .set("stroke", color.clone())
        .set("stroke-width", arrow.width)
        .set("stroke-linecap", "round");
    let head = Polygon::new()
        .set("points", points_attr(&arrow.head))
        .set("fill", color);
    Group::new().set("class", "arrow").add(shaft).add(head)
}

fn image_placeholder(blit: &Image) -> Rectangle {
    Rectangle::new()
        .set("class", "embedded-image")
        .set("x", blit.at.x)
        .set("y", blit.at.y)
        .set("width", blit.image.width())
        .set("height", blit.image.height())
        .set("fill", "none")
        .set("stroke", PLACEHOLDER_STROKE)
        .set("stroke-dasharray", "2 2")
}

/// Serialize overlay primitives into an SVG document string.
///
/// The document's `width`, `height` and `viewBox` match `dimensions`, so
/// it can be layered directly over the analysed image. Primitives are
/// emitted in paint order.
#[must_use]
pub fn to_overlay_svg(
    dimensions: Dimensions,
    primitives: &[Primitive],
    metadata: &SvgMetadata<'_>,
) -> String {
    let w = dimensions.width;
    let h = dimensions.height;
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    for primitive in primitives {
        doc = match primitive {
            Primitive::Shape(shape) => doc.add(shape_group(shape)),
            Primitive::Arrow(arrow) => doc.add(arrow_group(arrow)),
            Primitive::Image(blit) => doc.add(image_placeholder(blit)),
        };
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sleuth_core::{Anchor, Finding, RgbaImage, Severity};
    use sleuth_overlay::{OverlayConfig, frame_for};

    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    #[test]
    fn empty_overlay_is_valid_svg() {
        let svg = to_overlay_svg(dims(100, 50), &[], &no_meta());
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"width="100""#));
        assert!(svg.contains(r#"height="50""#));
        assert!(svg.contains(r#"viewBox="0 0 100 50""#));
        assert!(svg.trim_end().ends_with("/>"));
    }

    #[test]
    fn metadata_is_escaped() {
        let meta = SvgMetadata {
            title: Some("a <b> & c"),
            description: Some("Block at (1, 2)"),
        };
        let svg = to_overlay_svg(dims(10, 10), &[], &meta);
        assert!(svg.contains("<title>"));
        assert!(svg.contains("a &lt;b&gt; &amp; c"));
        assert!(svg.contains("<desc>"));
        assert!(svg.contains("Block at (1, 2)"));
    }

    #[test]
    fn copy_move_frame() {
        let f = Finding::new("cm", Severity::Critical, Anchor::rectangle(50.0, 50.0, 8.0, 8.0))
            .with_source(Anchor::circle(10.0, 10.0, 4.0));
        let frame = frame_for(&f, &OverlayConfig::default(), 0.5);
        let svg = to_overlay_svg(dims(64, 64), &frame.primitives, &no_meta());

        assert!(svg.contains("<ellipse"));
        assert!(svg.contains("<rect"));
        assert!(svg.contains(r##"fill="#ff0000""##));
        assert!(svg.contains(r##"stroke="#0000ff""##));
        assert!(svg.contains(r#"class="arrow""#));
        assert!(svg.contains("<line"));
        // Primary extent precedes the arrow.
        let rect_at = svg.find("<rect").unwrap();
        let arrow_at = svg.find(r#"class="arrow""#).unwrap();
        assert!(rect_at < arrow_at);
    }

    #[test]
    fn embedded_image_becomes_placeholder() {
        let f = Finding::new("p", Severity::Error, Anchor::image(3.0, 4.0, RgbaImage::new(5, 6)));
        let frame = frame_for(&f, &OverlayConfig::default(), 1.0);
        let svg = to_overlay_svg(dims(20, 20), &frame.primitives, &no_meta());
        assert!(svg.contains(r#"class="embedded-image""#));
        assert!(svg.contains(r#"width="5""#));
        assert!(svg.contains(r#"height="6""#));
        assert!(!svg.contains("<image"));
    }

    #[test]
    fn polygon_points_are_listed() {
        let shape = Shape {
            outline: ShapeOutline::Polygon(vec![
                Point::new(0.0, 0.0),
                Point::new(4.5, 0.0),
                Point::new(2.0, 3.0),
            ]),
            fill: None,
            stroke: Some(Color::RED),
            stroke_width: 1.0,
        };
        let svg = to_overlay_svg(dims(8, 8), &[Primitive::Shape(shape)], &no_meta());
        assert!(svg.contains(r#"points="0,0 4.5,0 2,3""#));
        assert!(svg.contains(r#"fill="none""#));
    }
}
