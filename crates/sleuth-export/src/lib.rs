//! sleuth-export: Pure format serializers (sans-IO)
//!
//! Converts overlay frames into SVG and analysis reports into JSON
//! documents. Nothing here touches the filesystem.

pub mod json;
pub mod svg;

pub use json::{ExportError, FindingDocument, GroupDocument, ReportDocument, SourceDocument};
pub use svg::{SvgMetadata, to_overlay_svg};
