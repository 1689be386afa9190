//! Reference analysers shipped with the core.
//!
//! These are deliberately simple: they exist so every kind of finding
//! (point, rectangle extents, source correspondences) is produced by a
//! real analyser, not to be state-of-the-art detectors.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hasher;

use log::debug;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::analyser::{Analyser, AnalyserError, Reporter};
use crate::finding::{Anchor, Finding, Severity};
use crate::session::ContainerMetadata;
use crate::types::{ImageMatrix, Point, RgbaImage};

/// Tags that name the software which produced or touched the file.
const SOFTWARE_TAGS: &[&str] = &[
    "Software",
    "Processing Software",
    "Creator Tool",
    "History Software Agent",
];

/// Flags metadata that points at an image editor, and containers whose
/// declared dimensions disagree with the decoded raster.
#[derive(Debug, Clone)]
pub struct MetadataAnalyser {
    editors: Vec<String>,
}

impl MetadataAnalyser {
    /// Editors recognised by default (matched case-insensitively as
    /// substrings of the tag value).
    pub const DEFAULT_EDITORS: &'static [&'static str] = &[
        "photoshop",
        "gimp",
        "paint.net",
        "lightroom",
        "affinity",
        "pixelmator",
        "snapseed",
        "picasa",
    ];

    #[must_use]
    pub fn new() -> Self {
        Self::with_editors(Self::DEFAULT_EDITORS.iter().copied())
    }

    /// Recognise a custom set of editors.
    #[must_use]
    pub fn with_editors<'a>(editors: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            editors: editors.into_iter().map(str::to_lowercase).collect(),
        }
    }

    fn known_editor(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        self.editors.iter().any(|e| value.contains(e.as_str()))
    }
}

impl Default for MetadataAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyser for MetadataAnalyser {
    fn name(&self) -> Option<&str> {
        Some("Metadata")
    }

    fn description(&self) -> &str {
        "Looks for editing software and inconsistent container headers in the image metadata"
    }

    fn analyse(
        &self,
        image: &ImageMatrix,
        reporter: &Reporter<'_>,
    ) -> Result<Vec<Finding>, AnalyserError> {
        let mut findings = Vec::new();

        for (group, tags) in image.metadata() {
            for (tag, value) in tags {
                if !SOFTWARE_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                    continue;
                }
                let finding = if self.known_editor(value) {
                    Finding::new(
                        format!("Edited with {value} ({group}: {tag})"),
                        Severity::Warning,
                        Anchor::point(0.0, 0.0),
                    )
                } else {
                    Finding::new(
                        format!("Produced by {value} ({group}: {tag})"),
                        Severity::Info,
                        Anchor::point(0.0, 0.0),
                    )
                };
                findings.push(finding);
            }
        }
        reporter.progress(0.5);

        let dims = image.dimensions();
        let declared = |tag: &str| {
            image
                .tag(ContainerMetadata::FILE_GROUP, tag)
                .and_then(|v| v.parse::<u32>().ok())
        };
        if let (Some(width), Some(height)) = (declared("Width"), declared("Height"))
            && (width, height) != (dims.width, dims.height)
        {
            let w = f64::from(dims.width);
            let h = f64::from(dims.height);
            findings.push(Finding::new(
                format!(
                    "Container declares {width}x{height} but raster is {}x{}",
                    dims.width, dims.height
                ),
                Severity::Error,
                Anchor::rectangle(w / 2.0, h / 2.0, w, h),
            ));
        }

        debug!("metadata analyser produced {} findings", findings.len());
        Ok(findings)
    }
}

/// Configuration for [`DuplicateBlockAnalyser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateBlockConfig {
    /// Side length of the square blocks, in pixels.
    pub block_size: u32,

    /// Minimum distance between a block and its duplicate, in pixels.
    /// Closer pairs are ignored.
    pub min_offset: u32,

    /// Stop after this many findings.
    pub max_findings: usize,
}

impl DuplicateBlockConfig {
    pub const DEFAULT_BLOCK_SIZE: u32 = 8;
    pub const DEFAULT_MIN_OFFSET: u32 = 16;
    pub const DEFAULT_MAX_FINDINGS: usize = 100;
}

impl Default for DuplicateBlockConfig {
    fn default() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            min_offset: Self::DEFAULT_MIN_OFFSET,
            max_findings: Self::DEFAULT_MAX_FINDINGS,
        }
    }
}

/// Exact copy-move detection on a block grid.
///
/// The raster is cut into `block_size` squares on a regular grid. Each
/// non-uniform block is hashed with SipHash; a block whose bytes equal
/// an earlier block's is reported as copied from it. Uniform blocks
/// (flat sky, padding) are skipped since they repeat naturally.
#[derive(Debug, Clone, Default)]
pub struct DuplicateBlockAnalyser {
    config: DuplicateBlockConfig,
}

impl DuplicateBlockAnalyser {
    #[must_use]
    pub const fn new(config: DuplicateBlockConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &DuplicateBlockConfig {
        &self.config
    }
}

impl Analyser for DuplicateBlockAnalyser {
    fn name(&self) -> Option<&str> {
        Some("Duplicate blocks")
    }

    fn description(&self) -> &str {
        "Finds grid blocks that appear more than once (copy-move forgery)"
    }

    fn analyse(
        &self,
        image: &ImageMatrix,
        reporter: &Reporter<'_>,
    ) -> Result<Vec<Finding>, AnalyserError> {
        let size = self.config.block_size;
        let pixels = image.pixels();
        let (width, height) = pixels.dimensions();
        if size == 0 {
            return Err(AnalyserError::Unsupported(
                "block size must be positive".to_string(),
            ));
        }
        if width < size || height < size {
            return Err(AnalyserError::Unsupported(format!(
                "{width}x{height} raster is smaller than one {size}px block"
            )));
        }

        let rows = height / size;
        let cols = width / size;
        let min_offset = f64::from(self.config.min_offset);
        let mut first_seen: HashMap<u64, (u32, u32)> = HashMap::new();
        let mut findings = Vec::new();

        reporter.stage(format!("Hashing {} blocks", u64::from(rows) * u64::from(cols)));
        'rows: for row in 0..rows {
            if reporter.is_cancelled() {
                return Err(AnalyserError::Failed("cancelled".to_string()));
            }
            for col in 0..cols {
                let (x, y) = (col * size, row * size);
                let block = block_bytes(pixels, x, y, size);
                if is_uniform(&block) {
                    continue;
                }
                match first_seen.entry(hash_block(&block)) {
                    Entry::Vacant(slot) => {
                        slot.insert((x, y));
                    }
                    Entry::Occupied(slot) => {
                        let (sx, sy) = *slot.get();
                        let source = block_center(sx, sy, size);
                        let target = block_center(x, y, size);
                        if source.distance(target) < min_offset
                            || block_bytes(pixels, sx, sy, size) != block
                        {
                            continue;
                        }
                        if findings.len() >= self.config.max_findings {
                            reporter.status(format!(
                                "Duplicate blocks: stopped after {} findings",
                                self.config.max_findings
                            ));
                            break 'rows;
                        }
                        let side = f64::from(size);
                        findings.push(
                            Finding::new(
                                format!("Block at ({x}, {y}) duplicates ({sx}, {sy})"),
                                Severity::Critical,
                                Anchor::rectangle(target.x, target.y, side, side),
                            )
                            .with_source(Anchor::rectangle(source.x, source.y, side, side)),
                        );
                    }
                }
            }
            #[allow(clippy::cast_precision_loss)]
            let fraction = (row + 1) as f32 / rows as f32;
            reporter.progress(fraction);
        }

        debug!(
            "duplicate block analyser: {} distinct blocks, {} findings",
            first_seen.len(),
            findings.len()
        );
        Ok(findings)
    }
}

fn block_bytes(pixels: &RgbaImage, x: u32, y: u32, size: u32) -> Vec<u8> {
    let stride = pixels.width() as usize * 4;
    let raw = pixels.as_raw();
    let start_x = x as usize * 4;
    let len = size as usize * 4;
    (y..y + size)
        .flat_map(|row| {
            let offset = row as usize * stride + start_x;
            raw[offset..offset + len].iter().copied()
        })
        .collect()
}

fn is_uniform(block: &[u8]) -> bool {
    block.chunks_exact(4).all(|px| px == &block[..4])
}

fn hash_block(block: &[u8]) -> u64 {
    let mut hasher = SipHasher13::new();
    hasher.write(block);
    hasher.finish()
}

fn block_center(x: u32, y: u32, size: u32) -> Point {
    let half = f64::from(size) / 2.0;
    Point::new(f64::from(x) + half, f64::from(y) + half)
}
