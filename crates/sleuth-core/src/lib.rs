//! sleuth-core: analysis orchestration and the findings model (sans-UI).
//!
//! A run flows through:
//! decode -> [`ImageMatrix`] -> [`Orchestrator`] (fan-out to analysers)
//! -> [`AnalysisReport`] -> [`ReportIndex`] (grouping and labelling).
//!
//! Geometry resolution for findings (bounds, dirty rectangles,
//! correspondence arrows) lives in [`geometry`]; drawing them is left to
//! `sleuth-overlay`.

pub mod analyser;
pub mod builtin;
pub mod clock;
pub mod diagnostics;
pub mod finding;
pub mod geometry;
pub mod orchestrator;
pub mod report;
pub mod session;
pub mod types;

pub use analyser::{Analyser, AnalyserError, AnalyserHandle, Reporter};
pub use builtin::{DuplicateBlockAnalyser, DuplicateBlockConfig, MetadataAnalyser};
pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::{AnalyserDiagnostics, Outcome, RunDiagnostics};
pub use finding::{Anchor, Extent, Finding, FindingId, FindingRef, Outline, Severity};
pub use orchestrator::{
    AnalysisEvent, AnalysisReport, AnalysisRun, CancellationToken, ExecutionMode, Observer,
    Orchestrator, OrchestratorConfig, ReportEntry, RunError, RunHandle, observer_fn,
    spawn_analysis,
};
pub use report::{ReportGroup, ReportIndex};
pub use session::{
    ContainerMetadata, ImageSession, MetadataError, MetadataExtractor, SessionError, decode_image,
};
pub use types::{Color, Dimensions, ImageMatrix, Metadata, Point, Rect, RgbaImage};
