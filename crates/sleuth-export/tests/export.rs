//! Export a real analysis run to JSON and SVG.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use image::Rgba;
use parking_lot::Mutex;
use sleuth_core::{
    AnalysisEvent, AnalyserHandle, CancellationToken, DuplicateBlockAnalyser, ImageMatrix,
    Metadata, Orchestrator, OrchestratorConfig, Outcome, ReportIndex, RgbaImage, Severity,
    observer_fn,
};
use sleuth_export::{ReportDocument, SvgMetadata, to_overlay_svg};
use sleuth_overlay::{OverlayConfig, frame_for};

/// Noise with the top-left 8x8 block copied to (40, 24).
fn tampered() -> Arc<ImageMatrix> {
    let mut state = 0x9e37_79b9_u32;
    let mut pixels = RgbaImage::from_fn(64, 48, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgba([r, g, b, 255])
    });
    for dy in 0..8 {
        for dx in 0..8 {
            let px = *pixels.get_pixel(dx, dy);
            pixels.put_pixel(40 + dx, 24 + dy, px);
        }
    }
    Arc::new(ImageMatrix::new(pixels, Metadata::new()).unwrap())
}

fn run() -> (sleuth_core::AnalysisReport, Vec<String>) {
    let statuses = Mutex::new(Vec::new());
    let observer = observer_fn(|event| {
        if let AnalysisEvent::Status(text) = event {
            statuses.lock().push(text);
        }
    });
    let analysers: Vec<AnalyserHandle> = vec![Arc::new(DuplicateBlockAnalyser::default())];
    let report = Orchestrator::new(OrchestratorConfig::default())
        .run(tampered(), analysers, &observer, &CancellationToken::new())
        .unwrap();
    (report, statuses.into_inner())
}

#[test]
fn report_document_round_trips_through_json() {
    let (report, statuses) = run();
    let index = ReportIndex::build(&report);
    let document = ReportDocument::new(&index, &report, statuses);

    assert_eq!(document.image.width, 64);
    assert_eq!(document.image.height, 48);
    assert_eq!(document.groups.len(), 1);
    assert_eq!(document.groups[0].label, "Duplicate blocks");
    assert_eq!(document.total_findings(), 1);
    assert!(
        document
            .status_log
            .last()
            .unwrap()
            .starts_with("Analysis complete")
    );

    let json = document.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let finding = &value["groups"][0]["findings"][0];
    assert_eq!(finding["severity"], "critical");
    assert_eq!(finding["extent"], "rectangle");
    assert_eq!(finding["location"]["x"], 44.0);
    assert_eq!(finding["source"]["location"]["y"], 4.0);
    assert_eq!(value["diagnostics"]["analysers"][0]["outcome"]["status"], "completed");

    let back = ReportDocument::from_json(&json).unwrap();
    assert_eq!(back.groups, document.groups);
    assert_eq!(back.status_log, document.status_log);
    assert_eq!(back.diagnostics.analysers[0].outcome, Outcome::Completed);
}

#[test]
fn finding_overlay_as_svg() {
    let (report, _) = run();
    let index = ReportIndex::build(&report);
    let finding = &index.groups()[0].findings()[0];
    assert_eq!(finding.severity(), Severity::Critical);

    let frame = frame_for(finding, &OverlayConfig::default(), 1.0);
    let svg = to_overlay_svg(
        report.image().dimensions(),
        &frame.primitives,
        &SvgMetadata {
            title: Some("tampered"),
            description: Some(finding.label()),
        },
    );

    assert!(svg.contains(r#"viewBox="0 0 64 48""#));
    assert!(svg.contains("tampered"));
    assert!(svg.contains("duplicates"));
    assert_eq!(svg.matches("<rect").count(), 2);
    assert!(svg.contains(r#"class="arrow""#));
}
