//! sleuth: command-line image-forensics workbench.
//!
//! Opens an image, runs the built-in analysers on a background worker
//! while streaming their progress to stderr, then prints the grouped
//! findings and per-analyser diagnostics. Optionally exports the report as
//! JSON, and the overlay of one finding as SVG or as a PNG rendered over
//! the image.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin sleuth -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use image::imageops;
use log::debug;
use serde::{Deserialize, Serialize};
use sleuth_core::{
    AnalysisEvent, AnalysisReport, DuplicateBlockAnalyser, DuplicateBlockConfig, ExecutionMode,
    FindingRef, ImageSession, MetadataAnalyser, OrchestratorConfig, ReportIndex,
};
use sleuth_export::{ReportDocument, SvgMetadata, to_overlay_svg};
use sleuth_overlay::render::CHECKER_SQUARE;
use sleuth_overlay::{OverlayConfig, checkerboard, frame_for, opacity_at, render_frame};

/// Run forensic analysers over an image and report their findings.
#[derive(Parser)]
#[command(name = "sleuth", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Only run the named analyser (case-insensitive). Repeatable.
    #[arg(long = "analyser", value_name = "NAME")]
    analysers: Vec<String>,

    /// Run analysers in parallel.
    #[arg(long)]
    parallel: bool,

    /// Duplicate-block size in pixels.
    #[arg(long, default_value_t = DuplicateBlockConfig::DEFAULT_BLOCK_SIZE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    block_size: u32,

    /// Print the report as JSON instead of a human-readable tree.
    #[arg(long)]
    json: bool,

    /// Write the overlay of the selected finding as SVG.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write the image with the selected finding drawn over it as PNG.
    #[arg(long)]
    render: Option<PathBuf>,

    /// Finding to export, numbered as in the printed report.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    finding: usize,

    /// Full configuration as a JSON string.
    ///
    /// When provided, `--parallel` and `--block-size` are ignored.
    #[arg(long)]
    config_json: Option<String>,
}

/// Everything the CLI can configure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Config {
    orchestrator: OrchestratorConfig,
    duplicate_blocks: DuplicateBlockConfig,
    overlay: OverlayConfig,
}

fn config_from_cli(cli: &Cli) -> Result<Config, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(Config {
        orchestrator: OrchestratorConfig {
            execution: if cli.parallel {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            },
            ..OrchestratorConfig::default()
        },
        duplicate_blocks: DuplicateBlockConfig {
            block_size: cli.block_size,
            ..DuplicateBlockConfig::default()
        },
        overlay: OverlayConfig::default(),
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    debug!("configuration: {config:?}");

    let mut session = match ImageSession::open(&cli.image_path) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error opening {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let dimensions = session.image().dimensions();
    eprintln!(
        "Image: {} ({}x{})",
        session.name(),
        dimensions.width,
        dimensions.height,
    );

    session.register(Arc::new(MetadataAnalyser::new()));
    session.register(Arc::new(DuplicateBlockAnalyser::new(config.duplicate_blocks)));
    if !cli.analysers.is_empty() && session.enable_only(&cli.analysers) == 0 {
        eprintln!("No analyser matches {:?}", cli.analysers);
        return ExitCode::FAILURE;
    }

    let (report, status_log) = match analyse(&session, config.orchestrator) {
        Ok(result) => result,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let index = ReportIndex::build(&report);

    if cli.json {
        let document = ReportDocument::new(&index, &report, status_log);
        match document.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_tree(&index);
        println!();
        println!("{}", report.diagnostics().report());
    }

    if cli.svg.is_none() && cli.render.is_none() {
        return ExitCode::SUCCESS;
    }

    let Some(finding) = nth_finding(&index, cli.finding) else {
        eprintln!(
            "No finding #{} (the report has {})",
            cli.finding,
            index.total_findings(),
        );
        return ExitCode::FAILURE;
    };

    let mut ok = true;
    if let Some(ref path) = cli.svg {
        ok &= write_svg(path, &session, &report, &finding, &config.overlay);
    }
    if let Some(ref path) = cli.render {
        ok &= write_render(path, &report, &finding, &config.overlay);
    }

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Run the enabled analysers on a worker thread, echoing events to stderr.
///
/// Returns the report and the status messages seen along the way.
fn analyse(
    session: &ImageSession,
    config: OrchestratorConfig,
) -> Result<(AnalysisReport, Vec<String>), String> {
    let handle = session
        .analyse(config)
        .map_err(|e| format!("Error starting analysis: {e}"))?;

    let mut status_log = Vec::new();
    let mut last_decile = 0;
    for event in handle.events() {
        match event {
            AnalysisEvent::Progress(fraction) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let decile = (fraction * 10.0).floor() as u32;
                if decile > last_decile {
                    last_decile = decile;
                    eprintln!("  {:>3}%", decile * 10);
                }
            }
            AnalysisEvent::Stage(stage) => eprintln!("[{stage}]"),
            AnalysisEvent::Analyser(name) => eprintln!("== {name}"),
            AnalysisEvent::Status(text) => {
                eprintln!("{text}");
                status_log.push(text);
            }
        }
    }
    eprintln!();

    let report = handle.join().map_err(|e| format!("Analysis error: {e}"))?;
    Ok((report, status_log))
}

fn print_tree(index: &ReportIndex) {
    let mut number = 0;
    for group in index.groups() {
        println!("{} ({} findings)", group.label(), group.len());
        for finding in group.findings() {
            number += 1;
            let at = finding.location();
            println!(
                "  {number:>3}. [{:<8}] {} at ({}, {})",
                finding.severity(),
                finding.label(),
                at.x,
                at.y,
            );
        }
    }
    if let Some(severity) = index.highest_severity() {
        println!();
        println!(
            "{} findings, highest severity: {severity}",
            index.total_findings()
        );
    }
}

/// The `n`th finding (1-based) in report order.
fn nth_finding(index: &ReportIndex, n: usize) -> Option<FindingRef> {
    index
        .groups()
        .iter()
        .flat_map(|g| g.findings())
        .nth(n.checked_sub(1)?)
        .cloned()
}

/// Fill opacity used for static exports: the pulse peak.
fn peak_opacity(overlay: &OverlayConfig) -> f32 {
    opacity_at(&overlay.pulse, overlay.pulse.period() / 2)
}

fn write_svg(
    path: &Path,
    session: &ImageSession,
    report: &AnalysisReport,
    finding: &FindingRef,
    overlay: &OverlayConfig,
) -> bool {
    let frame = frame_for(finding, overlay, peak_opacity(overlay));
    let metadata = SvgMetadata {
        title: Some(session.name()),
        description: Some(finding.label()),
    };
    let svg = to_overlay_svg(report.image().dimensions(), &frame.primitives, &metadata);
    match std::fs::write(path, &svg) {
        Ok(()) => {
            eprintln!("SVG written to {} ({} bytes)", path.display(), svg.len());
            true
        }
        Err(e) => {
            eprintln!("Error writing SVG to {}: {e}", path.display());
            false
        }
    }
}

fn write_render(
    path: &Path,
    report: &AnalysisReport,
    finding: &FindingRef,
    overlay: &OverlayConfig,
) -> bool {
    let pixels = report.image().pixels();
    let mut base = checkerboard(pixels.width(), pixels.height(), CHECKER_SQUARE);
    imageops::overlay(&mut base, pixels, 0, 0);

    let frame = frame_for(finding, overlay, peak_opacity(overlay));
    let rendered = match render_frame(&base, &frame) {
        Ok(img) => img,
        Err(e) => {
            eprintln!("Error rendering finding: {e}");
            return false;
        }
    };
    match rendered.save(path) {
        Ok(()) => {
            eprintln!("Rendering written to {}", path.display());
            true
        }
        Err(e) => {
            eprintln!("Error writing rendering to {}: {e}", path.display());
            false
        }
    }
}
