//! The analysis orchestrator: fan one raster out to many analysers.
//!
//! [`Orchestrator::run`] invokes every analyser against the same
//! read-only [`ImageMatrix`], either one after another or concurrently
//! on the `rayon` pool, and streams [`AnalysisEvent`]s to an
//! [`Observer`] while it goes. The result is an [`AnalysisReport`] that
//! keeps the analysers in submission order.
//!
//! Failures are isolated per analyser: an error or panic is narrated as a
//! status event and the analyser contributes an empty entry. Only the
//! harness itself (cancellation, a dead worker thread) aborts a run.
//!
//! Progress is reported across the whole run, never per analyser. Each
//! analyser owns an equal share of `[0, 1]`; in-analyser progress is
//! mapped into that share. Values are quantised to
//! [`OrchestratorConfig::progress_steps`] and only emitted when they
//! exceed the last emitted value, so the observer sees a strictly
//! increasing sequence that ends at `1.0` once every analyser returned.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analyser::{AnalyserHandle, Reporter, display_name};
use crate::clock::{Clock, SystemClock};
use crate::diagnostics::{AnalyserDiagnostics, Outcome, RunDiagnostics};
use crate::finding::FindingRef;
use crate::types::ImageMatrix;

/// How analysers of one run are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One after another on the orchestrator's thread.
    #[default]
    Sequential,
    /// Concurrently on the `rayon` thread pool.
    Parallel,
}

/// Configuration for one orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Scheduling of the analysers.
    pub execution: ExecutionMode,

    /// Resolution of emitted progress values. Values below
    /// [`MIN_PROGRESS_STEPS`](Self::MIN_PROGRESS_STEPS) are raised to it.
    pub progress_steps: u32,
}

impl OrchestratorConfig {
    /// Default progress resolution.
    pub const DEFAULT_PROGRESS_STEPS: u32 = 1000;

    /// Lowest accepted progress resolution.
    pub const MIN_PROGRESS_STEPS: u32 = 1000;

    /// Progress resolution actually used by the orchestrator.
    #[must_use]
    pub const fn effective_progress_steps(&self) -> u32 {
        if self.progress_steps < Self::MIN_PROGRESS_STEPS {
            Self::MIN_PROGRESS_STEPS
        } else {
            self.progress_steps
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::default(),
            progress_steps: Self::DEFAULT_PROGRESS_STEPS,
        }
    }
}

/// One event in a run's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// Overall progress of the run in `[0, 1]`, never decreasing.
    Progress(f32),
    /// The current stage of work.
    Stage(String),
    /// An analyser is about to start.
    Analyser(String),
    /// Free-text narration for a log view.
    Status(String),
}

/// Receives the event stream of a run.
///
/// Events of one run arrive in the order the orchestrator emits them. In
/// parallel mode, events from different analysers may interleave.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: AnalysisEvent);
}

impl Observer for Sender<AnalysisEvent> {
    fn on_event(&self, event: AnalysisEvent) {
        // A dropped receiver means nobody is watching any more.
        let _ = self.send(event);
    }
}

/// [`Observer`] adapter for a closure. Created by [`observer_fn`].
#[derive(Clone, Copy)]
pub struct FnObserver<F>(F);

impl<F> Observer for FnObserver<F>
where
    F: Fn(AnalysisEvent) + Send + Sync,
{
    fn on_event(&self, event: AnalysisEvent) {
        (self.0)(event);
    }
}

/// Wrap a closure as an [`Observer`].
pub const fn observer_fn<F>(f: F) -> FnObserver<F>
where
    F: Fn(AnalysisEvent) + Send + Sync,
{
    FnObserver(f)
}

/// Cooperative cancellation flag shared between a run and its owner.
///
/// The orchestrator checks it before starting each analyser; analysers
/// may poll it through [`Reporter::is_cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The run was cancelled before every analyser had started.
    #[error("analysis cancelled")]
    Cancelled,

    /// The background worker died outside any analyser.
    #[error("analysis worker panicked: {0}")]
    WorkerPanicked(String),

    /// The background worker thread could not be started.
    #[error("failed to start analysis worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Per-analyser result of a run.
pub struct ReportEntry {
    analyser: AnalyserHandle,
    findings: Vec<FindingRef>,
    outcome: Outcome,
}

impl ReportEntry {
    #[must_use]
    pub fn analyser(&self) -> &AnalyserHandle {
        &self.analyser
    }

    /// Findings in the order the analyser returned them.
    #[must_use]
    pub fn findings(&self) -> &[FindingRef] {
        &self.findings
    }

    #[must_use]
    pub const fn outcome(&self) -> &Outcome {
        &self.outcome
    }
}

impl fmt::Debug for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportEntry")
            .field("analyser", &display_name(self.analyser.as_ref()))
            .field("findings", &self.findings)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// The in-flight record of a run.
///
/// Holds the raster, the analysers in submission order, and one result
/// slot per analyser. Only the orchestrator fills the slots; once the
/// run ends it is frozen into an [`AnalysisReport`].
pub struct AnalysisRun {
    image: Arc<ImageMatrix>,
    analysers: Vec<AnalyserHandle>,
    slots: Vec<Option<SlotResult>>,
}

struct SlotResult {
    findings: Vec<FindingRef>,
    diagnostics: AnalyserDiagnostics,
}

impl AnalysisRun {
    #[must_use]
    pub fn new(image: Arc<ImageMatrix>, analysers: Vec<AnalyserHandle>) -> Self {
        let slots = analysers.iter().map(|_| None).collect();
        Self {
            image,
            analysers,
            slots,
        }
    }

    #[must_use]
    pub const fn image(&self) -> &Arc<ImageMatrix> {
        &self.image
    }

    #[must_use]
    pub fn analysers(&self) -> &[AnalyserHandle] {
        &self.analysers
    }

    /// Number of analysers whose result has been recorded.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn record(&mut self, slot: usize, result: SlotResult) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(result);
        }
    }

    fn finish(self, diagnostics_base: RunDiagnostics) -> AnalysisReport {
        let mut diagnostics = diagnostics_base;
        let mut entries = Vec::with_capacity(self.analysers.len());
        for (analyser, slot) in self.analysers.into_iter().zip(self.slots) {
            let (findings, diag) = match slot {
                Some(result) => (result.findings, result.diagnostics),
                None => (
                    Vec::new(),
                    AnalyserDiagnostics {
                        name: display_name(analyser.as_ref()).to_string(),
                        duration: std::time::Duration::ZERO,
                        finding_count: 0,
                        outcome: Outcome::Failed("not run".to_string()),
                    },
                ),
            };
            entries.push(ReportEntry {
                analyser,
                findings,
                outcome: diag.outcome.clone(),
            });
            diagnostics.analysers.push(diag);
        }
        AnalysisReport {
            image: self.image,
            entries,
            diagnostics,
        }
    }
}

/// The immutable outcome of a completed run.
///
/// Contains one entry for every analyser passed in, in submission order,
/// including analysers that failed (their entry is empty).
#[derive(Debug)]
pub struct AnalysisReport {
    image: Arc<ImageMatrix>,
    entries: Vec<ReportEntry>,
    diagnostics: RunDiagnostics,
}

impl AnalysisReport {
    /// The raster the run analysed.
    #[must_use]
    pub const fn image(&self) -> &Arc<ImageMatrix> {
        &self.image
    }

    #[must_use]
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Findings of a specific analyser, looked up by identity.
    #[must_use]
    pub fn findings_for(&self, analyser: &AnalyserHandle) -> Option<&[FindingRef]> {
        self.entries
            .iter()
            .find(|e| Arc::ptr_eq(&e.analyser, analyser))
            .map(ReportEntry::findings)
    }

    /// All findings, grouped by analyser in submission order.
    pub fn findings(&self) -> impl Iterator<Item = &FindingRef> {
        self.entries.iter().flat_map(|e| e.findings.iter())
    }

    #[must_use]
    pub fn total_findings(&self) -> usize {
        self.entries.iter().map(|e| e.findings.len()).sum()
    }

    #[must_use]
    pub const fn diagnostics(&self) -> &RunDiagnostics {
        &self.diagnostics
    }
}

/// Tracks per-analyser progress and the last value sent to the observer.
struct ProgressGate {
    fractions: Vec<f64>,
    steps: u32,
    emitted: u32,
}

impl ProgressGate {
    const fn new(fractions: Vec<f64>, steps: u32) -> Self {
        Self {
            fractions,
            steps,
            emitted: 0,
        }
    }

    /// Record a slot's fraction and return the overall value to emit, if
    /// it moved by at least one step.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn update(&mut self, slot: usize, fraction: f64) -> Option<f32> {
        let current = self.fractions.get_mut(slot)?;
        if fraction > *current {
            *current = fraction;
        }
        let total = self.fractions.iter().sum::<f64>() / self.fractions.len() as f64;
        let step = ((total * f64::from(self.steps)).floor() as u32).min(self.steps);
        if step <= self.emitted {
            return None;
        }
        self.emitted = step;
        Some((f64::from(step) / f64::from(self.steps)) as f32)
    }
}

/// State shared by every analyser of a run. Reached through [`Reporter`].
pub(crate) struct RunHub<'a> {
    observer: &'a dyn Observer,
    cancel: &'a CancellationToken,
    progress: Mutex<ProgressGate>,
    analyser_count: usize,
    /// Highest fraction an analyser may report for itself.
    in_flight_cap: f64,
}

impl<'a> RunHub<'a> {
    fn new(
        observer: &'a dyn Observer,
        cancel: &'a CancellationToken,
        analyser_count: usize,
        steps: u32,
    ) -> Self {
        Self {
            observer,
            cancel,
            progress: Mutex::new(ProgressGate::new(vec![0.0; analyser_count], steps)),
            analyser_count,
            in_flight_cap: 1.0 - 1.0 / f64::from(steps),
        }
    }

    fn emit(&self, event: AnalysisEvent) {
        self.observer.on_event(event);
    }

    /// Emission happens under the gate lock so concurrent analysers cannot
    /// deliver progress values out of order.
    fn advance(&self, slot: usize, fraction: f64) {
        let mut gate = self.progress.lock();
        if let Some(value) = gate.update(slot, fraction) {
            self.emit(AnalysisEvent::Progress(value));
        }
    }

    pub(crate) fn report_slot_progress(&self, slot: usize, fraction: f32) {
        let fraction = f64::from(fraction).clamp(0.0, self.in_flight_cap);
        self.advance(slot, fraction);
    }

    fn complete_slot(&self, slot: usize) {
        self.advance(slot, 1.0);
    }

    pub(crate) fn stage(&self, stage: String) {
        self.emit(AnalysisEvent::Stage(stage));
    }

    pub(crate) fn status(&self, status: String) {
        self.emit(AnalysisEvent::Status(status));
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs analysers against a raster.
pub struct Orchestrator {
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Replace the clock used for diagnostics timing.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every analyser against `image`.
    ///
    /// An empty analyser list yields an empty report.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Cancelled`] if `cancel` is set before all
    /// analysers have started. Analyser failures are not errors.
    pub fn run(
        &self,
        image: Arc<ImageMatrix>,
        analysers: Vec<AnalyserHandle>,
        observer: &dyn Observer,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, RunError> {
        let started = self.clock.now();
        let mut run = AnalysisRun::new(image, analysers);
        let hub = RunHub::new(
            observer,
            cancel,
            run.analysers().len(),
            self.config.effective_progress_steps(),
        );

        if run.analysers().is_empty() {
            hub.status("No analysers selected".to_string());
        }
        debug!(
            "starting {:?} run of {} analysers",
            self.config.execution,
            run.analysers().len()
        );

        let results = match self.config.execution {
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(run.analysers().len());
                for (slot, analyser) in run.analysers().iter().enumerate() {
                    if cancel.is_cancelled() {
                        return Err(cancelled(&hub));
                    }
                    results.push(self.invoke(&hub, slot, analyser, run.image()));
                }
                results
            }
            ExecutionMode::Parallel => run
                .analysers()
                .par_iter()
                .enumerate()
                .map(|(slot, analyser)| {
                    (!cancel.is_cancelled()).then(|| self.invoke(&hub, slot, analyser, run.image()))
                })
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| cancelled(&hub))?,
        };

        for (slot, result) in results.into_iter().enumerate() {
            run.record(slot, result);
        }

        let dimensions = run.image().dimensions();
        let report = run.finish(RunDiagnostics {
            image: dimensions,
            execution: self.config.execution,
            analysers: Vec::new(),
            total_duration: self.clock.elapsed(started),
        });

        let diagnostics = report.diagnostics();
        let summary = match diagnostics.failed_count() {
            0 => format!(
                "Analysis complete: {} findings from {} analysers",
                diagnostics.total_findings(),
                diagnostics.analysers.len(),
            ),
            failed => format!(
                "Analysis complete: {} findings from {} analysers ({failed} failed)",
                diagnostics.total_findings(),
                diagnostics.analysers.len(),
            ),
        };
        info!("{summary} in {:.3}s", diagnostics.total_duration.as_secs_f64());
        hub.status(summary);

        Ok(report)
    }

    /// Run the orchestrator on a dedicated, named background thread.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Spawn`] if the thread cannot be created.
    pub fn spawn(
        self,
        thread_name: impl Into<String>,
        image: Arc<ImageMatrix>,
        analysers: Vec<AnalyserHandle>,
    ) -> Result<RunHandle, RunError> {
        let (sender, events) = crossbeam_channel::unbounded();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let thread = std::thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || self.run(image, analysers, &sender, &worker_cancel))?;
        Ok(RunHandle {
            events,
            cancel,
            thread,
        })
    }

    fn invoke(
        &self,
        hub: &RunHub<'_>,
        slot: usize,
        analyser: &AnalyserHandle,
        image: &ImageMatrix,
    ) -> SlotResult {
        let name = display_name(analyser.as_ref()).to_string();
        hub.emit(AnalysisEvent::Analyser(name.clone()));
        hub.stage(format!("Analyser {} of {}", slot + 1, hub.analyser_count));
        hub.status(format!("Running {name}"));
        debug!("analyser {name} started (slot {slot})");

        let started = self.clock.now();
        let reporter = Reporter::new(hub, slot);
        let result = panic::catch_unwind(AssertUnwindSafe(|| analyser.analyse(image, &reporter)));
        let duration = self.clock.elapsed(started);

        let (findings, outcome) = match result {
            Ok(Ok(findings)) => {
                hub.status(format!("{name} reported {} findings", findings.len()));
                let findings: Vec<FindingRef> = findings.into_iter().map(Arc::new).collect();
                (findings, Outcome::Completed)
            }
            Ok(Err(err)) => {
                warn!("analyser {name} failed: {err}");
                hub.status(format!("{name} failed: {err}"));
                (Vec::new(), Outcome::Failed(err.to_string()))
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                warn!("analyser {name} panicked: {message}");
                hub.status(format!("{name} failed: panicked: {message}"));
                (Vec::new(), Outcome::Failed(format!("panicked: {message}")))
            }
        };
        hub.complete_slot(slot);
        debug!("analyser {name} finished in {:.3}s", duration.as_secs_f64());

        SlotResult {
            diagnostics: AnalyserDiagnostics {
                name,
                duration,
                finding_count: findings.len(),
                outcome,
            },
            findings,
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

fn cancelled(hub: &RunHub<'_>) -> RunError {
    info!("analysis cancelled");
    hub.status("Analysis cancelled".to_string());
    RunError::Cancelled
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Handle to a run executing on a background thread.
///
/// Dropping the handle detaches the worker; it finishes on its own and
/// its events are discarded.
pub struct RunHandle {
    events: Receiver<AnalysisEvent>,
    cancel: CancellationToken,
    thread: JoinHandle<Result<AnalysisReport, RunError>>,
}

impl RunHandle {
    /// The run's event stream. Iteration ends once the worker exits.
    #[must_use]
    pub const fn events(&self) -> &Receiver<AnalysisEvent> {
        &self.events
    }

    /// A token that cancels this run.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask the run to stop before its next analyser.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and take its report.
    ///
    /// # Errors
    ///
    /// Returns the run's own [`RunError`], or
    /// [`RunError::WorkerPanicked`] if the worker thread died.
    pub fn join(self) -> Result<AnalysisReport, RunError> {
        self.thread
            .join()
            .map_err(|payload| RunError::WorkerPanicked(panic_message(&*payload)))?
    }
}

/// Run `analysers` over `image` on a background thread with `config`.
///
/// # Errors
///
/// Returns [`RunError::Spawn`] if the worker thread cannot be created.
pub fn spawn_analysis(
    image: Arc<ImageMatrix>,
    analysers: Vec<AnalyserHandle>,
    config: OrchestratorConfig,
) -> Result<RunHandle, RunError> {
    Orchestrator::new(config).spawn("sleuth analysis", image, analysers)
}
