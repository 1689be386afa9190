//! The pulse animation loop.
//!
//! While a finding is active and the surface is visible, one background
//! thread per surface asks the [`RedrawSink`] to repaint the active
//! finding's dirty rectangle every tick. The rectangle is recomputed from
//! the current selection on every tick.
//!
//! The loop ends on its own once it observes no active finding or a
//! hidden surface. It ends immediately when its [`AnimationHandle`] is
//! stopped or dropped; that interruption is not an error.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use parking_lot::Mutex;
use sleuth_core::FindingRef;
use sleuth_core::geometry::dirty_rect_with_margin;

use crate::redraw::RedrawSink;

/// Selection and visibility of one overlay surface, shared with its
/// animation thread.
pub(crate) struct SurfaceState {
    pub(crate) active: Option<FindingRef>,
    pub(crate) visible: bool,
    /// Bumped every time a loop is started; a loop whose generation is
    /// stale exits without touching the state.
    pub(crate) generation: u64,
    pub(crate) animation: Option<AnimationHandle>,
}

impl SurfaceState {
    pub(crate) const fn new() -> Self {
        Self {
            active: None,
            visible: true,
            generation: 0,
            animation: None,
        }
    }
}

/// Parameters of one animation loop.
#[derive(Clone, Copy)]
pub(crate) struct Ticker {
    pub(crate) tick: Duration,
    pub(crate) margin: f64,
}

/// Owner of a running animation thread.
///
/// Dropping the handle interrupts the loop without waiting for it;
/// [`stop`](Self::stop) interrupts and waits.
pub struct AnimationHandle {
    generation: u64,
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl AnimationHandle {
    pub(crate) fn spawn(
        generation: u64,
        surface: Arc<Mutex<SurfaceState>>,
        sink: Arc<dyn RedrawSink>,
        ticker: Ticker,
    ) -> std::io::Result<Self> {
        let (stop, stopped) = crossbeam_channel::bounded(1);
        let thread = std::thread::Builder::new()
            .name(format!("overlay animation #{generation}"))
            .spawn(move || run(generation, &surface, sink.as_ref(), &stopped, ticker))?;
        Ok(Self {
            generation,
            stop,
            thread,
        })
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Interrupt the loop and wait for its thread to exit.
    pub fn stop(self) {
        drop(self.stop);
        if self.thread.join().is_err() {
            warn!("overlay animation thread #{} panicked", self.generation);
        }
    }
}

fn run(
    generation: u64,
    surface: &Mutex<SurfaceState>,
    sink: &dyn RedrawSink,
    stopped: &Receiver<()>,
    ticker: Ticker,
) {
    debug!("overlay animation #{generation} started");
    loop {
        let dirty = {
            let mut state = surface.lock();
            if state.generation != generation {
                return;
            }
            match (&state.active, state.visible) {
                (Some(finding), true) => dirty_rect_with_margin(finding, ticker.margin),
                _ => {
                    state.animation = None;
                    debug!("overlay animation #{generation} idle, exiting");
                    return;
                }
            }
        };
        sink.request_redraw(dirty);

        match stopped.recv_timeout(ticker.tick) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!("overlay animation #{generation} interrupted");
                return;
            }
        }
    }
}
