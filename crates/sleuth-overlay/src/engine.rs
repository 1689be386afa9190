//! The overlay engine: selection, visibility, pulse and glyphs of one
//! overlay surface.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use sleuth_core::clock::{Clock, SystemClock};
use sleuth_core::geometry::dirty_rect_with_margin;
use sleuth_core::{Finding, FindingRef, Rect};

use crate::animation::{AnimationHandle, SurfaceState, Ticker};
use crate::config::OverlayConfig;
use crate::glyph::{Glyph, GlyphCache};
use crate::primitive::{Frame, frame_for};
use crate::pulse::opacity_at;
use crate::redraw::RedrawSink;

/// Drives the overlay of one surface.
///
/// Selecting a finding while the surface is visible starts a background
/// loop that requests a redraw of the finding's dirty rectangle every
/// tick, so the presentation layer can repaint the pulsing fill. Callers
/// query [`frame`](Self::frame) from their paint handler.
///
/// The [`GlyphCache`] may be shared with other engines showing the same
/// report.
pub struct OverlayEngine {
    config: OverlayConfig,
    clock: Arc<dyn Clock>,
    glyphs: Arc<GlyphCache>,
    sink: Arc<dyn RedrawSink>,
    surface: Arc<Mutex<SurfaceState>>,
}

impl OverlayEngine {
    /// An engine for a visible surface with no selection.
    #[must_use]
    pub fn new(config: OverlayConfig, sink: Arc<dyn RedrawSink>) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
            glyphs: Arc::new(GlyphCache::new()),
            sink,
            surface: Arc::new(Mutex::new(SurfaceState::new())),
        }
    }

    /// Drive the pulse from `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share `glyphs` instead of owning a private cache.
    #[must_use]
    pub fn with_glyph_cache(mut self, glyphs: Arc<GlyphCache>) -> Self {
        self.glyphs = glyphs;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Select `finding`, or clear the selection with `None`.
    ///
    /// A running animation picks up the new finding on its next tick; an
    /// idle one is started if the surface is visible.
    pub fn set_active_finding(&self, finding: Option<FindingRef>) {
        let mut state = self.surface.lock();
        if let Some(f) = &finding {
            debug!("overlay: selected finding {}", f.id());
        }
        state.active = finding;
        self.ensure_animating(&mut state);
    }

    #[must_use]
    pub fn active_finding(&self) -> Option<FindingRef> {
        self.surface.lock().active.clone()
    }

    /// Show or hide the surface. Hiding stops the animation and waits for
    /// it; showing restarts it if a finding is selected.
    pub fn set_visible(&self, visible: bool) {
        let stopped = {
            let mut state = self.surface.lock();
            state.visible = visible;
            if visible {
                self.ensure_animating(&mut state);
                None
            } else {
                state.animation.take()
            }
        };
        if let Some(handle) = stopped {
            handle.stop();
        }
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.surface.lock().visible
    }

    /// Whether an animation loop is currently running.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.surface.lock().animation.is_some()
    }

    /// Stop the animation loop, if any, and wait for it. Selection and
    /// visibility are kept; the next selection restarts the loop.
    pub fn stop(&self) {
        let handle = self.surface.lock().animation.take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    /// Current pulse opacity.
    #[must_use]
    pub fn opacity(&self) -> f32 {
        opacity_at(&self.config.pulse, self.clock.now())
    }

    /// Primitives of the active finding at the current pulse opacity.
    #[must_use]
    pub fn frame(&self) -> Option<Frame> {
        let active = self.active_finding()?;
        Some(frame_for(&active, &self.config, self.opacity()))
    }

    /// Region to repaint for the active finding.
    #[must_use]
    pub fn dirty_rect(&self) -> Option<Rect> {
        let state = self.surface.lock();
        state
            .active
            .as_deref()
            .map(|f| dirty_rect_with_margin(f, self.config.dirty_margin))
    }

    /// Glyph of `finding` from the shared cache.
    pub fn glyph(&self, finding: &Finding) -> Arc<Glyph> {
        self.glyphs.get(finding)
    }

    #[must_use]
    pub const fn glyph_cache(&self) -> &Arc<GlyphCache> {
        &self.glyphs
    }

    fn ensure_animating(&self, state: &mut SurfaceState) {
        if state.active.is_none() || !state.visible || state.animation.is_some() {
            return;
        }
        state.generation += 1;
        let ticker = Ticker {
            tick: self.config.tick(),
            margin: self.config.dirty_margin,
        };
        match AnimationHandle::spawn(
            state.generation,
            Arc::clone(&self.surface),
            Arc::clone(&self.sink),
            ticker,
        ) {
            Ok(handle) => state.animation = Some(handle),
            Err(err) => warn!("overlay: cannot start animation thread: {err}"),
        }
    }
}

impl Drop for OverlayEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for OverlayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.surface.lock();
        f.debug_struct("OverlayEngine")
            .field("config", &self.config)
            .field("active", &state.active.as_ref().map(|finding| finding.id()))
            .field("visible", &state.visible)
            .field("animating", &state.animation.is_some())
            .field("glyphs", &self.glyphs.len())
            .finish_non_exhaustive()
    }
}
