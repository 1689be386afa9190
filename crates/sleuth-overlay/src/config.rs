//! Overlay configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Opacity pulse of the active finding.
///
/// Opacity follows `offset + amplitude * |sin(pi * t / period)|`, so it
/// swings between `offset` and `offset + amplitude` once per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Lowest opacity.
    pub offset: f32,
    /// Swing above `offset`.
    pub amplitude: f32,
    /// Milliseconds from one minimum to the next.
    pub period_ms: u64,
}

impl PulseConfig {
    pub const DEFAULT_OFFSET: f32 = 0.2;
    pub const DEFAULT_AMPLITUDE: f32 = 0.4;
    pub const DEFAULT_PERIOD_MS: u64 = 1000;

    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            offset: Self::DEFAULT_OFFSET,
            amplitude: Self::DEFAULT_AMPLITUDE,
            period_ms: Self::DEFAULT_PERIOD_MS,
        }
    }
}

/// Geometry, styling and timing of the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub pulse: PulseConfig,

    /// Interval between redraw requests while a finding is animating.
    /// Values below [`MIN_TICK_MS`](Self::MIN_TICK_MS) are raised to it.
    pub tick_ms: u64,

    /// Radius of the dot marking an anchor point.
    pub point_radius: f64,

    /// Outline width of extents and the arrow shaft.
    pub stroke_width: f64,

    /// Margin added around a finding's bounds when invalidating.
    pub dirty_margin: f64,

    /// Length of the arrowhead barbs.
    pub arrow_width: f64,

    /// Half-angle of the arrowhead, in degrees.
    pub arrow_angle_deg: f64,
}

impl OverlayConfig {
    pub const DEFAULT_TICK_MS: u64 = 20;
    pub const MIN_TICK_MS: u64 = 1;
    pub const DEFAULT_POINT_RADIUS: f64 = 2.0;
    pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;
    pub const DEFAULT_DIRTY_MARGIN: f64 = sleuth_core::geometry::DIRTY_MARGIN;
    pub const DEFAULT_ARROW_WIDTH: f64 = sleuth_core::geometry::ARROW_WIDTH;
    pub const DEFAULT_ARROW_ANGLE_DEG: f64 = 20.0;

    /// Redraw interval actually used by the animation loop.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        if self.tick_ms < Self::MIN_TICK_MS {
            Duration::from_millis(Self::MIN_TICK_MS)
        } else {
            Duration::from_millis(self.tick_ms)
        }
    }

    /// Arrowhead half-angle in radians.
    #[must_use]
    pub const fn arrow_angle(&self) -> f64 {
        self.arrow_angle_deg.to_radians()
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            pulse: PulseConfig::default(),
            tick_ms: Self::DEFAULT_TICK_MS,
            point_radius: Self::DEFAULT_POINT_RADIUS,
            stroke_width: Self::DEFAULT_STROKE_WIDTH,
            dirty_margin: Self::DEFAULT_DIRTY_MARGIN,
            arrow_width: Self::DEFAULT_ARROW_WIDTH,
            arrow_angle_deg: Self::DEFAULT_ARROW_ANGLE_DEG,
        }
    }
}
