//! Opacity pulse of the active finding.

use std::f64::consts::PI;
use std::time::Duration;

use crate::config::PulseConfig;

/// Opacity at time `t` for the given pulse.
///
/// A zero period disables the pulse and holds opacity at the peak.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn opacity_at(pulse: &PulseConfig, t: Duration) -> f32 {
    let swing = if pulse.period_ms == 0 {
        1.0
    } else {
        (PI * t.as_secs_f64() / pulse.period().as_secs_f64()).sin().abs()
    };
    let opacity = f64::from(pulse.amplitude).mul_add(swing, f64::from(pulse.offset));
    opacity.clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn starts_at_offset() {
        let pulse = PulseConfig::default();
        assert!(close(opacity_at(&pulse, Duration::ZERO), 0.2));
    }

    #[test]
    fn peaks_at_half_period() {
        let pulse = PulseConfig::default();
        assert!(close(opacity_at(&pulse, Duration::from_millis(500)), 0.6));
    }

    #[test]
    fn repeats_every_period() {
        let pulse = PulseConfig::default();
        let a = opacity_at(&pulse, Duration::from_millis(250));
        let b = opacity_at(&pulse, Duration::from_millis(1250));
        assert!(close(a, b));
    }

    #[test]
    fn stays_within_bounds() {
        let pulse = PulseConfig::default();
        for ms in (0..2000).step_by(7) {
            let o = opacity_at(&pulse, Duration::from_millis(ms));
            assert!((0.2 - 1e-5..=0.6 + 1e-5).contains(&o), "{o} at {ms}ms");
        }
    }

    #[test]
    fn zero_period_holds_peak() {
        let pulse = PulseConfig {
            period_ms: 0,
            ..PulseConfig::default()
        };
        assert!(close(opacity_at(&pulse, Duration::from_millis(123)), 0.6));
    }

    #[test]
    fn clamped_to_unit_range() {
        let pulse = PulseConfig {
            offset: 0.9,
            amplitude: 0.9,
            period_ms: 1000,
        };
        assert!(close(opacity_at(&pulse, Duration::from_millis(500)), 1.0));
    }
}
