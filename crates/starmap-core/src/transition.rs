//! Timed travel transition.
//!
//! The camera target moves from the outgoing center to the incoming one along
//! a cubic ease-in-out curve while the two clusters cross-fade. The
//! transition does not own a clock: the driver calls [`Transition::advance`]
//! once per frame with the elapsed time and renders the returned
//! [`TransitionFrame`].

use crate::types::Vec3;
use crate::{DEFAULT_FADE_START, DEFAULT_TRANSITION_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cubic ease-in-out over `[0, 1]`.
pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionParams {
    pub duration_ms: u64,
    /// Fraction of the transition before the cross-fade starts.
    pub fade_start: f32,
}

impl Default for TransitionParams {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_TRANSITION_MS,
            fade_start: DEFAULT_FADE_START,
        }
    }
}

impl TransitionParams {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Interpolated values for one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransitionFrame {
    /// Linear progress in `[0, 1]`.
    pub t: f32,
    /// `ease_in_out_cubic(t)`.
    pub eased: f32,
    pub camera_target: Vec3,
    /// Opacity multiplier for the outgoing cluster.
    pub fade_out: f32,
    /// Opacity multiplier for the incoming cluster.
    pub fade_in: f32,
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct Transition {
    from: Vec3,
    to: Vec3,
    elapsed: Duration,
    duration: Duration,
    fade_start: f32,
}

impl Transition {
    pub fn new(params: &TransitionParams, from: Vec3, to: Vec3) -> Self {
        Self {
            from,
            to,
            elapsed: Duration::ZERO,
            duration: params.duration(),
            fade_start: params.fade_start.clamp(0.0, 0.99),
        }
    }

    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.progress() >= 1.0
    }

    /// Advance by `dt` and sample the frame.
    pub fn advance(&mut self, dt: Duration) -> TransitionFrame {
        self.elapsed = self.elapsed.saturating_add(dt);
        self.sample()
    }

    pub fn sample(&self) -> TransitionFrame {
        let t = self.progress();
        let eased = ease_in_out_cubic(t);
        let fade = if t < self.fade_start {
            0.0
        } else {
            (t - self.fade_start) / (1.0 - self.fade_start)
        };
        TransitionFrame {
            t,
            eased,
            camera_target: self.from.lerp(self.to, eased),
            fade_out: 1.0 - fade,
            fade_in: fade,
            done: t >= 1.0,
        }
    }
}
