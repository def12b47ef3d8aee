//! Dwell detection
//!
//! Turns a stream of location fixes into an "anchored" signal: the user has
//! been stationary within the anchor radius for the configured duration.
//! Any excursion (outside the radius or moving) clears the dwell clock
//! immediately.
//!
//! The detector also keeps the fixes from the last `dwell_window` for
//! diagnostics ([`DwellDetector::window_len`]). The window does not take part
//! in the anchoring decision: only `dwell_start` and the latest fix do, so a
//! gap between fixes longer than the window still counts as continuous dwell.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::SessionConfig;
use crate::geo::LocationFix;

#[derive(Debug, Clone)]
pub struct DwellDetector {
    radius_m: f64,
    speed_threshold_mps: f64,
    duration: Duration,
    window: Duration,
    recent: VecDeque<LocationFix>,
    dwell_start: Option<DateTime<Utc>>,
    last_fix_at: Option<DateTime<Utc>>,
}

impl DwellDetector {
    pub fn new(radius_m: f64, speed_threshold_mps: f64, duration: Duration, window: Duration) -> Self {
        Self {
            radius_m,
            speed_threshold_mps,
            duration,
            window,
            recent: VecDeque::new(),
            dwell_start: None,
            last_fix_at: None,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.anchor_radius_m,
            config.dwell_speed_threshold_mps,
            config.dwell_duration,
            config.dwell_window,
        )
    }

    /// Feed one fix with its precomputed distance to the anchor.
    ///
    /// Returns whether the user is anchored after this fix.
    pub fn update(&mut self, fix: &LocationFix, distance_to_anchor_m: f64) -> bool {
        self.push(*fix);

        let within = distance_to_anchor_m <= self.radius_m;
        if within && self.is_stationary(fix) {
            if self.dwell_start.is_none() {
                self.dwell_start = Some(fix.timestamp);
            }
        } else {
            self.dwell_start = None;
        }

        self.is_anchored()
    }

    /// Unknown speed (negative) counts as stationary
    fn is_stationary(&self, fix: &LocationFix) -> bool {
        fix.speed_mps < 0.0 || fix.speed_mps < self.speed_threshold_mps
    }

    fn push(&mut self, fix: LocationFix) {
        let cutoff = fix.timestamp
            - chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        self.recent.push_back(fix);
        while self
            .recent
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            self.recent.pop_front();
        }
        self.last_fix_at = Some(fix.timestamp);
    }

    /// Dwell time accumulated as of the most recent fix
    pub fn elapsed(&self) -> Duration {
        match (self.dwell_start, self.last_fix_at) {
            (Some(start), Some(last)) => (last - start).to_std().unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    pub fn is_anchored(&self) -> bool {
        self.dwell_start.is_some() && self.elapsed() >= self.duration
    }

    /// Number of fixes inside the rolling window. Diagnostic only.
    pub fn window_len(&self) -> usize {
        self.recent.len()
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.dwell_start = None;
        self.last_fix_at = None;
    }
}
