//! Two-phase progress estimator for a single submission.
//!
//! The server reports nothing while it converts, so progress is composed of:
//!
//! 1. **Upload**: real bytes sent, mapped linearly onto `[0, upload_share]`.
//! 2. **Synthetic**: a ramp of `tick_step` per tick, kept strictly below
//!    `ceiling` so a pending conversion never looks finished.
//!
//! Only a successful settlement reports 100. The estimator is pure state; the
//! timer that drives [`ProgressEstimator::tick`] lives in
//! [`crate::workflow::ticker`].

use crate::config::ProgressTuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Inactive,
    Upload,
    Synthetic,
    Settled,
}

/// Monotonic progress signal for one submission attempt.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    tuning: ProgressTuning,
    stage: Stage,
    percent: u8,
}

impl ProgressEstimator {
    pub fn new(tuning: ProgressTuning) -> Self {
        Self {
            tuning,
            stage: Stage::Inactive,
            percent: 0,
        }
    }

    /// Current percentage.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// True while the synthetic ramp should be ticking.
    pub fn in_synthetic_phase(&self) -> bool {
        self.stage == Stage::Synthetic
    }

    /// Start a new submission at 0.
    pub fn begin(&mut self) {
        self.stage = Stage::Upload;
        self.percent = 0;
    }

    /// Record upload progress. Returns the new percentage when it moved.
    ///
    /// Reports without a known, non-zero total are ignored.
    pub fn on_upload_progress(&mut self, sent: u64, total: Option<u64>) -> Option<u8> {
        if self.stage != Stage::Upload {
            return None;
        }
        let total = total.filter(|t| *t > 0)?;
        let share = u64::from(self.tuning.upload_share);
        let scaled = (sent.min(total) as u128 * share as u128 / total as u128) as u8;
        self.raise_to(scaled)
    }

    /// The request body is fully sent; enter the synthetic phase.
    pub fn on_upload_complete(&mut self) -> Option<u8> {
        if self.stage != Stage::Upload {
            return None;
        }
        self.stage = Stage::Synthetic;
        self.raise_to(self.tuning.upload_share)
    }

    /// Advance the synthetic ramp by one step, staying below the ceiling.
    pub fn tick(&mut self) -> Option<u8> {
        if self.stage != Stage::Synthetic {
            return None;
        }
        let next = self.percent.saturating_add(self.tuning.tick_step);
        if next >= self.tuning.ceiling {
            return None;
        }
        self.raise_to(next)
    }

    /// The outer operation resolved. Success jumps to 100; failure freezes.
    pub fn on_settled(&mut self, success: bool) -> Option<u8> {
        if matches!(self.stage, Stage::Inactive | Stage::Settled) {
            return None;
        }
        self.stage = Stage::Settled;
        if success {
            self.raise_to(100)
        } else {
            None
        }
    }

    /// Back to the pre-submission state.
    pub fn reset(&mut self) {
        self.stage = Stage::Inactive;
        self.percent = 0;
    }

    fn raise_to(&mut self, value: u8) -> Option<u8> {
        if value > self.percent {
            self.percent = value;
            Some(value)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ProgressEstimator {
        let mut e = ProgressEstimator::new(ProgressTuning::default());
        e.begin();
        e
    }

    #[test]
    fn upload_maps_onto_first_half_with_floor() {
        let mut e = estimator();
        assert_eq!(e.on_upload_progress(50, Some(200)), Some(12));
        assert_eq!(e.on_upload_progress(100, Some(200)), Some(25));
        assert_eq!(e.on_upload_progress(200, Some(200)), Some(50));
    }

    #[test]
    fn unknown_total_is_ignored() {
        let mut e = estimator();
        assert_eq!(e.on_upload_progress(10, None), None);
        assert_eq!(e.on_upload_progress(10, Some(0)), None);
        assert_eq!(e.percent(), 0);
        assert_eq!(e.on_upload_complete(), Some(50));
    }

    #[test]
    fn upload_never_regresses() {
        let mut e = estimator();
        e.on_upload_progress(150, Some(200));
        assert_eq!(e.on_upload_progress(20, Some(200)), None);
        assert_eq!(e.percent(), 37);
    }

    #[test]
    fn ticks_before_upload_complete_do_nothing() {
        let mut e = estimator();
        assert_eq!(e.tick(), None);
        assert_eq!(e.percent(), 0);
    }

    #[test]
    fn synthetic_ramp_stays_below_ceiling() {
        let mut e = estimator();
        e.on_upload_complete();
        let mut seen = vec![e.percent()];
        for _ in 0..50 {
            if let Some(p) = e.tick() {
                seen.push(p);
            }
        }
        assert_eq!(seen, vec![50, 55, 60, 65, 70, 75, 80, 85, 90]);
        assert!(e.percent() < 95);
    }

    #[test]
    fn success_reports_100_failure_freezes() {
        let mut ok = estimator();
        ok.on_upload_complete();
        ok.tick();
        assert_eq!(ok.on_settled(true), Some(100));
        assert_eq!(ok.tick(), None);

        let mut failed = estimator();
        failed.on_upload_progress(100, Some(200));
        assert_eq!(failed.on_settled(false), None);
        assert_eq!(failed.percent(), 25);
        assert_eq!(failed.on_upload_complete(), None);
    }

    #[test]
    fn settled_twice_is_noop() {
        let mut e = estimator();
        assert_eq!(e.on_settled(true), Some(100));
        assert_eq!(e.on_settled(true), None);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut e = estimator();
        e.on_upload_complete();
        e.reset();
        assert_eq!(e.percent(), 0);
        assert!(!e.in_synthetic_phase());
        assert_eq!(e.on_upload_progress(1, Some(2)), None);
    }
}
