//! Live guiding status model and the event fold that maintains it
//!
//! The reader task owns all mutation: every unsolicited notification
//! from PHD2 passes through [`SessionState::apply_event`] exactly once.
//! Facade callers only ever take owned snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::events::{AppState, Phd2Event};
use crate::stats::GuideAccumulator;

/// Running guide-error statistics derived from the per-axis accumulators
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GuideStats {
    pub rms_ra: f64,
    pub rms_dec: f64,
    pub rms_total: f64,
    pub peak_ra: f64,
    pub peak_dec: f64,
}

/// Progress of the settle phase following a guide or dither command
#[derive(Debug, Clone, Serialize)]
pub struct SettleProgress {
    pub done: bool,
    pub distance: f64,
    pub settle_px: f64,
    pub time: f64,
    pub settle_time: f64,
    pub status: i32,
    pub error: Option<String>,
}

/// Snapshot of the most recent star-loss event
#[derive(Debug, Clone, Serialize)]
pub struct StarLostInfo {
    pub frame: u64,
    pub time: f64,
    pub star_mass: f64,
    pub snr: f64,
    pub avg_dist: f64,
    pub error_code: i32,
    pub status: i32,
    pub timestamp: DateTime<Utc>,
}

/// Immutable status snapshot returned by [`crate::Phd2Client::get_status`]
#[derive(Debug, Clone, Serialize)]
pub struct GuiderStatus {
    pub connected: bool,
    pub version: Option<String>,
    pub subver: Option<String>,
    pub app_state: AppState,
    /// True while PHD2 is actively tracking, including with the star lost
    pub is_guiding: bool,
    pub avg_dist: f64,
    pub stats: GuideStats,
    pub settling: bool,
    pub settle_progress: Option<SettleProgress>,
    pub star_lost: Option<StarLostInfo>,
}

/// Live session state behind the shared read/write lock
///
/// The settle fields are also written from the call side: guide and
/// dither record the requested pixel threshold before issuing the RPC,
/// and `check_settling` consumes a finished result.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub connected: bool,
    pub version: Option<String>,
    pub subver: Option<String>,
    pub app_state: AppState,
    pub avg_dist: f64,
    pub stats: GuideStats,
    pub settle: Option<SettleProgress>,
    pub settle_px: f64,
    pub star_lost: Option<StarLostInfo>,
    accumulating: bool,
    ra_accum: GuideAccumulator,
    dec_accum: GuideAccumulator,
}

impl SessionState {
    /// Fold one PHD2 notification into the live state
    pub fn apply_event(&mut self, event: &Phd2Event) {
        match event {
            Phd2Event::Version {
                phd_version,
                phd_subver,
                ..
            } => {
                self.version = Some(phd_version.clone());
                self.subver = phd_subver.clone();
            }
            Phd2Event::AppState { state } => match state.parse::<AppState>() {
                Ok(parsed) => self.app_state = parsed,
                Err(_) => debug!("Ignoring unmapped app state: {}", state),
            },
            Phd2Event::StartGuiding => {
                self.app_state = AppState::Guiding;
                self.ra_accum.reset();
                self.dec_accum.reset();
                self.accumulating = true;
            }
            Phd2Event::GuideStep(step) => {
                self.app_state = AppState::Guiding;
                if let Some(avg) = step.avg_dist {
                    self.avg_dist = avg;
                }
                if self.accumulating {
                    if let Some(ra) = step.ra_distance_raw {
                        self.ra_accum.add(ra);
                    }
                    if let Some(dec) = step.dec_distance_raw {
                        self.dec_accum.add(dec);
                    }
                    self.recompute_stats();
                }
            }
            Phd2Event::GuidingStopped => {
                self.app_state = AppState::Stopped;
            }
            Phd2Event::Paused => {
                self.app_state = AppState::Paused;
            }
            Phd2Event::StarLost {
                frame,
                time,
                star_mass,
                snr,
                avg_dist,
                error_code,
                status,
            } => {
                self.app_state = AppState::LostLock;
                if let Some(avg) = avg_dist {
                    self.avg_dist = *avg;
                }
                self.star_lost = Some(StarLostInfo {
                    frame: *frame,
                    time: *time,
                    star_mass: *star_mass,
                    snr: *snr,
                    avg_dist: self.avg_dist,
                    error_code: error_code.unwrap_or(0),
                    status: *status,
                    timestamp: Utc::now(),
                });
            }
            Phd2Event::SettleBegin => {
                self.accumulating = false;
            }
            Phd2Event::Settling {
                distance,
                time,
                settle_time,
                ..
            } => {
                self.settle = Some(SettleProgress {
                    done: false,
                    distance: *distance,
                    settle_px: self.settle_px,
                    time: *time,
                    settle_time: *settle_time,
                    status: 0,
                    error: None,
                });
            }
            Phd2Event::SettleDone { status, error } => {
                self.settle = Some(SettleProgress {
                    done: true,
                    distance: 0.0,
                    settle_px: self.settle_px,
                    time: 0.0,
                    settle_time: 0.0,
                    status: *status,
                    error: error.clone(),
                });
                self.accumulating = true;
            }
            _ => {}
        }
    }

    fn recompute_stats(&mut self) {
        let rms_ra = self.ra_accum.stdev();
        let rms_dec = self.dec_accum.stdev();
        self.stats = GuideStats {
            rms_ra,
            rms_dec,
            rms_total: (rms_ra * rms_ra + rms_dec * rms_dec).sqrt(),
            peak_ra: self.ra_accum.peak(),
            peak_dec: self.dec_accum.peak(),
        };
    }

    /// Owned copy of everything a status poller needs
    pub fn snapshot(&self) -> GuiderStatus {
        GuiderStatus {
            connected: self.connected,
            version: self.version.clone(),
            subver: self.subver.clone(),
            app_state: self.app_state,
            is_guiding: matches!(self.app_state, AppState::Guiding | AppState::LostLock),
            avg_dist: self.avg_dist,
            stats: self.stats,
            settling: self.settle.is_some(),
            settle_progress: self.settle.clone(),
            star_lost: self.star_lost.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GuideStepStats;

    fn guide_step(ra: f64, dec: f64, avg_dist: f64) -> Phd2Event {
        Phd2Event::GuideStep(GuideStepStats {
            frame: 1,
            time: 1.0,
            mount: "Mount".to_string(),
            dx: 0.0,
            dy: 0.0,
            ra_distance_raw: Some(ra),
            dec_distance_raw: Some(dec),
            star_mass: None,
            snr: None,
            avg_dist: Some(avg_dist),
            error_code: None,
        })
    }

    fn star_lost(frame: u64, avg_dist: f64) -> Phd2Event {
        Phd2Event::StarLost {
            frame,
            time: 5.0,
            star_mass: 800.0,
            snr: 12.0,
            avg_dist: Some(avg_dist),
            error_code: Some(2),
            status: 1,
        }
    }

    #[test]
    fn test_initial_state() {
        let state = SessionState::default();
        assert_eq!(state.app_state, AppState::Stopped);
        assert!(state.settle.is_none());
        assert!(state.star_lost.is_none());
        assert!(!state.snapshot().is_guiding);
    }

    #[test]
    fn test_version_event_records_versions() {
        let mut state = SessionState::default();
        state.apply_event(&Phd2Event::Version {
            phd_version: "2.6.13".to_string(),
            phd_subver: Some("dev2".to_string()),
            msg_version: Some(1),
            overlap_support: None,
        });
        assert_eq!(state.version.as_deref(), Some("2.6.13"));
        assert_eq!(state.subver.as_deref(), Some("dev2"));
    }

    #[test]
    fn test_app_state_event_transitions() {
        let mut state = SessionState::default();
        state.apply_event(&Phd2Event::AppState {
            state: "Guiding".to_string(),
        });
        assert_eq!(state.app_state, AppState::Guiding);

        // States this model does not track leave the phase untouched
        state.apply_event(&Phd2Event::AppState {
            state: "Calibrating".to_string(),
        });
        assert_eq!(state.app_state, AppState::Guiding);
    }

    #[test]
    fn test_star_lost_after_guide_step() {
        let mut state = SessionState::default();
        state.apply_event(&Phd2Event::AppState {
            state: "Guiding".to_string(),
        });
        state.apply_event(&guide_step(1.0, -1.0, 0.5));
        state.apply_event(&star_lost(10, 3.2));

        assert_eq!(state.app_state, AppState::LostLock);
        assert_eq!(state.avg_dist, 3.2);
        let info = state.star_lost.as_ref().unwrap();
        assert_eq!(info.frame, 10);
        assert_eq!(info.status, 1);
        assert!(state.snapshot().is_guiding);
    }

    #[test]
    fn test_guide_steps_only_counted_while_accumulating() {
        let mut state = SessionState::default();

        // Before StartGuiding nothing accumulates
        state.apply_event(&guide_step(2.0, 2.0, 0.5));
        assert_eq!(state.stats.rms_ra, 0.0);

        state.apply_event(&Phd2Event::StartGuiding);
        state.apply_event(&guide_step(1.0, 0.5, 0.5));
        state.apply_event(&guide_step(-1.0, -0.5, 0.6));
        assert!(state.stats.rms_ra > 0.0);
        assert_eq!(state.stats.peak_ra, 1.0);
        assert_eq!(state.stats.peak_dec, 0.5);

        // SettleBegin suspends accumulation, SettleDone resumes it
        let stats_before = state.stats;
        state.apply_event(&Phd2Event::SettleBegin);
        state.apply_event(&guide_step(50.0, 50.0, 7.0));
        assert_eq!(state.stats.peak_ra, stats_before.peak_ra);

        state.apply_event(&Phd2Event::SettleDone {
            status: 0,
            error: None,
        });
        state.apply_event(&guide_step(2.0, 0.5, 0.4));
        assert_eq!(state.stats.peak_ra, 2.0);
    }

    #[test]
    fn test_start_guiding_resets_accumulators() {
        let mut state = SessionState::default();
        state.apply_event(&Phd2Event::StartGuiding);
        state.apply_event(&guide_step(4.0, 4.0, 1.0));
        state.apply_event(&guide_step(-4.0, -4.0, 1.0));
        assert_eq!(state.stats.peak_ra, 4.0);

        state.apply_event(&Phd2Event::StartGuiding);
        assert_eq!(state.stats.peak_ra, 4.0); // retained until recomputed
        state.apply_event(&guide_step(1.0, 1.0, 0.2));
        assert_eq!(state.stats.peak_ra, 1.0);
    }

    #[test]
    fn test_rms_total_combines_axes() {
        let mut state = SessionState::default();
        state.apply_event(&Phd2Event::StartGuiding);
        for (ra, dec) in [(1.0, 2.0), (-1.0, -2.0), (1.0, 2.0), (-1.0, -2.0)] {
            state.apply_event(&guide_step(ra, dec, 0.5));
        }
        let expected = (state.stats.rms_ra.powi(2) + state.stats.rms_dec.powi(2)).sqrt();
        assert!((state.stats.rms_total - expected).abs() < 1e-12);
    }

    #[test]
    fn test_settling_snapshot_carries_requested_threshold() {
        let mut state = SessionState::default();
        state.settle_px = 2.0;
        state.apply_event(&Phd2Event::Settling {
            distance: 5.0,
            time: 1.0,
            settle_time: 10.0,
            star_locked: Some(true),
        });
        let settle = state.settle.as_ref().unwrap();
        assert!(!settle.done);
        assert_eq!(settle.distance, 5.0);
        assert_eq!(settle.settle_px, 2.0);
    }

    #[test]
    fn test_settle_done_replaces_progress() {
        let mut state = SessionState::default();
        state.apply_event(&Phd2Event::Settling {
            distance: 5.0,
            time: 1.0,
            settle_time: 10.0,
            star_locked: None,
        });
        state.apply_event(&Phd2Event::SettleDone {
            status: 2,
            error: Some("Timed-out waiting for guider to settle".to_string()),
        });
        let settle = state.settle.as_ref().unwrap();
        assert!(settle.done);
        assert_eq!(settle.status, 2);
        assert_eq!(
            settle.error.as_deref(),
            Some("Timed-out waiting for guider to settle")
        );
    }

    #[test]
    fn test_paused_and_stopped_events() {
        let mut state = SessionState::default();
        state.apply_event(&Phd2Event::StartGuiding);
        state.apply_event(&Phd2Event::Paused);
        assert_eq!(state.app_state, AppState::Paused);
        state.apply_event(&Phd2Event::GuidingStopped);
        assert_eq!(state.app_state, AppState::Stopped);
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let mut state = SessionState::default();
        state.apply_event(&Phd2Event::StartGuiding);
        state.apply_event(&guide_step(1.0, 1.0, 0.5));
        let snapshot = state.snapshot();
        state.apply_event(&guide_step(9.0, 9.0, 4.0));
        assert_eq!(snapshot.avg_dist, 0.5);
        assert_eq!(snapshot.stats.peak_ra, 1.0);
    }
}
