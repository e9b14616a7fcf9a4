//! PHD2 event notifications and the guiding application state

use serde::{Deserialize, Serialize};

use crate::error::Phd2Error;

/// Coarse guiding phase reported by PHD2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    #[default]
    Stopped,
    Guiding,
    Paused,
    LostLock,
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppState::Stopped => write!(f, "Stopped"),
            AppState::Guiding => write!(f, "Guiding"),
            AppState::Paused => write!(f, "Paused"),
            AppState::LostLock => write!(f, "LostLock"),
        }
    }
}

impl std::str::FromStr for AppState {
    type Err = Phd2Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Stopped" => Ok(AppState::Stopped),
            "Guiding" => Ok(AppState::Guiding),
            "Paused" => Ok(AppState::Paused),
            "LostLock" => Ok(AppState::LostLock),
            _ => Err(Phd2Error::InvalidResponse(format!("Unknown state: {}", s))),
        }
    }
}

/// Per-frame guide correction data carried by a GuideStep event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GuideStepStats {
    pub frame: u64,
    pub time: f64,
    pub mount: String,
    #[serde(rename = "dx")]
    pub dx: f64,
    #[serde(rename = "dy")]
    pub dy: f64,
    #[serde(rename = "RADistanceRaw")]
    pub ra_distance_raw: Option<f64>,
    #[serde(rename = "DECDistanceRaw")]
    pub dec_distance_raw: Option<f64>,
    #[serde(rename = "StarMass")]
    pub star_mass: Option<f64>,
    #[serde(rename = "SNR")]
    pub snr: Option<f64>,
    #[serde(rename = "AvgDist")]
    pub avg_dist: Option<f64>,
    #[serde(rename = "ErrorCode")]
    pub error_code: Option<i32>,
}

/// Unsolicited notification from PHD2
///
/// Decoded once per line; anything without a matching `Event` tag falls
/// through to the reader loop's discard path.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "Event")]
pub enum Phd2Event {
    /// Sent on connection, contains PHD2 version info
    Version {
        #[serde(rename = "PHDVersion")]
        phd_version: String,
        #[serde(rename = "PHDSubver")]
        phd_subver: Option<String>,
        #[serde(rename = "MsgVersion")]
        msg_version: Option<u32>,
        #[serde(rename = "OverlapSupport")]
        overlap_support: Option<bool>,
    },

    /// Application state changed
    AppState {
        #[serde(rename = "State")]
        state: String,
    },

    /// Guiding started
    StartGuiding,

    /// Guide step with per-frame statistics
    GuideStep(GuideStepStats),

    /// Dither offset was applied
    GuidingDithered {
        #[serde(rename = "dx")]
        dx: f64,
        #[serde(rename = "dy")]
        dy: f64,
    },

    /// Guiding stopped
    GuidingStopped,

    /// Guiding was paused
    Paused,

    /// Guiding was resumed
    Resumed,

    /// The guide star was lost
    StarLost {
        #[serde(rename = "Frame")]
        frame: u64,
        #[serde(rename = "Time")]
        time: f64,
        #[serde(rename = "StarMass")]
        star_mass: f64,
        #[serde(rename = "SNR")]
        snr: f64,
        #[serde(rename = "AvgDist")]
        avg_dist: Option<f64>,
        #[serde(rename = "ErrorCode")]
        error_code: Option<i32>,
        #[serde(rename = "Status")]
        status: i32,
    },

    /// A guide star was selected
    StarSelected {
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
    },

    /// Lock position was set
    LockPositionSet {
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
    },

    /// Settling is about to start after a guide or dither command
    SettleBegin,

    /// Settling in progress
    Settling {
        #[serde(rename = "Distance")]
        distance: f64,
        #[serde(rename = "Time")]
        time: f64,
        #[serde(rename = "SettleTime")]
        settle_time: f64,
        #[serde(rename = "StarLocked")]
        star_locked: Option<bool>,
    },

    /// Settling completed
    SettleDone {
        #[serde(rename = "Status")]
        status: i32,
        #[serde(rename = "Error")]
        error: Option<String>,
    },

    /// Looping exposures started
    LoopingExposures {
        #[serde(rename = "Frame")]
        frame: u64,
    },

    /// Looping exposures stopped
    LoopingExposuresStopped,

    /// Configuration changed
    ConfigurationChange,

    /// Alert message
    Alert {
        #[serde(rename = "Msg")]
        msg: String,
        #[serde(rename = "Type")]
        alert_type: String,
    },
}
