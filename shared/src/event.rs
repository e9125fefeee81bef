use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::brand::BrandName;
use crate::capabilities::KvError;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Noop,

    // --- Lifecycle ---
    // time-dependent events carry the shell's clock
    AppStarted {
        at: DateTime<Utc>,
    },
    TripStateLoaded {
        result: Result<Option<Vec<u8>>, KvError>,
    },
    ThemeLoaded {
        result: Result<Option<Vec<u8>>, KvError>,
    },

    // --- Trip ---
    StartTrip {
        at: DateTime<Utc>,
    },
    EndTrip {
        at: DateTime<Utc>,
    },
    Increment {
        brand: BrandName,
    },
    Decrement {
        brand: BrandName,
    },
    AddCustomBrand {
        name: String,
        emoji: Option<String>,
        image: Option<Vec<u8>>,
    },
    ResetAll {
        at: DateTime<Utc>,
    },
    Tick {
        at: DateTime<Utc>,
    },

    // --- Report ---
    DownloadReportRequested {
        at: DateTime<Utc>,
    },
    ReportDismissed,

    // --- Settings ---
    ThemeToggled,

    // --- Persistence ---
    PersistenceSucceeded,
    PersistenceFailed {
        error: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::AppStarted { .. } => "app_started",
            Self::TripStateLoaded { .. } => "trip_state_loaded",
            Self::ThemeLoaded { .. } => "theme_loaded",
            Self::StartTrip { .. } => "start_trip",
            Self::EndTrip { .. } => "end_trip",
            Self::Increment { .. } => "increment",
            Self::Decrement { .. } => "decrement",
            Self::AddCustomBrand { .. } => "add_custom_brand",
            Self::ResetAll { .. } => "reset_all",
            Self::Tick { .. } => "tick",
            Self::DownloadReportRequested { .. } => "download_report_requested",
            Self::ReportDismissed => "report_dismissed",
            Self::ThemeToggled => "theme_toggled",
            Self::PersistenceSucceeded => "persistence_succeeded",
            Self::PersistenceFailed { .. } => "persistence_failed",
        }
    }

    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::StartTrip { .. }
                | Self::EndTrip { .. }
                | Self::Increment { .. }
                | Self::Decrement { .. }
                | Self::AddCustomBrand { .. }
                | Self::ResetAll { .. }
                | Self::DownloadReportRequested { .. }
                | Self::ReportDismissed
                | Self::ThemeToggled
        )
    }
}
