use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::brand::BrandName;
use crate::model::TripState;

pub const REPORT_FILE_NAME: &str = "car-logo-trip-report.json";
pub const REPORT_MIME: &str = "application/json";
pub const EMPTY_TOP_PLACEHOLDER: &str = "—";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BrandCount {
    pub brand: BrandName,
    pub count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TopEntry {
    pub brand: BrandName,
    pub count: u32,
}

impl fmt::Display for TopEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.brand, self.count)
    }
}

/// Read-only summary of a trip.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub total: u64,
    pub top: Vec<TopEntry>,
    pub duration_seconds: u64,
    /// Every known brand, in enumeration order.
    pub per_brand_counts: Vec<BrandCount>,
}

impl Report {
    /// `counts` must already be in enumeration order; ties keep that order.
    pub fn compute(
        counts: Vec<BrandCount>,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
        top_n: usize,
    ) -> Self {
        let total = counts.iter().map(|c| u64::from(c.count)).sum();

        let top = sorted_by_count(&counts)
            .into_iter()
            .filter(|c| c.count > 0)
            .take(top_n)
            .map(|c| TopEntry {
                brand: c.brand.clone(),
                count: c.count,
            })
            .collect();

        Self {
            total,
            top,
            duration_seconds: elapsed_seconds(start_time, now),
            per_brand_counts: counts,
        }
    }

    pub fn top_labels(&self) -> Vec<String> {
        self.top.iter().map(ToString::to_string).collect()
    }

    pub fn top_summary(&self) -> String {
        if self.top.is_empty() {
            EMPTY_TOP_PLACEHOLDER.to_string()
        } else {
            self.top_labels().join(", ")
        }
    }

    /// Table rows, highest count first.
    pub fn rows(&self) -> Vec<&BrandCount> {
        sorted_by_count(&self.per_brand_counts)
    }

    pub fn duration_display(&self) -> String {
        format_duration(self.duration_seconds)
    }
}

fn sorted_by_count(counts: &[BrandCount]) -> Vec<&BrandCount> {
    let mut rows: Vec<&BrandCount> = counts.iter().collect();
    // stable sort: equal counts stay in enumeration order
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

pub fn elapsed_seconds(start_time: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - start_time).num_seconds()).unwrap_or(0)
}

/// `HH:MM:SS`; hours keep counting past 24.
pub fn format_duration(seconds: u64) -> String {
    let hh = seconds / 3600;
    let mm = (seconds % 3600) / 60;
    let ss = seconds % 60;
    format!("{hh:02}:{mm:02}:{ss:02}")
}

/// The downloadable report file. Field names and formats are a stable contract.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportExport {
    #[serde(serialize_with = "iso_millis")]
    pub generated_at: DateTime<Utc>,
    pub total: u64,
    pub counts: BTreeMap<BrandName, u32>,
    pub duration_seconds: u64,
}

impl ReportExport {
    pub fn from_state(state: &TripState, now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            total: state.total(),
            counts: state.counts.clone(),
            duration_seconds: elapsed_seconds(state.start_time, now),
        }
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

fn iso_millis<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}
