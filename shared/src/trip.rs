//! Trip/counter state machine.
//!
//! Two phases: `Idle` and `Running`. Counts change only while `Running`;
//! every command that is not allowed in the current phase is ignored without
//! an error. The store never talks to storage itself: `apply` returns a
//! [`Transition`] and the caller decides which effects to issue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::brand::{placeholder_image, uploaded_image, BrandName, CustomBrand};
use crate::config::TrackerConfig;
use crate::model::TripState;
use crate::report::{elapsed_seconds, BrandCount, Report, ReportExport};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("failed to serialize trip state: {0}")]
    Serialization(String),

    #[error("malformed trip state: {0}")]
    Malformed(String),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TripPhase {
    Idle,
    Running,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct NewCustomBrand {
    pub name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub image: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TripCommand {
    StartTrip,
    EndTrip,
    Increment(BrandName),
    Decrement(BrandName),
    AddCustomBrand(NewCustomBrand),
    ResetAll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickerChange {
    Start,
    Stop,
}

/// What a command changed; the app layer turns this into effects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub persist: bool,
    pub confirm_tone: bool,
    pub ticker: Option<TickerChange>,
    pub report: Option<Report>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }

    fn persisted() -> Self {
        Self {
            persist: true,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct TripStore {
    state: TripState,
    builtin: Vec<BrandName>,
    top_n: usize,
    confirmation_tone: bool,
    max_state_bytes: usize,
    /// The loaded blob was saved mid-trip; the next start resumes it.
    resume_pending: bool,
}

impl TripStore {
    pub fn new(config: &TrackerConfig, now: DateTime<Utc>) -> Self {
        Self::from_state(config, TripState::new(now))
    }

    /// Boots from a persisted state. Always starts `Idle`.
    pub fn from_state(config: &TrackerConfig, mut state: TripState) -> Self {
        let resume_pending = state.active;
        state.active = false;

        let builtin: Vec<BrandName> = config
            .default_brands
            .iter()
            .map(|b| BrandName::new(b.as_str()))
            .collect();
        for brand in builtin
            .iter()
            .chain(state.custom_brands.iter().map(|c| &c.name))
        {
            state.counts.entry(brand.clone()).or_insert(0);
        }

        Self {
            state,
            builtin,
            top_n: config.top_n,
            confirmation_tone: config.confirmation_tone,
            max_state_bytes: config.max_state_bytes,
            resume_pending,
        }
    }

    /// Absent or malformed data falls back to defaults.
    pub fn restore(config: &TrackerConfig, raw: Option<&[u8]>, now: DateTime<Utc>) -> Self {
        match raw.map(Self::decode) {
            Some(Ok(state)) => {
                info!(custom = state.custom_brands.len(), "trip state restored");
                Self::from_state(config, state)
            }
            Some(Err(e)) => {
                warn!(error = %e, "discarding malformed trip state");
                Self::new(config, now)
            }
            None => {
                debug!("no stored trip state");
                Self::new(config, now)
            }
        }
    }

    pub fn decode(raw: &[u8]) -> Result<TripState, PersistError> {
        serde_json::from_slice(raw).map_err(|e| PersistError::Malformed(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, PersistError> {
        let snapshot = TripState {
            active: self.state.active || self.resume_pending,
            ..self.state.clone()
        };
        serde_json::to_vec(&snapshot).map_err(|e| PersistError::Serialization(e.to_string()))
    }

    pub fn state(&self) -> &TripState {
        &self.state
    }

    pub fn phase(&self) -> TripPhase {
        if self.state.active {
            TripPhase::Running
        } else {
            TripPhase::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == TripPhase::Running
    }

    pub fn is_resumable(&self) -> bool {
        self.resume_pending
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.state.start_time
    }

    pub fn count(&self, brand: &str) -> u32 {
        self.state.count(brand)
    }

    pub fn total(&self) -> u64 {
        self.state.total()
    }

    pub fn custom_brands(&self) -> &[CustomBrand] {
        &self.state.custom_brands
    }

    pub fn builtin_brands(&self) -> &[BrandName] {
        &self.builtin
    }

    pub fn is_builtin(&self, brand: &str) -> bool {
        self.builtin.iter().any(|b| b.as_str() == brand)
    }

    pub fn custom_brand(&self, brand: &str) -> Option<&CustomBrand> {
        self.state
            .custom_brands
            .iter()
            .find(|c| c.name.as_str() == brand)
    }

    pub fn is_known(&self, brand: &str) -> bool {
        self.is_builtin(brand) || self.custom_brand(brand).is_some()
    }

    /// Stray count keys are taken too; adopting one would revive its old count.
    fn name_taken(&self, name: &str) -> bool {
        self.builtin
            .iter()
            .chain(self.state.custom_brands.iter().map(|c| &c.name))
            .chain(self.state.counts.keys())
            .any(|b| b.collides_with(name))
    }

    fn fits_storage(&self) -> bool {
        self.encode()
            .is_ok_and(|bytes| bytes.len() <= self.max_state_bytes)
    }

    /// Known brands first (built-in, then custom), then stray keys from the counts table.
    pub fn brand_order(&self) -> Vec<BrandName> {
        let mut order: Vec<BrandName> = self
            .builtin
            .iter()
            .chain(self.state.custom_brands.iter().map(|c| &c.name))
            .cloned()
            .collect();
        for key in self.state.counts.keys() {
            if !order.contains(key) {
                order.push(key.clone());
            }
        }
        order
    }

    pub fn ordered_counts(&self) -> Vec<BrandCount> {
        self.brand_order()
            .into_iter()
            .map(|brand| BrandCount {
                count: self.count(brand.as_str()),
                brand,
            })
            .collect()
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        elapsed_seconds(self.state.start_time, now)
    }

    pub fn apply(&mut self, command: TripCommand, now: DateTime<Utc>) -> Transition {
        match command {
            TripCommand::StartTrip => self.start_trip(now),
            TripCommand::EndTrip => self.end_trip(now),
            TripCommand::Increment(brand) => self.increment(brand.as_str()),
            TripCommand::Decrement(brand) => self.decrement(brand.as_str()),
            TripCommand::AddCustomBrand(new) => self.add_custom_brand(new),
            TripCommand::ResetAll => self.reset_all(now),
        }
    }

    pub fn start_trip(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_running() {
            debug!("start ignored: trip already running");
            return Transition::default();
        }

        self.state.active = true;
        if self.resume_pending {
            self.resume_pending = false;
            info!(start_time = %self.state.start_time, "trip resumed");
        } else {
            self.state.start_time = now;
            info!(start_time = %now, "trip started");
        }

        Transition {
            persist: true,
            ticker: Some(TickerChange::Start),
            ..Transition::default()
        }
    }

    pub fn end_trip(&mut self, now: DateTime<Utc>) -> Transition {
        if !self.is_running() {
            debug!("end ignored: no trip running");
            return Transition::default();
        }

        self.state.active = false;
        let report = self.compute_report(now);
        info!(
            total = report.total,
            duration_seconds = report.duration_seconds,
            "trip ended"
        );

        Transition {
            persist: true,
            ticker: Some(TickerChange::Stop),
            report: Some(report),
            ..Transition::default()
        }
    }

    pub fn increment(&mut self, brand: &str) -> Transition {
        if !self.is_running() || !self.is_known(brand) {
            debug!(brand, running = self.is_running(), "increment ignored");
            return Transition::default();
        }

        let count = self.state.counts.entry(BrandName::new(brand)).or_insert(0);
        *count = count.saturating_add(1);

        Transition {
            persist: true,
            confirm_tone: self.confirmation_tone,
            ..Transition::default()
        }
    }

    pub fn decrement(&mut self, brand: &str) -> Transition {
        if !self.is_running() || !self.is_known(brand) {
            debug!(brand, running = self.is_running(), "decrement ignored");
            return Transition::default();
        }

        match self.state.counts.get_mut(brand) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Transition::persisted()
            }
            _ => Transition::default(),
        }
    }

    pub fn add_custom_brand(&mut self, new: NewCustomBrand) -> Transition {
        let name = new.name.trim();
        if name.is_empty() {
            debug!("custom brand ignored: empty name");
            return Transition::default();
        }
        if self.name_taken(name) {
            debug!(name, "custom brand ignored: duplicate name");
            return Transition::default();
        }

        let emoji = new.emoji.as_deref().map(str::trim).unwrap_or_default().to_string();
        let image = match new.image.as_deref() {
            Some(bytes) => uploaded_image(bytes).unwrap_or_else(|e| {
                warn!(name, error = %e, "unusable upload, generating placeholder");
                placeholder_image(name, &emoji)
            }),
            None => placeholder_image(name, &emoji),
        };

        let brand = CustomBrand {
            name: BrandName::new(name),
            emoji,
            image: Some(image),
        };
        let placeholder = placeholder_image(name, &brand.emoji);
        self.state.counts.insert(brand.name.clone(), 0);
        self.state.custom_brands.push(brand);

        if !self.fits_storage() {
            warn!(
                name,
                max = self.max_state_bytes,
                "logo does not fit in storage, generating placeholder"
            );
            if let Some(added) = self.state.custom_brands.last_mut() {
                added.image = Some(placeholder);
            }
        }
        if !self.fits_storage() {
            warn!(name, "custom brand ignored: storage full");
            self.state.custom_brands.pop();
            self.state.counts.remove(name);
            return Transition::default();
        }

        info!(name, "custom brand added");

        Transition::persisted()
    }

    pub fn reset_all(&mut self, now: DateTime<Utc>) -> Transition {
        for count in self.state.counts.values_mut() {
            *count = 0;
        }
        self.state.start_time = now;
        self.resume_pending = false;
        info!("counts reset");

        Transition::persisted()
    }

    pub fn compute_report(&self, now: DateTime<Utc>) -> Report {
        Report::compute(self.ordered_counts(), self.state.start_time, now, self.top_n)
    }

    pub fn export(&self, now: DateTime<Utc>) -> ReportExport {
        ReportExport::from_state(&self.state, now)
    }
}
