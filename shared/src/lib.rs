#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod brand;
pub mod cache;
pub mod capabilities;
pub mod config;
pub mod event;
pub mod model;
pub mod report;
pub mod trip;
pub mod view;

pub use app::App;
pub use brand::{BrandName, CustomBrand, ImageRef};
pub use capabilities::{Capabilities, Effect};
pub use config::{CacheConfig, ConfigError, TrackerConfig};
pub use event::Event;
pub use model::{Model, Theme, TripState};
pub use report::{Report, ReportExport};
pub use trip::{TripCommand, TripPhase, TripStore};
pub use view::ViewModel;

pub mod app {
    use chrono::{DateTime, Utc};
    use tracing::{debug, error, info, warn};

    use crate::capabilities::{kv, Capabilities, KvResult, SaveFileOperation};
    use crate::event::Event;
    use crate::model::{Model, Theme};
    use crate::report::{REPORT_FILE_NAME, REPORT_MIME};
    use crate::trip::{NewCustomBrand, TickerChange, TripCommand, TripStore};
    use crate::view::ViewModel;

    #[derive(Default)]
    pub struct App;

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            let event_name = event.name();
            if event.is_user_initiated() {
                debug!(event = event_name, "user action");
            }

            match event {
                Event::Noop => {}

                Event::AppStarted { at } => {
                    model.now = at;
                    let reads = kv::read(&caps.kv, &model.config.state_key, |result| {
                        Event::TripStateLoaded { result }
                    })
                    .and_then(|()| {
                        kv::read(&caps.kv, &model.config.theme_key, |result| {
                            Event::ThemeLoaded { result }
                        })
                    });
                    if let Err(e) = reads {
                        error!(error = %e, "cannot read stored state, using defaults");
                        model.state_loaded = true;
                    }
                    caps.render.render();
                }

                Event::TripStateLoaded { result } => {
                    let raw = result.unwrap_or_else(|e| {
                        warn!(error = %e, "trip state read failed");
                        None
                    });
                    model.store = TripStore::restore(&model.config, raw.as_deref(), model.now);
                    model.state_loaded = true;
                    // seeded defaults are written back once
                    Self::persist_store(model, caps);
                    caps.render.render();
                }

                Event::ThemeLoaded { result } => {
                    model.theme = Self::parse_theme(result);
                    caps.render.render();
                }

                Event::StartTrip { at } => Self::run(model, caps, TripCommand::StartTrip, at),

                Event::EndTrip { at } => Self::run(model, caps, TripCommand::EndTrip, at),

                Event::Increment { brand } => {
                    let now = model.now;
                    Self::run(model, caps, TripCommand::Increment(brand), now);
                }

                Event::Decrement { brand } => {
                    let now = model.now;
                    Self::run(model, caps, TripCommand::Decrement(brand), now);
                }

                Event::AddCustomBrand { name, emoji, image } => {
                    let command = TripCommand::AddCustomBrand(NewCustomBrand { name, emoji, image });
                    let now = model.now;
                    Self::run(model, caps, command, now);
                }

                Event::ResetAll { at } => Self::run(model, caps, TripCommand::ResetAll, at),

                Event::Tick { at } => {
                    model.now = at;
                    if model.store.is_running() {
                        caps.render.render();
                    }
                }

                Event::DownloadReportRequested { at } => {
                    model.now = at;
                    Self::save_report(model, caps, at);
                }

                Event::ReportDismissed => {
                    if model.report.take().is_some() {
                        caps.render.render();
                    }
                }

                Event::ThemeToggled => {
                    model.theme = model.theme.toggled();
                    let value = model.theme.as_str().as_bytes().to_vec();
                    if let Err(e) = kv::write(&caps.kv, &model.config.theme_key, value, Self::persisted)
                    {
                        error!(error = %e, "failed to persist theme");
                    }
                    caps.render.render();
                }

                Event::PersistenceSucceeded => {
                    debug!("state persisted");
                }

                Event::PersistenceFailed { error } => {
                    // in-memory state stays authoritative for this session
                    warn!(%error, "failed to persist state");
                }
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            ViewModel::from_model(model)
        }
    }

    impl App {
        fn run(model: &mut Model, caps: &Capabilities, command: TripCommand, now: DateTime<Utc>) {
            model.now = now;
            if !model.state_loaded {
                debug!("trip command ignored before state load");
                return;
            }

            let transition = model.store.apply(command, now);
            if transition.is_noop() {
                return;
            }

            if transition.persist {
                Self::persist_store(model, caps);
            }
            if transition.confirm_tone {
                caps.tone.confirm();
            }
            match transition.ticker {
                Some(TickerChange::Start) => {
                    model.report = None;
                    caps.ticker.start(model.config.tick_interval_ms);
                }
                Some(TickerChange::Stop) => caps.ticker.stop(),
                None => {}
            }
            if let Some(report) = transition.report {
                model.report = Some(report);
            }

            caps.render.render();
        }

        fn persist_store(model: &Model, caps: &Capabilities) {
            let bytes = match model.store.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(error = %e, "failed to encode trip state");
                    return;
                }
            };
            if let Err(e) = kv::write(&caps.kv, &model.config.state_key, bytes, Self::persisted) {
                error!(error = %e, "failed to persist trip state");
            }
        }

        fn persisted(result: KvResult) -> Event {
            match result {
                Ok(_) => Event::PersistenceSucceeded,
                Err(e) => Event::PersistenceFailed {
                    error: e.to_string(),
                },
            }
        }

        fn parse_theme(result: KvResult) -> Theme {
            let raw = match result {
                Ok(Some(raw)) => raw,
                Ok(None) => return Theme::default(),
                Err(e) => {
                    warn!(error = %e, "theme read failed");
                    return Theme::default();
                }
            };
            std::str::from_utf8(&raw)
                .map_err(|e| e.to_string())
                .and_then(str::parse::<Theme>)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "unknown stored theme, using default");
                    Theme::default()
                })
        }

        fn save_report(model: &Model, caps: &Capabilities, now: DateTime<Utc>) {
            let export = model.store.export(now);
            let bytes = match export.to_json_pretty() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(error = %e, "failed to serialize report");
                    return;
                }
            };
            match SaveFileOperation::new(REPORT_FILE_NAME, REPORT_MIME, bytes) {
                Ok(operation) => {
                    info!(total = export.total, "report download requested");
                    caps.file.save(operation);
                }
                Err(e) => error!(error = %e, "failed to build report download"),
            }
        }
    }
}
