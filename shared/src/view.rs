use serde::{Deserialize, Serialize};

use crate::brand::default_logo_path;
use crate::model::{Model, Theme};
use crate::report::{format_duration, Report};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TileView {
    pub brand: String,
    pub label: String,
    pub count: u32,
    pub image_src: String,
    pub is_custom: bool,
    /// Taps only count while a trip is running.
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReportRowView {
    pub brand: String,
    pub count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReportView {
    pub total: u64,
    pub top: String,
    pub duration: String,
    pub rows: Vec<ReportRowView>,
}

impl From<&Report> for ReportView {
    fn from(report: &Report) -> Self {
        Self {
            total: report.total,
            top: report.top_summary(),
            duration: report.duration_display(),
            rows: report
                .rows()
                .into_iter()
                .map(|row| ReportRowView {
                    brand: row.brand.to_string(),
                    count: row.count,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ViewModel {
    pub loading: bool,
    pub running: bool,
    pub can_start: bool,
    pub can_end: bool,
    pub timer: String,
    pub total: u64,
    pub tiles: Vec<TileView>,
    pub report: Option<ReportView>,
    pub theme: Theme,
}

impl ViewModel {
    pub fn from_model(model: &Model) -> Self {
        let store = &model.store;
        let running = store.is_running();

        let tiles = store
            .brand_order()
            .into_iter()
            .map(|brand| {
                let count = store.count(brand.as_str());
                match store.custom_brand(brand.as_str()) {
                    Some(custom) => TileView {
                        brand: brand.to_string(),
                        label: custom.label(),
                        count,
                        image_src: custom.image_src().into_owned(),
                        is_custom: true,
                        enabled: running,
                    },
                    None => TileView {
                        image_src: default_logo_path(brand.as_str()),
                        label: brand.to_string(),
                        brand: brand.to_string(),
                        count,
                        is_custom: false,
                        enabled: running,
                    },
                }
            })
            .collect();

        // after end the timer holds the final duration
        let timer = match (&model.report, running) {
            (_, true) => format_duration(store.elapsed_seconds(model.now)),
            (Some(report), false) => report.duration_display(),
            (None, false) => format_duration(0),
        };

        Self {
            loading: !model.state_loaded,
            running,
            can_start: !running,
            can_end: running,
            timer,
            total: store.total(),
            tiles,
            report: model.report.as_ref().map(ReportView::from),
            theme: model.theme,
        }
    }
}
