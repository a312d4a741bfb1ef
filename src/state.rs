//! Application state owned by the top-level controller.

use crate::filters::{DayType, FilterState, Segment, TimeSlot};
use crate::metrics::MetricMode;
use crate::pipeline::{
    apply_filters, option_lists, DataStore, OptionLists, RenderModel, RenderOptions,
};
use crate::reports::HistogramMode;
use crate::stations::{StationDirectory, StationItem};

/// Loaded data plus the user's current selections. Every setter only
/// updates state; `render` recomputes from scratch.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub store: DataStore,
    pub filters: FilterState,
    pub metric: MetricMode,
    pub options: RenderOptions,
}

impl AppState {
    pub fn new(store: DataStore) -> Self {
        AppState {
            store,
            ..Default::default()
        }
    }

    pub fn set_year(&mut self, year: Option<&str>) {
        self.filters = std::mem::take(&mut self.filters).with_year(year);
    }

    pub fn set_category(&mut self, category: Option<&str>) {
        self.filters = std::mem::take(&mut self.filters).with_category(category);
    }

    pub fn set_origin(&mut self, code: Option<&str>) {
        self.filters = std::mem::take(&mut self.filters).with_origin(code);
    }

    pub fn set_destination(&mut self, code: Option<&str>) {
        self.filters = std::mem::take(&mut self.filters).with_destination(code);
    }

    pub fn set_months(&mut self, from: Option<&str>, to: Option<&str>) {
        self.filters = std::mem::take(&mut self.filters).with_months(from, to);
    }

    pub fn set_day_types<S: AsRef<str>>(&mut self, labels: &[S]) {
        self.filters = std::mem::take(&mut self.filters).with_day_types(labels);
    }

    pub fn set_time_slots<S: AsRef<str>>(&mut self, labels: &[S]) {
        self.filters = std::mem::take(&mut self.filters).with_time_slots(labels);
    }

    /// Flip one day type on or off. Unknown labels are ignored.
    pub fn toggle_day_type(&mut self, label: &str) {
        if let Some(d) = DayType::parse(label) {
            if !self.filters.day_types.remove(&d) {
                self.filters.day_types.insert(d);
            }
        }
    }

    pub fn toggle_time_slot(&mut self, label: &str) {
        if let Some(t) = TimeSlot::parse(label) {
            if !self.filters.time_slots.remove(&t) {
                self.filters.time_slots.insert(t);
            }
        }
    }

    pub fn set_metric(&mut self, metric: MetricMode) {
        self.metric = metric;
    }

    pub fn set_histogram_mode(&mut self, mode: HistogramMode) {
        self.options.histogram_mode = mode;
    }

    pub fn set_top_n(&mut self, top_n: usize) {
        self.options.top_n = top_n.max(1);
    }

    pub fn reset_filters(&mut self) {
        self.filters.reset();
    }

    pub fn render(&self) -> RenderModel {
        apply_filters(&self.store, &self.filters, self.metric, &self.options)
    }

    pub fn option_lists(&self) -> OptionLists {
        option_lists(&self.store)
    }

    /// Station items whose name or codes match `query`.
    pub fn search_stations(&self, query: &str) -> Vec<&StationItem> {
        StationDirectory::search(self.store.directory.items(), query)
    }
}
