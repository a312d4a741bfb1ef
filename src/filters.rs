//! Filter state and the per-dimension row predicates built from it.
//!
//! Every dimension answers two questions: is it restricting anything, and
//! does a row pass it. A row passes the whole filter when it passes every
//! active dimension.

use crate::stations::StationDirectory;
use crate::types::{Role, Row};
use crate::util::{normalize_text, parse_month};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Values meaning "no restriction" in selector-style inputs.
fn choice(v: Option<&str>) -> Option<String> {
    v.map(str::trim)
        .filter(|s| {
            !s.is_empty() && !s.eq_ignore_ascii_case("all") && !s.eq_ignore_ascii_case("tutti")
        })
        .map(str::to_string)
}

/// Segmentation vocabulary (day types, time slots).
pub trait Segment: Copy + Ord + Debug + 'static {
    const ALL: &'static [Self];

    fn label(self) -> &'static str;

    fn parse(s: &str) -> Option<Self>;

    /// Raw segmentation value carried by `row`.
    fn value(row: &Row) -> Option<&str>;

    fn all() -> BTreeSet<Self> {
        Self::ALL.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Feriale,
    Sabato,
    Festivo,
}

impl Segment for DayType {
    const ALL: &'static [Self] = &[DayType::Feriale, DayType::Sabato, DayType::Festivo];

    fn label(self) -> &'static str {
        match self {
            DayType::Feriale => "feriale",
            DayType::Sabato => "sabato",
            DayType::Festivo => "festivo",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match normalize_text(s).as_str() {
            "feriale" | "feriali" | "lavorativo" | "weekday" => Some(DayType::Feriale),
            "sabato" | "saturday" => Some(DayType::Sabato),
            "festivo" | "festivi" | "domenica" | "sunday" | "holiday" => Some(DayType::Festivo),
            _ => None,
        }
    }

    fn value(row: &Row) -> Option<&str> {
        row.tipo_giorno.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSlot {
    /// 00-06
    Notte,
    /// 06-10
    Mattina,
    /// 10-16
    Giorno,
    /// 16-20
    Pomeriggio,
    /// 20-24
    Sera,
}

impl Segment for TimeSlot {
    const ALL: &'static [Self] = &[
        TimeSlot::Notte,
        TimeSlot::Mattina,
        TimeSlot::Giorno,
        TimeSlot::Pomeriggio,
        TimeSlot::Sera,
    ];

    fn label(self) -> &'static str {
        match self {
            TimeSlot::Notte => "notte",
            TimeSlot::Mattina => "mattina",
            TimeSlot::Giorno => "giorno",
            TimeSlot::Pomeriggio => "pomeriggio",
            TimeSlot::Sera => "sera",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let key: String = normalize_text(s).chars().filter(|c| !c.is_whitespace()).collect();
        match key.as_str() {
            "notte" | "night" | "00-06" => Some(TimeSlot::Notte),
            "mattina" | "morning" | "06-10" => Some(TimeSlot::Mattina),
            "giorno" | "day" | "10-16" => Some(TimeSlot::Giorno),
            "pomeriggio" | "afternoon" | "16-20" => Some(TimeSlot::Pomeriggio),
            "sera" | "evening" | "20-24" => Some(TimeSlot::Sera),
            _ => None,
        }
    }

    fn value(row: &Row) -> Option<&str> {
        row.fascia_oraria.as_deref()
    }
}

/// The single source of truth for every predicate. Defaults to
/// "unrestricted" in every dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub year: Option<String>,
    pub category: Option<String>,
    pub origin_station: Option<String>,
    pub destination_station: Option<String>,
    pub month_from: Option<String>,
    pub month_to: Option<String>,
    pub day_types: BTreeSet<DayType>,
    pub time_slots: BTreeSet<TimeSlot>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            year: None,
            category: None,
            origin_station: None,
            destination_station: None,
            month_from: None,
            month_to: None,
            day_types: DayType::all(),
            time_slots: TimeSlot::all(),
        }
    }
}

impl FilterState {
    pub fn with_year(mut self, year: Option<&str>) -> Self {
        self.year = choice(year);
        self
    }

    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = choice(category);
        self
    }

    pub fn with_origin(mut self, code: Option<&str>) -> Self {
        self.origin_station = choice(code);
        self
    }

    pub fn with_destination(mut self, code: Option<&str>) -> Self {
        self.destination_station = choice(code);
        self
    }

    pub fn with_months(mut self, from: Option<&str>, to: Option<&str>) -> Self {
        self.month_from = choice(from);
        self.month_to = choice(to);
        self
    }

    /// Restrict day types to the labels in `labels`; unknown labels are ignored.
    pub fn with_day_types<S: AsRef<str>>(mut self, labels: &[S]) -> Self {
        self.day_types = labels.iter().filter_map(|l| DayType::parse(l.as_ref())).collect();
        self
    }

    pub fn with_time_slots<S: AsRef<str>>(mut self, labels: &[S]) -> Self {
        self.time_slots = labels.iter().filter_map(|l| TimeSlot::parse(l.as_ref())).collect();
        self
    }

    pub fn reset(&mut self) {
        *self = FilterState::default();
    }
}

pub trait RowFilter {
    /// `true` when the dimension restricts anything.
    fn is_active(&self) -> bool;

    fn matches(&self, row: &Row) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct YearFilter(pub Option<String>);

impl RowFilter for YearFilter {
    fn is_active(&self) -> bool {
        self.0.is_some()
    }

    fn matches(&self, row: &Row) -> bool {
        match &self.0 {
            Some(y) => row.period.trim().starts_with(y.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryFilter(pub Option<String>);

impl RowFilter for CategoryFilter {
    fn is_active(&self) -> bool {
        self.0.is_some()
    }

    fn matches(&self, row: &Row) -> bool {
        match &self.0 {
            Some(c) => row.categoria.as_deref() == Some(c.as_str()),
            None => true,
        }
    }
}

/// Origin or destination filter. Holds the full alias set of the selected
/// station so rows keyed by any historical code of it match.
#[derive(Debug, Clone)]
pub struct StationFilter {
    pub role: Role,
    pub codes: Option<BTreeSet<String>>,
}

impl StationFilter {
    pub fn new(role: Role, selected: Option<&str>, directory: &StationDirectory) -> Self {
        Self {
            role,
            codes: selected.map(|c| directory.alias_codes(c)),
        }
    }
}

impl RowFilter for StationFilter {
    fn is_active(&self) -> bool {
        self.codes.is_some()
    }

    /// OD rows are tested on their endpoint for this role; per-station rows
    /// only when their `ruolo` is this role.
    fn matches(&self, row: &Row) -> bool {
        let Some(codes) = &self.codes else {
            return true;
        };
        let endpoint = match self.role {
            Role::Partenza => row.cod_partenza.as_deref(),
            Role::Arrivo => row.cod_arrivo.as_deref(),
            Role::Nodo => None,
        };
        let code = endpoint.or_else(|| {
            row.cod_stazione
                .as_deref()
                .filter(|_| row.ruolo == Some(self.role))
        });
        code.is_some_and(|c| codes.contains(c))
    }
}

/// Inclusive `[lo, hi]` month range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthRange(pub Option<(String, String)>);

impl MonthRange {
    /// Bounds may come in either order or alone; a missing bound equals the
    /// other one. Unparseable bounds count as missing.
    pub fn normalize(from: Option<&str>, to: Option<&str>) -> Self {
        let from = from.and_then(parse_month);
        let to = to.and_then(parse_month);
        let range = match (from, to) {
            (Some(a), Some(b)) if a <= b => Some((a, b)),
            (Some(a), Some(b)) => Some((b, a)),
            (Some(a), None) | (None, Some(a)) => Some((a.clone(), a)),
            (None, None) => None,
        };
        MonthRange(range)
    }
}

impl RowFilter for MonthRange {
    fn is_active(&self) -> bool {
        self.0.is_some()
    }

    fn matches(&self, row: &Row) -> bool {
        match &self.0 {
            Some((lo, hi)) => {
                let m = row.month();
                m >= lo.as_str() && m <= hi.as_str()
            }
            None => true,
        }
    }
}

/// How a row relates to a segmentation filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMatch {
    /// No value for the dimension: passes.
    Missing,
    /// Value outside the vocabulary: passes, and is counted.
    Unrecognized,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct SegmentFilter<T: Segment> {
    pub enabled: BTreeSet<T>,
}

impl<T: Segment> SegmentFilter<T> {
    pub fn new(enabled: &BTreeSet<T>) -> Self {
        Self { enabled: enabled.clone() }
    }

    pub fn classify(&self, row: &Row) -> SegmentMatch {
        let Some(raw) = T::value(row).map(str::trim).filter(|v| !v.is_empty()) else {
            return SegmentMatch::Missing;
        };
        match T::parse(raw) {
            None => SegmentMatch::Unrecognized,
            Some(v) if self.enabled.contains(&v) => SegmentMatch::Enabled,
            Some(_) => SegmentMatch::Disabled,
        }
    }
}

impl<T: Segment> RowFilter for SegmentFilter<T> {
    fn is_active(&self) -> bool {
        T::ALL.iter().any(|v| !self.enabled.contains(v))
    }

    fn matches(&self, row: &Row) -> bool {
        !self.is_active() || self.classify(row) != SegmentMatch::Disabled
    }
}

/// Counts of segmentation values outside the known vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentDiagnostics {
    pub unrecognized_day_types: usize,
    pub unrecognized_time_slots: usize,
}

impl SegmentDiagnostics {
    pub fn merge(&mut self, other: SegmentDiagnostics) {
        self.unrecognized_day_types += other.unrecognized_day_types;
        self.unrecognized_time_slots += other.unrecognized_time_slots;
    }
}

/// All dimensions of a [`FilterState`], ready to test rows.
#[derive(Debug, Clone)]
pub struct Filters {
    pub year: YearFilter,
    pub category: CategoryFilter,
    pub origin: StationFilter,
    pub destination: StationFilter,
    pub months: MonthRange,
    pub day_types: SegmentFilter<DayType>,
    pub time_slots: SegmentFilter<TimeSlot>,
}

impl Filters {
    pub fn build(state: &FilterState, directory: &StationDirectory) -> Self {
        Self {
            year: YearFilter(choice(state.year.as_deref())),
            category: CategoryFilter(choice(state.category.as_deref())),
            origin: StationFilter::new(
                Role::Partenza,
                choice(state.origin_station.as_deref()).as_deref(),
                directory,
            ),
            destination: StationFilter::new(
                Role::Arrivo,
                choice(state.destination_station.as_deref()).as_deref(),
                directory,
            ),
            months: MonthRange::normalize(state.month_from.as_deref(), state.month_to.as_deref()),
            day_types: SegmentFilter::new(&state.day_types),
            time_slots: SegmentFilter::new(&state.time_slots),
        }
    }

    fn dimensions(&self) -> [&dyn RowFilter; 7] {
        [
            &self.year,
            &self.category,
            &self.origin,
            &self.destination,
            &self.months,
            &self.day_types,
            &self.time_slots,
        ]
    }

    pub fn is_any_active(&self) -> bool {
        self.dimensions().iter().any(|d| d.is_active())
    }

    pub fn has_station_filter(&self) -> bool {
        self.origin.is_active() || self.destination.is_active()
    }

    pub fn has_segment_filter(&self) -> bool {
        self.day_types.is_active() || self.time_slots.is_active()
    }

    pub fn has_category_filter(&self) -> bool {
        self.category.is_active()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.dimensions()
            .iter()
            .filter(|d| d.is_active())
            .all(|d| d.matches(row))
    }

    /// Rows of `rows` passing every active dimension.
    pub fn apply<'a>(&self, rows: &'a [Row]) -> Vec<&'a Row> {
        rows.iter().filter(|r| self.matches(r)).collect()
    }

    /// Unrecognized segmentation values among `rows` (only counted for
    /// active segmentation dimensions).
    pub fn segment_diagnostics<'a, I>(&self, rows: I) -> SegmentDiagnostics
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let mut diag = SegmentDiagnostics::default();
        let (days, slots) = (self.day_types.is_active(), self.time_slots.is_active());
        for row in rows {
            if days && self.day_types.classify(row) == SegmentMatch::Unrecognized {
                diag.unrecognized_day_types += 1;
            }
            if slots && self.time_slots.classify(row) == SegmentMatch::Unrecognized {
                diag.unrecognized_time_slots += 1;
            }
        }
        diag
    }
}
