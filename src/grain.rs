//! Grain selection: which gold table feeds which view under the current
//! filters.
//!
//! - A station filter moves KPI and series views to the origin-destination
//!   tables, the only ones carrying both endpoints.
//! - The segmented ("detail") table is used only when a day-type or time-slot
//!   filter is active and the table was actually shipped; otherwise the
//!   coarse table is used and the fallback is reported.
//! - When no table can carry a hard requirement (category, endpoints) the
//!   choice is empty instead of a table that would misrepresent the filter.

use crate::filters::{Filters, RowFilter};
use crate::types::{Datasets, Role, Row, TableKind};
use serde::Serialize;
use tracing::debug;

/// Consumers of filtered data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum View {
    Kpi,
    MonthlySeries,
    DailySeries,
    Histogram,
    Stations,
    OdPairs,
}

/// Table chosen for a view, with the rows it holds (unfiltered).
#[derive(Debug, Clone)]
pub struct GrainChoice<'a> {
    pub view: View,
    pub table: Option<TableKind>,
    pub rows: &'a [Row],
    /// A segmentation filter was requested but only a coarse table was
    /// usable, so it could not constrain anything.
    pub segmentation_fallback: bool,
    /// Role constraint for per-station histogram rows.
    pub role: Option<Role>,
}

impl GrainChoice<'_> {
    fn empty(view: View) -> Self {
        GrainChoice {
            view,
            table: None,
            rows: &[],
            segmentation_fallback: false,
            role: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_segmented(&self) -> bool {
        self.table.is_some_and(TableKind::is_segmented)
    }
}

/// Coarse candidates (in preference order) and the optional detail table.
fn family(view: View, station_filter: bool) -> (&'static [TableKind], Option<TableKind>) {
    use TableKind::*;
    match (view, station_filter) {
        (View::Kpi | View::MonthlySeries, false) => {
            (&[KpiMonthCategory, KpiMonth], Some(KpiDetail))
        }
        (View::DailySeries, false) => (&[KpiDayCategory, KpiDay], Some(KpiDetail)),
        (View::Kpi | View::MonthlySeries | View::OdPairs, true) | (View::OdPairs, false) => {
            (&[OdMonthCategory], Some(OdDetail))
        }
        (View::DailySeries, true) => (&[OdDayCategory], Some(OdDetail)),
        (View::Stations, false) => (&[StationsMonthNode], None),
        (View::Histogram, false) => (&[HistMonthCategory], None),
        (View::Histogram, true) => (&[HistStationRole], None),
        (View::Stations, true) => (&[], None),
    }
}

/// Pick the table feeding `view` under `filters`.
pub fn select_grain<'a>(view: View, filters: &Filters, datasets: &'a Datasets) -> GrainChoice<'a> {
    let station = filters.has_station_filter();
    let segment = filters.has_segment_filter();
    let category = filters.has_category_filter();

    let role = match view {
        View::Histogram => match (filters.origin.is_active(), filters.destination.is_active()) {
            (true, true) => {
                debug!(?view, "both endpoints filtered, no per-station table can represent a pair");
                return GrainChoice::empty(view);
            }
            (true, false) => Some(Role::Partenza),
            (false, true) => Some(Role::Arrivo),
            (false, false) => None,
        },
        _ => None,
    };

    let (coarse, detail) = family(view, station);
    let satisfies = |k: TableKind| {
        (!category || k.has_category()) && (!station || k.has_endpoints() || role.is_some())
    };
    let usable = |k: TableKind| satisfies(k) && !datasets.is_empty_table(k);

    let chosen = match detail {
        Some(d) if segment && usable(d) => Some(d),
        _ => coarse
            .iter()
            .copied()
            .find(|k| usable(*k))
            .or_else(|| detail.filter(|d| usable(*d))),
    };

    let Some(table) = chosen else {
        debug!(?view, station, segment, category, "no usable grain");
        return GrainChoice::empty(view);
    };

    let choice = GrainChoice {
        view,
        table: Some(table),
        rows: datasets.rows(table),
        segmentation_fallback: segment && !table.is_segmented(),
        role,
    };
    debug!(?view, %table, fallback = choice.segmentation_fallback, "grain selected");
    choice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterState;
    use crate::stations::StationDirectory;
    use crate::types::Dataset;

    fn ds(kind: TableKind, n: usize) -> Dataset {
        Dataset {
            kind,
            rows: (0..n)
                .map(|_| Row { period: "2023-01".to_string(), ..Default::default() })
                .collect(),
        }
    }

    fn build(state: FilterState) -> Filters {
        Filters::build(&state, &StationDirectory::default())
    }

    fn datasets() -> Datasets {
        Datasets::new()
            .with(ds(TableKind::KpiMonthCategory, 2))
            .with(ds(TableKind::KpiMonth, 1))
            .with(ds(TableKind::KpiDetail, 5))
            .with(ds(TableKind::OdMonthCategory, 3))
            .with(ds(TableKind::StationsMonthNode, 4))
            .with(ds(TableKind::HistMonthCategory, 6))
            .with(ds(TableKind::HistStationRole, 7))
    }

    #[test]
    fn test_no_filters_uses_coarse_category_table() {
        let d = datasets();
        let c = select_grain(View::Kpi, &build(FilterState::default()), &d);
        assert_eq!(c.table, Some(TableKind::KpiMonthCategory));
        assert!(!c.segmentation_fallback);
    }

    #[test]
    fn test_station_filter_prefers_od() {
        let d = datasets();
        let f = build(FilterState::default().with_origin(Some("S1")));
        assert_eq!(select_grain(View::Kpi, &f, &d).table, Some(TableKind::OdMonthCategory));
        assert!(select_grain(View::Stations, &f, &d).is_empty());
    }

    #[test]
    fn test_segment_filter_prefers_detail_when_shipped() {
        let d = datasets();
        let f = build(FilterState::default().with_day_types(&["festivo"]));
        let c = select_grain(View::Kpi, &f, &d);
        assert_eq!(c.table, Some(TableKind::KpiDetail));
        assert!(c.is_segmented());

        let without_detail = Datasets::new().with(ds(TableKind::KpiMonthCategory, 2));
        let c = select_grain(View::Kpi, &f, &without_detail);
        assert_eq!(c.table, Some(TableKind::KpiMonthCategory));
        assert!(c.segmentation_fallback);
    }

    #[test]
    fn test_station_filter_without_od_is_empty() {
        let d = Datasets::new().with(ds(TableKind::KpiMonthCategory, 2));
        let f = build(FilterState::default().with_destination(Some("S2")));
        let c = select_grain(View::MonthlySeries, &f, &d);
        assert!(c.is_empty());
        assert_eq!(c.table, None);
    }

    #[test]
    fn test_category_filter_skips_uncategorized_table() {
        let d = Datasets::new().with(ds(TableKind::KpiMonth, 2));
        assert_eq!(
            select_grain(View::Kpi, &build(FilterState::default()), &d).table,
            Some(TableKind::KpiMonth)
        );
        let f = build(FilterState::default().with_category(Some("REG")));
        assert!(select_grain(View::Kpi, &f, &d).is_empty());
    }

    #[test]
    fn test_histogram_roles() {
        let d = datasets();
        let origin = build(FilterState::default().with_origin(Some("S1")));
        let c = select_grain(View::Histogram, &origin, &d);
        assert_eq!(c.table, Some(TableKind::HistStationRole));
        assert_eq!(c.role, Some(Role::Partenza));

        let both = build(
            FilterState::default()
                .with_origin(Some("S1"))
                .with_destination(Some("S2")),
        );
        assert!(select_grain(View::Histogram, &both, &d).is_empty());

        let none = select_grain(View::Histogram, &build(FilterState::default()), &d);
        assert_eq!(none.table, Some(TableKind::HistMonthCategory));
    }

    #[test]
    fn test_detail_as_last_resort() {
        let d = Datasets::new().with(ds(TableKind::KpiDetail, 1));
        let c = select_grain(View::DailySeries, &build(FilterState::default()), &d);
        assert_eq!(c.table, Some(TableKind::KpiDetail));
    }
}
