//! `apply_filters`: the whole filtering-and-aggregation pass from loaded
//! tables and a filter state to everything the visuals draw.
//!
//! The pass is a pure function of its inputs. Each view picks its own grain,
//! filters it with the same predicates and reduces it through the shared
//! aggregator and metric code.

use crate::aggregate::{by_day, by_month};
use crate::decoder::RawRow;
use crate::filters::{FilterState, Filters, SegmentDiagnostics};
use crate::grain::{select_grain, GrainChoice, View};
use crate::manifest::ManifestConfig;
use crate::metrics::MetricMode;
use crate::reports::{
    city_leaderboard, histogram, kpis, map_points, od_leaderboard, station_leaderboard, time_series,
    HistogramBar, HistogramMode, Kpis, LeaderboardEntry, MapReport, SeriesPoint, MAP_POINT_LIMIT,
};
use crate::stations::{CapoluogoSet, StationDirectory, StationItem};
use crate::types::{Datasets, Row, TableKind};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Tables feeding the headline KPIs.
const KPI_TABLES: [TableKind; 5] = [
    TableKind::KpiMonth,
    TableKind::KpiMonthCategory,
    TableKind::KpiDay,
    TableKind::KpiDayCategory,
    TableKind::KpiDetail,
];

/// Everything loaded for one dashboard session. Rebuilt wholesale on reload.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    pub manifest: ManifestConfig,
    pub datasets: Datasets,
    pub directory: StationDirectory,
}

impl DataStore {
    /// Assemble a store, building the station directory from the dimension
    /// rows plus every station code that appears in the fact tables.
    pub fn build(
        manifest: ManifestConfig,
        datasets: Datasets,
        station_rows: &[RawRow],
        capitals: CapoluogoSet,
    ) -> Self {
        let observed = observed_codes(&datasets);
        let directory = StationDirectory::build(station_rows, capitals, observed);
        DataStore {
            manifest,
            datasets,
            directory,
        }
    }

    /// `true` when every table feeding the headline KPIs is empty.
    pub fn has_no_valid_data(&self) -> bool {
        KPI_TABLES.iter().all(|k| self.datasets.is_empty_table(*k))
    }
}

fn observed_codes(datasets: &Datasets) -> BTreeSet<String> {
    let mut codes = BTreeSet::new();
    for ds in datasets.iter() {
        for r in &ds.rows {
            for c in [&r.cod_partenza, &r.cod_arrivo, &r.cod_stazione].into_iter().flatten() {
                codes.insert(c.clone());
            }
        }
    }
    codes
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderOptions {
    pub top_n: usize,
    pub histogram_mode: HistogramMode,
    pub map_limit: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            top_n: 10,
            histogram_mode: HistogramMode::Count,
            map_limit: MAP_POINT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DataStatus {
    #[default]
    Ok,
    /// Every table feeding the headline KPIs was empty or missing.
    NoValidData,
}

/// Which table fed which view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrainUsage {
    pub view: View,
    pub table: Option<TableKind>,
    pub segmentation_fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub segments: SegmentDiagnostics,
    /// Some view could not honor an active day-type/time-slot filter.
    pub segmentation_fallback: bool,
    pub missing_coords: usize,
    pub grains: Vec<GrainUsage>,
}

/// Output of one filtering pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderModel {
    pub status: DataStatus,
    pub metric: MetricMode,
    pub kpis: Kpis,
    pub monthly: Vec<SeriesPoint>,
    pub daily: Vec<SeriesPoint>,
    pub histogram: Vec<HistogramBar>,
    pub stations: Vec<LeaderboardEntry>,
    pub cities: Vec<LeaderboardEntry>,
    pub od_pairs: Vec<LeaderboardEntry>,
    pub map: MapReport,
    pub diagnostics: Diagnostics,
}

struct Pass<'a> {
    filters: Filters,
    datasets: &'a Datasets,
    diagnostics: Diagnostics,
}

impl<'a> Pass<'a> {
    fn rows(&mut self, view: View) -> Vec<&'a Row> {
        let choice: GrainChoice<'a> = select_grain(view, &self.filters, self.datasets);
        self.diagnostics.segmentation_fallback |= choice.segmentation_fallback;
        self.diagnostics.grains.push(GrainUsage {
            view,
            table: choice.table,
            segmentation_fallback: choice.segmentation_fallback,
        });
        self.filters.apply(choice.rows)
    }
}

/// Run every view of the dashboard over `store` under `state`.
pub fn apply_filters(
    store: &DataStore,
    state: &FilterState,
    metric: MetricMode,
    options: &RenderOptions,
) -> RenderModel {
    let filters = Filters::build(state, &store.directory);
    let mut pass = Pass {
        filters,
        datasets: &store.datasets,
        diagnostics: Diagnostics::default(),
    };
    let min_trains = store.manifest.leaderboard_min_trains;
    let dir = &store.directory;

    let kpi_rows = pass.rows(View::Kpi);
    let segments = pass.filters.segment_diagnostics(kpi_rows.iter().copied());
    pass.diagnostics.segments.merge(segments);
    let kpis = kpis(kpi_rows.iter().copied());

    let monthly_rows = pass.rows(View::MonthlySeries);
    let monthly = time_series(monthly_rows.iter().copied(), by_month, metric);

    let daily_rows = pass.rows(View::DailySeries);
    let daily = time_series(daily_rows.iter().copied(), by_day, metric);

    let hist_rows = pass.rows(View::Histogram);
    let histogram = histogram(
        hist_rows.iter().copied(),
        &store.manifest.delay_bucket_labels,
        options.histogram_mode,
    );

    let station_rows = pass.rows(View::Stations);
    let stations = station_leaderboard(&station_rows, dir, metric, min_trains, options.top_n);
    let cities = city_leaderboard(&station_rows, dir, metric, min_trains, options.top_n);
    let map = map_points(&station_rows, dir, metric, min_trains, options.map_limit);
    pass.diagnostics.missing_coords = map.missing_coords;

    let od_rows = pass.rows(View::OdPairs);
    let od_pairs = od_leaderboard(&od_rows, dir, metric, min_trains, options.top_n);

    let status = if store.has_no_valid_data() {
        DataStatus::NoValidData
    } else {
        DataStatus::Ok
    };
    debug!(
        ?status,
        kpi_rows = kpi_rows.len(),
        station_rows = station_rows.len(),
        fallback = pass.diagnostics.segmentation_fallback,
        "filters applied"
    );

    RenderModel {
        status,
        metric,
        kpis,
        monthly,
        daily,
        histogram,
        stations,
        cities,
        od_pairs,
        map,
        diagnostics: pass.diagnostics,
    }
}

/// Choices offered by the selectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptionLists {
    pub years: Vec<String>,
    pub categories: Vec<String>,
    pub origins: Vec<StationItem>,
    pub destinations: Vec<StationItem>,
}

/// Years and categories present in the data, plus the station items that
/// ever appear as origin or destination. Without origin-destination tables
/// every known station is offered on both sides.
pub fn option_lists(store: &DataStore) -> OptionLists {
    let mut years = BTreeSet::new();
    let mut categories = BTreeSet::new();
    let mut origins = BTreeSet::new();
    let mut destinations = BTreeSet::new();
    for ds in store.datasets.iter() {
        for r in &ds.rows {
            let y = r.year();
            if y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()) {
                years.insert(y.to_string());
            }
            if let Some(c) = &r.categoria {
                categories.insert(c.clone());
            }
            if let Some(c) = &r.cod_partenza {
                origins.insert(store.directory.canonical_code(c));
            }
            if let Some(c) = &r.cod_arrivo {
                destinations.insert(store.directory.canonical_code(c));
            }
        }
    }

    let items = store.directory.items();
    let pick = |codes: &BTreeSet<String>| -> Vec<StationItem> {
        if codes.is_empty() {
            return items.to_vec();
        }
        items
            .iter()
            .filter(|it| codes.contains(&it.representative_code))
            .cloned()
            .collect()
    };

    OptionLists {
        years: years.into_iter().collect(),
        categories: categories.into_iter().collect(),
        origins: pick(&origins),
        destinations: pick(&destinations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::parse_csv;
    use crate::types::Dataset;

    fn table(kind: TableKind, csv: &str) -> Dataset {
        Dataset::from_raw(kind, &parse_csv(csv))
    }

    fn store() -> DataStore {
        let datasets = Datasets::new()
            .with(table(
                TableKind::KpiMonthCategory,
                "mese,categoria,corse_osservate,in_ritardo\n\
                 2023-01,REG,100,20\n\
                 2023-02,REG,50,30\n\
                 2023-02,AV,10,1\n",
            ))
            .with(table(
                TableKind::OdMonthCategory,
                "mese,categoria,cod_partenza,cod_arrivo,corse_osservate,in_ritardo\n\
                 2023-01,REG,S1,S3,40,4\n\
                 2023-01,REG,S2,S3,60,30\n\
                 2023-01,REG,S3,S1,70,7\n",
            ))
            .with(table(
                TableKind::StationsMonthNode,
                "mese,categoria,cod_stazione,corse_osservate,in_ritardo\n\
                 2023-01,REG,S1,100,10\n\
                 2023-01,REG,S3,50,25\n",
            ));
        let stations = parse_csv(
            "cod_stazione,nome_stazione,citta,lat,lon\n\
             S1,Milano Centrale,Milano,45.48,9.20\n\
             S2,Milano Centrale,Milano,,\n\
             S3,Bergamo,Bergamo,45.69,9.67\n",
        );
        DataStore::build(ManifestConfig::default(), datasets, &stations, CapoluogoSet::default())
    }

    #[test]
    fn test_unfiltered_pass() {
        let s = store();
        let m = apply_filters(
            &s,
            &FilterState::default(),
            MetricMode::PctLate,
            &RenderOptions::default(),
        );
        assert_eq!(m.status, DataStatus::Ok);
        assert_eq!(m.kpis.corse_osservate, 160.0);
        assert_eq!(m.monthly.len(), 2);
        assert_eq!(m.stations.len(), 2);
        assert_eq!(m.stations[0].key, "S3");
        assert!(m.daily.is_empty());
        assert_eq!(m.histogram.len(), 6);
    }

    #[test]
    fn test_origin_filter_switches_to_od_and_merges_aliases() {
        let s = store();
        let state = FilterState::default().with_origin(Some("S2"));
        let m = apply_filters(&s, &state, MetricMode::Total, &RenderOptions::default());
        assert_eq!(m.kpis.corse_osservate, 100.0);
        assert!(m.stations.is_empty());
        assert!(m.cities.is_empty());
        assert_eq!(m.od_pairs.len(), 1);
        assert_eq!(m.od_pairs[0].key, "S1-S3");
    }

    #[test]
    fn test_no_valid_data() {
        let m = apply_filters(
            &DataStore::default(),
            &FilterState::default(),
            MetricMode::PctLate,
            &RenderOptions::default(),
        );
        assert_eq!(m.status, DataStatus::NoValidData);
        assert_eq!(m.kpis, Kpis::default());
        assert!(m.histogram.iter().all(|b| b.value == 0.0));
    }

    #[test]
    fn test_segment_fallback_flag() {
        let s = store();
        let state = FilterState::default().with_day_types(&["festivo"]);
        let m = apply_filters(&s, &state, MetricMode::PctLate, &RenderOptions::default());
        assert!(m.diagnostics.segmentation_fallback);
        assert_eq!(m.kpis.corse_osservate, 160.0);
    }

    #[test]
    fn test_option_lists() {
        let o = option_lists(&store());
        assert_eq!(o.years, vec!["2023"]);
        assert_eq!(o.categories, vec!["AV", "REG"]);
        assert_eq!(o.origins.len(), 2);
        assert_eq!(o.destinations.len(), 2);
        let milano = o.origins.iter().find(|i| i.name == "Milano Centrale").unwrap();
        assert_eq!(milano.codes.len(), 2);
    }
}
