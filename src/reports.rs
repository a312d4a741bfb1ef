use crate::aggregate::{aggregate, by_bucket, total, AggregationBucket, WeightedCentroid};
use crate::metrics::MetricMode;
use crate::stations::{CapitalKey, Coords, StationDirectory};
use crate::types::{Counters, HistogramRow, KpiRow, LeaderboardRow, MapPointRow, Row, SeriesRow};
use crate::util::{format_count, format_number, pct};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Maximum number of points handed to the map.
pub const MAP_POINT_LIMIT: usize = 250;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub corse_osservate: f64,
    pub in_ritardo: f64,
    pub minuti_ritardo_tot: f64,
    pub cancellate: f64,
    pub soppresse: f64,
    pub pct_ritardo: f64,
}

impl Kpis {
    pub fn from_counters(c: &Counters) -> Self {
        Kpis {
            corse_osservate: c.corse_osservate,
            in_ritardo: c.in_ritardo,
            minuti_ritardo_tot: c.minuti_ritardo_tot,
            cancellate: c.cancellate,
            soppresse: c.soppresse,
            pct_ritardo: c.pct_ritardo(),
        }
    }

    pub fn to_row(&self) -> KpiRow {
        KpiRow {
            total: format_count(self.corse_osservate),
            late: format_count(self.in_ritardo),
            pct_late: format_number(self.pct_ritardo, 2),
            minutes: format_count(self.minuti_ritardo_tot),
            cancelled: format_count(self.cancellate),
            suppressed: format_count(self.soppresse),
        }
    }
}

pub fn kpis<'a, I>(rows: I) -> Kpis
where
    I: IntoIterator<Item = &'a Row>,
{
    Kpis::from_counters(&total(rows))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub period: String,
    pub value: f64,
}

impl SeriesPoint {
    pub fn to_row(&self, metric: MetricMode) -> SeriesRow {
        SeriesRow {
            period: self.period.clone(),
            value: format_metric(metric, self.value),
        }
    }
}

/// One point per period present in `rows`, in period order.
pub fn time_series<'a, I, F>(rows: I, period_key: F, metric: MetricMode) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a Row>,
    F: Fn(&Row) -> Option<String>,
{
    aggregate(rows, period_key)
        .into_iter()
        .map(|b| SeriesPoint {
            value: metric.value_of(&b.counters),
            period: b.key,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum HistogramMode {
    #[default]
    Count,
    Percent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBar {
    pub label: String,
    pub count: f64,
    /// `count`, or its share of the total in percent.
    pub value: f64,
}

impl HistogramBar {
    pub fn to_row(&self, mode: HistogramMode) -> HistogramRow {
        HistogramRow {
            label: self.label.clone(),
            count: format_count(self.count),
            value: match mode {
                HistogramMode::Count => format_count(self.value),
                HistogramMode::Percent => format_number(self.value, 1),
            },
        }
    }
}

/// One bar per configured label, in label order. Rows whose bucket is not a
/// configured label are ignored.
pub fn histogram<'a, I>(rows: I, labels: &[String], mode: HistogramMode) -> Vec<HistogramBar>
where
    I: IntoIterator<Item = &'a Row>,
{
    let sums: BTreeMap<String, f64> = aggregate(rows, by_bucket)
        .into_iter()
        .map(|b| (b.key, b.counters.count))
        .collect();
    let counts: Vec<f64> = labels
        .iter()
        .map(|l| sums.get(l.trim()).copied().unwrap_or(0.0))
        .collect();
    let grand: f64 = counts.iter().sum();
    labels
        .iter()
        .zip(counts)
        .map(|(label, count)| HistogramBar {
            label: label.clone(),
            count,
            value: match mode {
                HistogramMode::Count => count,
                HistogramMode::Percent => pct(count, grand),
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub key: String,
    pub name: String,
    pub counters: Counters,
    pub pct_ritardo: f64,
    pub value: f64,
}

impl LeaderboardEntry {
    pub fn to_row(&self, rank: usize, metric: MetricMode) -> LeaderboardRow {
        LeaderboardRow {
            rank,
            name: self.name.clone(),
            key: self.key.clone(),
            total: format_count(self.counters.corse_osservate),
            late: format_count(self.counters.in_ritardo),
            pct_late: format_number(self.pct_ritardo, 2),
            minutes: format_count(self.counters.minuti_ritardo_tot),
            cancelled: format_count(self.counters.cancellate),
            suppressed: format_count(self.counters.soppresse),
            value: format_metric(metric, self.value),
        }
    }
}

pub fn format_metric(metric: MetricMode, value: f64) -> String {
    if metric.is_percentage() {
        format_number(value, 2)
    } else {
        format_count(value)
    }
}

fn by_value_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Keep buckets with at least `min_trains` observed runs, sort by metric
/// descending (ties by key) and take `top_n`.
fn rank<K, F>(
    buckets: Vec<AggregationBucket<K>>,
    metric: MetricMode,
    min_trains: f64,
    top_n: usize,
    describe: F,
) -> Vec<LeaderboardEntry>
where
    K: Ord,
    F: Fn(&K) -> (String, String),
{
    let mut scored: Vec<(f64, AggregationBucket<K>)> = buckets
        .into_iter()
        .filter(|b| b.counters.corse_osservate >= min_trains)
        .map(|b| (metric.value_of(&b.counters), b))
        .collect();
    scored.sort_by(|a, b| by_value_desc(a.0, b.0).then_with(|| a.1.key.cmp(&b.1.key)));
    scored
        .into_iter()
        .take(top_n)
        .map(|(value, b)| {
            let (key, name) = describe(&b.key);
            LeaderboardEntry {
                key,
                name,
                counters: b.counters,
                pct_ritardo: b.pct_ritardo,
                value,
            }
        })
        .collect()
}

/// Names carried by the rows themselves, keyed by canonical station code.
fn row_names<'a>(
    rows: &[&'a Row],
    directory: &StationDirectory,
) -> HashMap<String, &'a str> {
    let mut names = HashMap::new();
    for r in rows {
        let code = r.cod_stazione.as_deref();
        if let (Some(code), Some(name)) = (code, r.nome_stazione.as_deref()) {
            names.entry(directory.canonical_code(code)).or_insert(name);
        }
    }
    names
}

/// Stations ranked by `metric`; alias codes are merged under their
/// representative.
pub fn station_leaderboard(
    rows: &[&Row],
    directory: &StationDirectory,
    metric: MetricMode,
    min_trains: f64,
    top_n: usize,
) -> Vec<LeaderboardEntry> {
    let names = row_names(rows, directory);
    let buckets = aggregate(rows.iter().copied(), |r| {
        r.cod_stazione.as_deref().map(|c| directory.canonical_code(c))
    });
    rank(buckets, metric, min_trains, top_n, |code| {
        let resolved = directory.resolve_with_fallback(code, names.get(code).copied());
        (code.clone(), resolved.name)
    })
}

/// Capital cities ranked by `metric`. Stations outside every capital are
/// left out of this view.
pub fn city_leaderboard(
    rows: &[&Row],
    directory: &StationDirectory,
    metric: MetricMode,
    min_trains: f64,
    top_n: usize,
) -> Vec<LeaderboardEntry> {
    let names = row_names(rows, directory);
    let buckets = aggregate(rows.iter().copied(), |r| {
        let code = r.cod_stazione.as_deref()?;
        let name = names.get(&directory.canonical_code(code)).copied();
        directory.capital_of(code, name)
    });
    rank(buckets, metric, min_trains, top_n, |k: &CapitalKey| {
        (k.key.clone(), k.display.clone())
    })
}

/// Origin-destination pairs ranked by `metric`.
pub fn od_leaderboard(
    rows: &[&Row],
    directory: &StationDirectory,
    metric: MetricMode,
    min_trains: f64,
    top_n: usize,
) -> Vec<LeaderboardEntry> {
    let buckets = aggregate(rows.iter().copied(), |r| match (&r.cod_partenza, &r.cod_arrivo) {
        (Some(a), Some(b)) => Some((directory.canonical_code(a), directory.canonical_code(b))),
        _ => None,
    });
    rank(buckets, metric, min_trains, top_n, |(a, b)| {
        (
            format!("{a}-{b}"),
            format!("{} → {}", directory.resolve(a).name, directory.resolve(b).name),
        )
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub key: String,
    pub name: String,
    pub coords: Coords,
    pub value: f64,
    pub counters: Counters,
    /// Stations whose coordinates went into the centroid.
    pub stations: usize,
}

impl MapPoint {
    pub fn to_row(&self, metric: MetricMode) -> MapPointRow {
        MapPointRow {
            name: self.name.clone(),
            lat: format!("{:.4}", self.coords.lat),
            lon: format!("{:.4}", self.coords.lon),
            value: format_metric(metric, self.value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapReport {
    pub points: Vec<MapPoint>,
    /// Stations that belong to a capital but have no usable coordinates.
    pub missing_coords: usize,
}

/// City points for the map: counters summed per capital city, placed at the
/// traffic-weighted centroid of its stations, largest `metric` first,
/// capped at `limit`.
pub fn map_points(
    rows: &[&Row],
    directory: &StationDirectory,
    metric: MetricMode,
    min_trains: f64,
    limit: usize,
) -> MapReport {
    struct CityAcc {
        display: String,
        counters: Counters,
        centroid: WeightedCentroid,
        stations: usize,
    }

    let names = row_names(rows, directory);
    let per_station = aggregate(rows.iter().copied(), |r| {
        r.cod_stazione.as_deref().map(|c| directory.canonical_code(c))
    });

    let mut cities: BTreeMap<String, CityAcc> = BTreeMap::new();
    let mut missing_coords = 0usize;
    for st in per_station {
        let Some(cap) = directory.capital_of(&st.key, names.get(&st.key).copied()) else {
            continue;
        };
        let acc = cities.entry(cap.key).or_insert_with(|| CityAcc {
            display: cap.display,
            counters: Counters::default(),
            centroid: WeightedCentroid::default(),
            stations: 0,
        });
        acc.counters.add(&st.counters);
        match directory.coords(&st.key) {
            Some(c) => {
                acc.centroid.add(c, st.counters.corse_osservate);
                acc.stations += 1;
            }
            None => missing_coords += 1,
        }
    }

    let mut points: Vec<MapPoint> = cities
        .into_iter()
        .filter(|(_, acc)| acc.counters.corse_osservate >= min_trains)
        .filter_map(|(key, acc)| {
            let coords = acc.centroid.centroid()?;
            Some(MapPoint {
                key,
                name: acc.display,
                coords,
                value: metric.value_of(&acc.counters),
                counters: acc.counters,
                stations: acc.stations,
            })
        })
        .collect();
    points.sort_by(|a, b| by_value_desc(a.value, b.value).then_with(|| a.key.cmp(&b.key)));
    points.truncate(limit);
    MapReport { points, missing_coords }
}
