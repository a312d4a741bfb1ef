//! Group-and-sum over typed rows.
//!
//! Counters are always summed per group first; `pct_ritardo` is derived from
//! the summed numerator and denominator afterwards, never averaged.

use crate::stations::Coords;
use crate::types::{Counters, Row};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationBucket<K> {
    pub key: K,
    pub counters: Counters,
    /// Number of rows folded into this bucket.
    pub rows: usize,
    pub pct_ritardo: f64,
}

/// Group `rows` by `key_fn` and sum every counter. Rows for which `key_fn`
/// returns `None` are left out. Buckets come back sorted by key.
pub fn aggregate<'a, K, I, F>(rows: I, key_fn: F) -> Vec<AggregationBucket<K>>
where
    K: Ord,
    I: IntoIterator<Item = &'a Row>,
    F: Fn(&Row) -> Option<K>,
{
    let mut map: BTreeMap<K, (Counters, usize)> = BTreeMap::new();
    for row in rows {
        let Some(key) = key_fn(row) else {
            continue;
        };
        let e = map.entry(key).or_default();
        e.0.add(&row.counters);
        e.1 += 1;
    }
    map.into_iter()
        .map(|(key, (counters, rows))| AggregationBucket {
            key,
            pct_ritardo: counters.pct_ritardo(),
            counters,
            rows,
        })
        .collect()
}

/// Sum of every counter over `rows`.
pub fn total<'a, I>(rows: I) -> Counters
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut acc = Counters::default();
    for r in rows {
        acc.add(&r.counters);
    }
    acc
}

/// Group key: the row's month (`YYYY-MM`), truncated from day labels.
pub fn by_month(row: &Row) -> Option<String> {
    let m = row.month();
    (!m.is_empty()).then(|| m.to_string())
}

/// Group key: the row's day; monthly rows are left out.
pub fn by_day(row: &Row) -> Option<String> {
    row.is_daily().then(|| row.period.trim().to_string())
}

/// Group key: the delay bucket label.
pub fn by_bucket(row: &Row) -> Option<String> {
    row.bucket.clone()
}

/// Traffic-weighted mean of station coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedCentroid {
    sum_lat: f64,
    sum_lon: f64,
    weight: f64,
}

impl WeightedCentroid {
    /// Each station weighs `max(1, corse_osservate)`.
    pub fn add(&mut self, coords: Coords, corse_osservate: f64) {
        let w = corse_osservate.max(1.0);
        self.sum_lat += coords.lat * w;
        self.sum_lon += coords.lon * w;
        self.weight += w;
    }

    pub fn centroid(&self) -> Option<Coords> {
        if self.weight <= 0.0 {
            return None;
        }
        let c = Coords {
            lat: self.sum_lat / self.weight,
            lon: self.sum_lon / self.weight,
        };
        (c.lat.is_finite() && c.lon.is_finite()).then_some(c)
    }
}
