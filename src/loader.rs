use crate::decoder::{parse_csv, RawRow};
use crate::manifest::{Manifest, ManifestConfig};
use crate::pipeline::DataStore;
use crate::sources::{resolve_first, source_for, Source};
use crate::stations::CapoluogoSet;
use crate::types::{Dataset, Datasets, TableKind};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const STATIONS_FILE: &str = "stations_dim.csv";
pub const CAPITALS_FILE: &str = "capoluoghi_provincia.csv";

/// Base locations tried when none are given.
pub const DEFAULT_LOCATIONS: [&str; 3] = ["data", "site/data", "docs/data"];

#[derive(Debug, Clone, Serialize)]
pub struct TableLoad {
    pub file: String,
    /// Winning location, `None` when every candidate failed.
    pub location: Option<String>,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub manifest_location: Option<String>,
    pub tables: Vec<TableLoad>,
    pub stations: usize,
    pub capitals: usize,
}

impl LoadReport {
    /// Files for which no candidate produced content.
    pub fn missing(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.location.is_none())
            .map(|t| t.file.as_str())
            .collect()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

pub fn sources_for<S: AsRef<str>>(locations: &[S]) -> Vec<Box<dyn Source>> {
    if locations.is_empty() {
        return DEFAULT_LOCATIONS.iter().map(|l| source_for(l)).collect();
    }
    locations.iter().map(|l| source_for(l.as_ref())).collect()
}

/// Fetch and decode one CSV file; any acquisition failure reads as "no rows".
async fn fetch_rows(sources: &[Box<dyn Source>], file: &str) -> (TableLoad, Vec<RawRow>) {
    match resolve_first(sources, file).await {
        Ok((location, text)) => {
            let rows = parse_csv(&text);
            info!(file, %location, rows = rows.len(), "loaded");
            let load = TableLoad {
                file: file.to_string(),
                location: Some(location),
                rows: rows.len(),
            };
            (load, rows)
        }
        Err(e) => {
            warn!(file, error = %e, "using empty table");
            let load = TableLoad {
                file: file.to_string(),
                location: None,
                rows: 0,
            };
            (load, Vec::new())
        }
    }
}

async fn load_manifest(sources: &[Box<dyn Source>]) -> (ManifestConfig, Option<String>) {
    let parsed = match resolve_first(sources, MANIFEST_FILE).await {
        Ok((location, text)) => Manifest::from_json(&text)
            .map(|m| (m.resolve(), Some(location)))
            .map_err(Into::into),
        Err(e) => Err(e),
    };
    match parsed {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "manifest unavailable, using defaults");
            (ManifestConfig::default(), None)
        }
    }
}

/// Load every known table plus the station and capital dimensions.
///
/// Never fails: anything that cannot be fetched becomes an empty table and
/// shows up in [`LoadReport::missing`].
pub async fn load_store(sources: &[Box<dyn Source>]) -> (DataStore, LoadReport) {
    let (manifest, manifest_location) = load_manifest(sources).await;
    let kinds = manifest.table_kinds();

    let tables = join_all(kinds.iter().map(|k| fetch_rows(sources, k.file_name()))).await;
    let ((stations_load, station_rows), (capitals_load, capital_rows)) = futures::join!(
        fetch_rows(sources, STATIONS_FILE),
        fetch_rows(sources, CAPITALS_FILE)
    );

    let mut report = LoadReport {
        manifest_location,
        ..Default::default()
    };
    let mut datasets = Datasets::new();
    for (kind, (load, raw)) in kinds.iter().copied().zip(tables) {
        datasets.insert(Dataset::from_raw(kind, &raw));
        report.tables.push(load);
    }
    report.tables.push(stations_load);
    report.tables.push(capitals_load);

    let capitals = CapoluogoSet::from_rows(&capital_rows);
    let store = DataStore::build(manifest, datasets, &station_rows, capitals);
    report.stations = store.directory.len();
    report.capitals = store.directory.capitals().len();

    if store.has_no_valid_data() {
        warn!("no valid data found in any KPI table");
    }
    info!(
        tables = report.tables.len(),
        missing = report.missing().len(),
        rows = report.total_rows(),
        stations = report.stations,
        "data store ready"
    );
    (store, report)
}

/// `true` when some source provided the file for `kind`.
pub fn was_loaded(report: &LoadReport, kind: TableKind) -> bool {
    report
        .tables
        .iter()
        .any(|t| t.file == kind.file_name() && t.location.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::FsSource;

    #[tokio::test]
    async fn test_missing_everything_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sources: Vec<Box<dyn Source>> = vec![Box::new(FsSource::new(dir.path()))];
        let (store, report) = load_store(&sources).await;
        assert!(store.has_no_valid_data());
        assert!(report.manifest_location.is_none());
        assert_eq!(report.missing().len(), TableKind::ALL.len() + 2);
        assert_eq!(store.manifest, ManifestConfig::default());
    }

    #[tokio::test]
    async fn test_bad_manifest_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        std::fs::write(
            dir.path().join("kpi_mese.csv"),
            "mese,corse_osservate\n2023-01,5\n",
        )
        .unwrap();
        let sources: Vec<Box<dyn Source>> = vec![Box::new(FsSource::new(dir.path()))];
        let (store, report) = load_store(&sources).await;
        assert!(report.manifest_location.is_none());
        assert!(was_loaded(&report, TableKind::KpiMonth));
        assert!(!was_loaded(&report, TableKind::KpiDetail));
        assert_eq!(store.datasets.rows(TableKind::KpiMonth).len(), 1);
        assert!(!store.has_no_valid_data());
    }

    #[test]
    fn test_default_locations() {
        let none: [&str; 0] = [];
        assert_eq!(sources_for(&none).len(), 3);
        assert_eq!(
            sources_for(&["https://example.org/data/"])[0].describe(),
            "https://example.org/data"
        );
    }
}
