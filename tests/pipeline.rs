use rail_punctuality::aggregate::{aggregate, by_month};
use rail_punctuality::decoder::{is_pointer_file, parse_csv};
use rail_punctuality::filters::{FilterState, Filters};
use rail_punctuality::loader::load_store;
use rail_punctuality::manifest::ManifestConfig;
use rail_punctuality::metrics::MetricMode;
use rail_punctuality::pipeline::{apply_filters, DataStatus, DataStore, RenderOptions};
use rail_punctuality::reports::{city_leaderboard, HistogramMode};
use rail_punctuality::sources::{FsSource, Source};
use rail_punctuality::state::AppState;
use rail_punctuality::stations::{CapoluogoSet, StationDirectory};
use rail_punctuality::types::{Dataset, Datasets, Row, TableKind};
use std::fs;
use std::path::Path;

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn rows(kind: TableKind, csv: &str) -> Vec<Row> {
    Dataset::from_raw(kind, &parse_csv(csv)).rows
}

#[test]
fn test_aggregation_is_idempotent_and_sums_before_ratio() {
    let rows = rows(
        TableKind::KpiMonth,
        "mese,corse_osservate,in_ritardo\n2023-01,10,5\n2023-01,20,0\n",
    );
    let first = aggregate(&rows, by_month);
    let second = aggregate(&rows, by_month);
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert!((first[0].pct_ritardo - 5.0 / 30.0 * 100.0).abs() < 1e-9);
}

#[test]
fn test_zero_runs_give_zero_percent() {
    let rows = rows(TableKind::KpiMonth, "mese,corse_osservate,in_ritardo\n2023-01,0,3\n");
    let b = aggregate(&rows, by_month);
    assert_eq!(b[0].pct_ritardo, 0.0);
}

#[test]
fn test_blank_day_type_passes_any_selection() {
    let rows = rows(
        TableKind::KpiDetail,
        "giorno,categoria,tipo_giorno,fascia_oraria,corse_osservate\n2023-01-01,REG,,sera,4\n",
    );
    let dir = StationDirectory::default();
    for enabled in [vec![], vec!["feriale"], vec!["sabato", "festivo"]] {
        let f = Filters::build(&FilterState::default().with_day_types(&enabled), &dir);
        assert!(f.matches(&rows[0]), "enabled = {:?}", enabled);
    }
}

#[test]
fn test_origin_filter_matches_alias_codes() {
    let stations =
        parse_csv("cod_stazione,nome_stazione\nS1,Milano Centrale\nS2,Milano Centrale\n");
    let datasets = Datasets::new().with(Dataset::from_raw(
        TableKind::OdMonthCategory,
        &parse_csv(
            "mese,categoria,cod_partenza,cod_arrivo,corse_osservate,in_ritardo\n\
             2023-01,REG,S1,S9,10,1\n\
             2023-01,REG,S2,S9,30,3\n\
             2023-01,REG,S9,S1,99,9\n",
        ),
    ));
    let store = DataStore::build(
        ManifestConfig::default(),
        datasets,
        &stations,
        CapoluogoSet::default(),
    );
    let rep = store.directory.canonical_code("S2");
    for code in ["S1", "S2", rep.as_str()] {
        let state = FilterState::default().with_origin(Some(code));
        let m = apply_filters(&store, &state, MetricMode::Total, &RenderOptions::default());
        assert_eq!(m.kpis.corse_osservate, 40.0, "origin = {code}");
    }
}

#[test]
fn test_month_range_order_does_not_matter() {
    let datasets = Datasets::new().with(Dataset::from_raw(
        TableKind::KpiMonthCategory,
        &parse_csv(
            "mese,categoria,corse_osservate\n\
             2022-12,REG,1\n2023-01,REG,2\n2023-06,REG,4\n2023-07,REG,8\n",
        ),
    ));
    let store = DataStore::build(ManifestConfig::default(), datasets, &[], CapoluogoSet::default());
    let opts = RenderOptions::default();
    let a = apply_filters(
        &store,
        &FilterState::default().with_months(Some("2023-06"), Some("2023-01")),
        MetricMode::Total,
        &opts,
    );
    let b = apply_filters(
        &store,
        &FilterState::default().with_months(Some("2023-01"), Some("2023-06")),
        MetricMode::Total,
        &opts,
    );
    assert_eq!(a, b);
    assert_eq!(a.kpis.corse_osservate, 6.0);
}

#[test]
fn test_delimiter_detection() {
    assert_eq!(parse_csv("a;b;c\n1;2;3\n")[0].len(), 3);
    assert_eq!(parse_csv("a,b,c\n1,2,3\n")[0].get("c"), Some("3"));
    let tabbed = parse_csv("a\tb\tc,d\n1\t2\t3,4\n");
    assert_eq!(tabbed[0].len(), 3);
    assert_eq!(tabbed[0].get("c,d"), Some("3,4"));
}

#[test]
fn test_pointer_file_detection() {
    assert!(is_pointer_file(
        "version https://git-lfs.github.com/spec/v1\noid sha256:0000\nsize 12\n"
    ));
    assert!(!is_pointer_file("mese,corse_osservate\n2023-01,1\n"));
}

#[tokio::test]
async fn test_pointer_file_falls_back_to_next_source() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    write(
        first.path(),
        "kpi_mese_categoria.csv",
        "version https://git-lfs.github.com/spec/v1\noid sha256:0000\nsize 12\n",
    );
    write(
        second.path(),
        "kpi_mese_categoria.csv",
        "mese,categoria,corse_osservate,in_ritardo\n2023-01,REG,100,20\n",
    );
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(FsSource::new(first.path())),
        Box::new(FsSource::new(second.path())),
    ];
    let (store, report) = load_store(&sources).await;
    assert_eq!(store.datasets.rows(TableKind::KpiMonthCategory).len(), 1);
    let load = report
        .tables
        .iter()
        .find(|t| t.file == "kpi_mese_categoria.csv")
        .unwrap();
    assert!(load.location.as_deref().unwrap().starts_with(&second.path().display().to_string()));
}

#[tokio::test]
async fn test_end_to_end_kpis_and_monthly_series() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "manifest.json",
        concat!(
            r#"{"built_at_utc":"2024-03-01T10:00:00Z","#,
            r#""gold_files":["kpi_mese_categoria.csv"],"delay_bucket_labels":["0-4","5+"]}"#,
        ),
    );
    write(
        dir.path(),
        "kpi_mese_categoria.csv",
        "mese,categoria,corse_osservate,in_ritardo\n2023-01,REG,100,20\n2023-02,REG,50,30\n",
    );
    let sources: Vec<Box<dyn Source>> = vec![Box::new(FsSource::new(dir.path()))];
    let (store, report) = load_store(&sources).await;
    assert!(report.manifest_location.is_some());
    assert_eq!(store.manifest.delay_bucket_labels, vec!["0-4", "5+"]);

    let app = AppState::new(store);
    let m = app.render();
    assert_eq!(m.status, DataStatus::Ok);
    assert_eq!(m.kpis.corse_osservate, 150.0);
    assert_eq!(m.kpis.in_ritardo, 50.0);
    let periods: Vec<&str> = m.monthly.iter().map(|p| p.period.as_str()).collect();
    let values: Vec<f64> = m.monthly.iter().map(|p| p.value).collect();
    assert_eq!(periods, vec!["2023-01", "2023-02"]);
    assert_eq!(values, vec![20.0, 60.0]);
    assert_eq!(m.histogram.len(), 2);
}

#[test]
fn test_capital_set_excludes_non_capitals_only_when_non_empty() {
    let stations = parse_csv(
        "cod_stazione,nome_stazione,citta\nBG,Bergamo,Bergamo\nMI,Milano Centrale,Milano\n",
    );
    let rows = rows(
        TableKind::StationsMonthNode,
        "mese,categoria,cod_stazione,corse_osservate,in_ritardo\n\
         2023-01,REG,BG,100,10\n2023-01,REG,MI,100,20\n",
    );
    let refs: Vec<&Row> = rows.iter().collect();

    let caps = CapoluogoSet::from_names(["milano"]);
    let with_caps = StationDirectory::build(&stations, caps, Vec::new());
    let lb = city_leaderboard(&refs, &with_caps, MetricMode::PctLate, 0.0, 10);
    assert!(lb.iter().all(|e| e.key != "bergamo"));
    assert_eq!(lb.len(), 1);

    let open = StationDirectory::build(&stations, CapoluogoSet::default(), Vec::new());
    let lb = city_leaderboard(&refs, &open, MetricMode::PctLate, 0.0, 10);
    assert!(lb.iter().any(|e| e.key == "bergamo"));
}

#[test]
fn test_histogram_percent_per_station_role() {
    let datasets = Datasets::new()
        .with(Dataset::from_raw(
            TableKind::KpiMonthCategory,
            &parse_csv("mese,categoria,corse_osservate\n2023-01,REG,10\n"),
        ))
        .with(Dataset::from_raw(
            TableKind::HistStationRole,
            &parse_csv(
                "mese,categoria,cod_stazione,ruolo,bucket_ritardo_arrivo,count\n\
                 2023-01,REG,S1,partenza,0-4,30\n\
                 2023-01,REG,S1,partenza,5-9,10\n\
                 2023-01,REG,S1,arrivo,60+,99\n",
            ),
        ));
    let store = DataStore::build(ManifestConfig::default(), datasets, &[], CapoluogoSet::default());
    let opts = RenderOptions {
        histogram_mode: HistogramMode::Percent,
        ..Default::default()
    };
    let m = apply_filters(
        &store,
        &FilterState::default().with_origin(Some("S1")),
        MetricMode::PctLate,
        &opts,
    );
    assert_eq!(m.histogram[0].value, 75.0);
    assert_eq!(m.histogram[1].value, 25.0);
    assert_eq!(m.histogram[5].value, 0.0);

    let both = FilterState::default().with_origin(Some("S1")).with_destination(Some("S2"));
    let m = apply_filters(&store, &both, MetricMode::PctLate, &opts);
    assert!(m.histogram.iter().all(|b| b.count == 0.0));
}
