use crate::metrics::MetricMode;
use crate::pipeline::RenderModel;
use crate::reports::{HistogramMode, LeaderboardEntry};
use crate::types::{HistogramRow, KpiRow, LeaderboardRow, MapPointRow, SeriesRow};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("\n{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    preview_table_rows(rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(nessun dato)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Every table of a render model in printable form.
pub struct ReportTables {
    pub kpi: Vec<KpiRow>,
    pub monthly: Vec<SeriesRow>,
    pub daily: Vec<SeriesRow>,
    pub histogram: Vec<HistogramRow>,
    pub stations: Vec<LeaderboardRow>,
    pub cities: Vec<LeaderboardRow>,
    pub od_pairs: Vec<LeaderboardRow>,
    pub map: Vec<MapPointRow>,
}

impl ReportTables {
    pub fn from_model(model: &RenderModel, histogram_mode: HistogramMode) -> Self {
        let metric: MetricMode = model.metric;
        let ranked = |entries: &[LeaderboardEntry]| -> Vec<LeaderboardRow> {
            entries
                .iter()
                .enumerate()
                .map(|(i, e)| e.to_row(i + 1, metric))
                .collect()
        };
        ReportTables {
            kpi: vec![model.kpis.to_row()],
            monthly: model.monthly.iter().map(|p| p.to_row(metric)).collect(),
            daily: model.daily.iter().map(|p| p.to_row(metric)).collect(),
            histogram: model.histogram.iter().map(|b| b.to_row(histogram_mode)).collect(),
            stations: ranked(model.stations.as_slice()),
            cities: ranked(model.cities.as_slice()),
            od_pairs: ranked(model.od_pairs.as_slice()),
            map: model.map.points.iter().map(|p| p.to_row(metric)).collect(),
        }
    }

    /// Write one CSV per table into `dir`; returns the paths written.
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let mut written = Vec::new();
        let mut put = |name: &str, f: &dyn Fn(&Path) -> Result<()>| -> Result<()> {
            let path = dir.join(name);
            f(path.as_path())?;
            written.push(path);
            Ok(())
        };
        put("kpi.csv", &|p| write_csv(p, &self.kpi))?;
        put("serie_mensile.csv", &|p| write_csv(p, &self.monthly))?;
        put("serie_giornaliera.csv", &|p| write_csv(p, &self.daily))?;
        put("istogramma_ritardi.csv", &|p| write_csv(p, &self.histogram))?;
        put("classifica_stazioni.csv", &|p| write_csv(p, &self.stations))?;
        put("classifica_capoluoghi.csv", &|p| write_csv(p, &self.cities))?;
        put("classifica_tratte.csv", &|p| write_csv(p, &self.od_pairs))?;
        put("mappa_capoluoghi.csv", &|p| write_csv(p, &self.map))?;
        info!(files = written.len(), dir = %dir.display(), "reports exported");
        Ok(written)
    }
}
