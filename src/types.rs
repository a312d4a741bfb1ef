use crate::decoder::RawRow;
use crate::metrics::MetricMode;
use crate::util::{coerce_counter, month_of};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tabled::Tabled;

/// Column-name candidates consulted, in order, when ingesting rows.
pub mod columns {
    pub const DAY: &[&str] = &["giorno", "data", "day"];
    pub const MONTH: &[&str] = &["mese", "month"];
    pub const CATEGORY: &[&str] = &["categoria", "category", "cat"];
    pub const ORIGIN: &[&str] = &["cod_partenza", "partenza", "origin"];
    pub const DESTINATION: &[&str] = &["cod_arrivo", "arrivo", "destination"];
    pub const STATION: &[&str] = &["cod_stazione", "codice", "cod", "code"];
    pub const STATION_NAME: &[&str] = &["nome_stazione", "nome_norm", "nome", "name"];
    pub const CITY: &[&str] = &["citta", "comune", "city", "nome_comune", "municipality"];
    pub const LAT: &[&str] = &["lat", "latitude", "latitudine"];
    pub const LON: &[&str] = &["lon", "lng", "longitude", "longitudine"];
    pub const ROLE: &[&str] = &["ruolo", "role"];
    pub const DAY_TYPE: &[&str] = &["tipo_giorno", "day_type"];
    pub const TIME_SLOT: &[&str] = &["fascia_oraria", "time_slot"];
    pub const BUCKET: &[&str] = &["bucket_ritardo_arrivo", "bucket"];
    pub const CAPITAL: &[&str] = &["citta", "capoluogo", "nome", "comune", "city"];
    pub const CANCELLED: &[&str] = &["cancellate", "cancellate_tot"];
}

macro_rules! counters {
    ($($field:ident),* $(,)?) => {
        /// Summable counters carried by every gold table row.
        ///
        /// All values are non-negative; unparseable cells are zero.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
        pub struct Counters {
            $(pub $field: f64,)*
            /// `cancellate`, or `cancellate_tot` in older exports.
            pub cancellate: f64,
            /// Histogram tables only: number of runs in the bucket.
            pub count: f64,
        }

        impl Counters {
            pub fn from_raw(raw: &RawRow) -> Self {
                Self {
                    $($field: coerce_counter(raw.get(stringify!($field))),)*
                    cancellate: coerce_counter(raw.pick(columns::CANCELLED)),
                    count: coerce_counter(raw.get("count")),
                }
            }

            /// Adds every counter of `other` into `self`.
            pub fn add(&mut self, other: &Counters) {
                $(self.$field += other.$field;)*
                self.cancellate += other.cancellate;
                self.count += other.count;
            }
        }
    };
}

counters!(
    corse_osservate,
    effettuate,
    soppresse,
    parzialmente_cancellate,
    info_mancante,
    in_orario,
    in_ritardo,
    in_anticipo,
    oltre_5,
    oltre_10,
    oltre_15,
    oltre_30,
    oltre_60,
    minuti_ritardo_tot,
    minuti_anticipo_tot,
);

impl Counters {
    /// `in_ritardo / corse_osservate * 100`, zero when nothing was observed.
    pub fn pct_ritardo(&self) -> f64 {
        MetricMode::PctLate.value_of(self)
    }
}

/// Station role in per-station tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Partenza,
    Arrivo,
    Nodo,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "partenza" | "origine" | "origin" | "departure" => Some(Role::Partenza),
            "arrivo" | "destinazione" | "destination" | "arrival" => Some(Role::Arrivo),
            "nodo" | "node" => Some(Role::Nodo),
            _ => None,
        }
    }
}

/// A typed gold-table row. Which dimension fields are set depends on the
/// table it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// `YYYY-MM` for monthly grains, `YYYY-MM-DD` for daily ones.
    pub period: String,
    pub categoria: Option<String>,
    pub cod_partenza: Option<String>,
    pub cod_arrivo: Option<String>,
    pub cod_stazione: Option<String>,
    pub nome_stazione: Option<String>,
    pub ruolo: Option<Role>,
    pub tipo_giorno: Option<String>,
    pub fascia_oraria: Option<String>,
    pub bucket: Option<String>,
    pub counters: Counters,
}

fn owned(v: Option<&str>) -> Option<String> {
    v.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Row {
    pub fn from_raw(raw: &RawRow) -> Self {
        let period = raw
            .pick(columns::DAY)
            .or_else(|| raw.pick(columns::MONTH))
            .unwrap_or("")
            .to_string();
        Row {
            period,
            categoria: owned(raw.pick(columns::CATEGORY)),
            cod_partenza: owned(raw.pick(columns::ORIGIN)),
            cod_arrivo: owned(raw.pick(columns::DESTINATION)),
            cod_stazione: owned(raw.pick(columns::STATION)),
            nome_stazione: owned(raw.pick(columns::STATION_NAME)),
            ruolo: raw.pick(columns::ROLE).and_then(Role::parse),
            tipo_giorno: owned(raw.pick(columns::DAY_TYPE)),
            fascia_oraria: owned(raw.pick(columns::TIME_SLOT)),
            bucket: owned(raw.pick(columns::BUCKET)),
            counters: Counters::from_raw(raw),
        }
    }

    /// Month of the row, truncated from a day label when needed.
    pub fn month(&self) -> &str {
        month_of(&self.period)
    }

    pub fn year(&self) -> &str {
        let p = self.period.trim();
        p.get(..4).unwrap_or(p)
    }

    /// `true` when the row is at day resolution.
    pub fn is_daily(&self) -> bool {
        self.period.trim().len() == 10
    }
}

/// Every gold table the dashboard knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TableKind {
    KpiMonth,
    KpiMonthCategory,
    KpiDay,
    KpiDayCategory,
    KpiDetail,
    OdMonthCategory,
    OdDayCategory,
    OdDetail,
    StationsMonthNode,
    HistMonthCategory,
    HistStationRole,
}

impl TableKind {
    pub const ALL: [TableKind; 11] = [
        TableKind::KpiMonth,
        TableKind::KpiMonthCategory,
        TableKind::KpiDay,
        TableKind::KpiDayCategory,
        TableKind::KpiDetail,
        TableKind::OdMonthCategory,
        TableKind::OdDayCategory,
        TableKind::OdDetail,
        TableKind::StationsMonthNode,
        TableKind::HistMonthCategory,
        TableKind::HistStationRole,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            TableKind::KpiMonth => "kpi_mese.csv",
            TableKind::KpiMonthCategory => "kpi_mese_categoria.csv",
            TableKind::KpiDay => "kpi_giorno.csv",
            TableKind::KpiDayCategory => "kpi_giorno_categoria.csv",
            TableKind::KpiDetail => "kpi_giorno_categoria_segmenti.csv",
            TableKind::OdMonthCategory => "od_mese_categoria.csv",
            TableKind::OdDayCategory => "od_giorno_categoria.csv",
            TableKind::OdDetail => "od_giorno_categoria_segmenti.csv",
            TableKind::StationsMonthNode => "stazioni_mese_categoria_nodo.csv",
            TableKind::HistMonthCategory => "hist_mese_categoria.csv",
            TableKind::HistStationRole => "hist_stazioni_mese_categoria_ruolo.csv",
        }
    }

    pub fn from_file_name(name: &str) -> Option<TableKind> {
        let base = name.rsplit('/').next().unwrap_or(name);
        Self::ALL.into_iter().find(|k| k.file_name() == base)
    }

    /// Rows carry a `categoria` column.
    pub fn has_category(self) -> bool {
        !matches!(self, TableKind::KpiMonth | TableKind::KpiDay)
    }

    /// Rows carry both trip endpoints.
    pub fn has_endpoints(self) -> bool {
        matches!(
            self,
            TableKind::OdMonthCategory | TableKind::OdDayCategory | TableKind::OdDetail
        )
    }

    /// Rows carry `tipo_giorno` / `fascia_oraria`.
    pub fn is_segmented(self) -> bool {
        matches!(self, TableKind::KpiDetail | TableKind::OdDetail)
    }

    pub fn is_daily(self) -> bool {
        matches!(
            self,
            TableKind::KpiDay
                | TableKind::KpiDayCategory
                | TableKind::KpiDetail
                | TableKind::OdDayCategory
                | TableKind::OdDetail
        )
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A decoded gold table.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub kind: TableKind,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn empty(kind: TableKind) -> Self {
        Self { kind, rows: Vec::new() }
    }

    pub fn from_raw(kind: TableKind, raw: &[RawRow]) -> Self {
        Self {
            kind,
            rows: raw.iter().map(Row::from_raw).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Every loaded gold table. Missing tables read as empty.
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    tables: BTreeMap<TableKind, Dataset>,
}

impl Datasets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dataset: Dataset) {
        self.tables.insert(dataset.kind, dataset);
    }

    pub fn with(mut self, dataset: Dataset) -> Self {
        self.insert(dataset);
        self
    }

    pub fn rows(&self, kind: TableKind) -> &[Row] {
        self.tables.get(&kind).map(|d| d.rows.as_slice()).unwrap_or(&[])
    }

    pub fn is_empty_table(&self, kind: TableKind) -> bool {
        self.rows(kind).is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.tables.values()
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiRow {
    #[serde(rename = "Treni")]
    #[tabled(rename = "Treni")]
    pub total: String,
    #[serde(rename = "InRitardo")]
    #[tabled(rename = "In ritardo")]
    pub late: String,
    #[serde(rename = "PctRitardo")]
    #[tabled(rename = "% ritardo")]
    pub pct_late: String,
    #[serde(rename = "MinutiRitardo")]
    #[tabled(rename = "Minuti ritardo")]
    pub minutes: String,
    #[serde(rename = "Cancellati")]
    #[tabled(rename = "Cancellati")]
    pub cancelled: String,
    #[serde(rename = "Soppressi")]
    #[tabled(rename = "Soppressi")]
    pub suppressed: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct LeaderboardRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "#")]
    pub rank: usize,
    #[serde(rename = "Nome")]
    #[tabled(rename = "Nome")]
    pub name: String,
    #[serde(rename = "Codice")]
    #[tabled(rename = "Codice")]
    pub key: String,
    #[serde(rename = "Treni")]
    #[tabled(rename = "Treni")]
    pub total: String,
    #[serde(rename = "InRitardo")]
    #[tabled(rename = "In ritardo")]
    pub late: String,
    #[serde(rename = "PctRitardo")]
    #[tabled(rename = "% ritardo")]
    pub pct_late: String,
    #[serde(rename = "MinutiRitardo")]
    #[tabled(rename = "Minuti ritardo")]
    pub minutes: String,
    #[serde(rename = "Cancellati")]
    #[tabled(rename = "Cancellati")]
    pub cancelled: String,
    #[serde(rename = "Soppressi")]
    #[tabled(rename = "Soppressi")]
    pub suppressed: String,
    #[serde(rename = "Valore")]
    #[tabled(rename = "Valore")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SeriesRow {
    #[serde(rename = "Periodo")]
    #[tabled(rename = "Periodo")]
    pub period: String,
    #[serde(rename = "Valore")]
    #[tabled(rename = "Valore")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MapPointRow {
    #[serde(rename = "Citta")]
    #[tabled(rename = "Città")]
    pub name: String,
    #[serde(rename = "Lat")]
    #[tabled(rename = "Lat")]
    pub lat: String,
    #[serde(rename = "Lon")]
    #[tabled(rename = "Lon")]
    pub lon: String,
    #[serde(rename = "Valore")]
    #[tabled(rename = "Valore")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct HistogramRow {
    #[serde(rename = "Ritardo")]
    #[tabled(rename = "Ritardo (min)")]
    pub label: String,
    #[serde(rename = "Treni")]
    #[tabled(rename = "Treni")]
    pub count: String,
    #[serde(rename = "Valore")]
    #[tabled(rename = "Valore")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct StationOptionRow {
    #[serde(rename = "Codice")]
    #[tabled(rename = "Codice")]
    pub code: String,
    #[serde(rename = "Nome")]
    #[tabled(rename = "Nome")]
    pub name: String,
    #[serde(rename = "Alias")]
    #[tabled(rename = "Alias")]
    pub aliases: String,
}
