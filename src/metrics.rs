//! Metric selection: the one place where "what number do we plot" lives.

use crate::types::Counters;
use crate::util::pct;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metric a visual plots or ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MetricMode {
    /// Share of observed runs that arrived late, in percent.
    #[default]
    #[serde(rename = "pct_ritardo")]
    PctLate,
    #[serde(rename = "in_ritardo")]
    Late,
    #[serde(rename = "corse_osservate")]
    Total,
    #[serde(rename = "minuti_ritardo_tot")]
    Minutes,
    #[serde(rename = "soppresse")]
    Suppressed,
    #[serde(rename = "cancellate")]
    Cancelled,
}

impl MetricMode {
    pub const ALL: [MetricMode; 6] = [
        MetricMode::PctLate,
        MetricMode::Late,
        MetricMode::Total,
        MetricMode::Minutes,
        MetricMode::Suppressed,
        MetricMode::Cancelled,
    ];

    /// Column-style identifier, as used by the dashboard selectors.
    pub fn id(self) -> &'static str {
        match self {
            MetricMode::PctLate => "pct_ritardo",
            MetricMode::Late => "in_ritardo",
            MetricMode::Total => "corse_osservate",
            MetricMode::Minutes => "minuti_ritardo_tot",
            MetricMode::Suppressed => "soppresse",
            MetricMode::Cancelled => "cancellate",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricMode::PctLate => "% in ritardo",
            MetricMode::Late => "Treni in ritardo",
            MetricMode::Total => "Treni osservati",
            MetricMode::Minutes => "Minuti di ritardo",
            MetricMode::Suppressed => "Soppressi",
            MetricMode::Cancelled => "Cancellati",
        }
    }

    pub fn is_percentage(self) -> bool {
        self == MetricMode::PctLate
    }

    /// Value of this metric for a set of summed counters.
    pub fn value_of(self, c: &Counters) -> f64 {
        compute_value(
            self,
            c.corse_osservate,
            c.in_ritardo,
            c.minuti_ritardo_tot,
            c.soppresse,
            c.cancellate,
        )
    }
}

/// Maps a metric and a row's raw counters to the scalar that gets plotted.
///
/// Percentage-late is `0.0` when `corse` is zero.
pub fn compute_value(
    mode: MetricMode,
    corse: f64,
    ritardo: f64,
    minuti: f64,
    soppresse: f64,
    cancellate: f64,
) -> f64 {
    match mode {
        MetricMode::PctLate => pct(ritardo, corse),
        MetricMode::Late => ritardo,
        MetricMode::Total => corse,
        MetricMode::Minutes => minuti,
        MetricMode::Suppressed => soppresse,
        MetricMode::Cancelled => cancellate,
    }
}

impl fmt::Display for MetricMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for MetricMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        MetricMode::ALL
            .into_iter()
            .find(|m| m.id() == key)
            .or(match key.as_str() {
                "pct" | "percent" | "percentage" => Some(MetricMode::PctLate),
                "late" => Some(MetricMode::Late),
                "total" | "corse" => Some(MetricMode::Total),
                "minutes" | "minuti" => Some(MetricMode::Minutes),
                "suppressed" => Some(MetricMode::Suppressed),
                "cancelled" | "cancellate_tot" => Some(MetricMode::Cancelled),
                _ => None,
            })
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}
