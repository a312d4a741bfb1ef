//! Build manifest shipped next to the gold tables.
//!
//! Several schema versions exist in the wild; [`Manifest`] accepts all of
//! them and [`Manifest::resolve`] folds them into one [`ManifestConfig`]
//! with hardcoded defaults for anything missing.

use crate::types::TableKind;
use crate::util::format_number;
use chrono::{DateTime, FixedOffset, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BUCKET_LABELS: [&str; 6] = ["0-4", "5-9", "10-14", "15-29", "30-59", "60+"];
pub const DEFAULT_ON_TIME_THRESHOLD: f64 = 5.0;
pub const DEFAULT_LEADERBOARD_MIN_TRAINS: f64 = 20.0;

static DEFAULT_CONFIG: Lazy<ManifestConfig> = Lazy::new(|| ManifestConfig {
    built_at_utc: None,
    gold_files: TableKind::ALL.iter().map(|k| k.file_name().to_string()).collect(),
    delay_bucket_labels: DEFAULT_BUCKET_LABELS.iter().map(|s| s.to_string()).collect(),
    on_time_threshold_minutes: DEFAULT_ON_TIME_THRESHOLD,
    leaderboard_min_trains: DEFAULT_LEADERBOARD_MIN_TRAINS,
});

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    pub built_at_utc: Option<String>,
    pub gold_files: Option<Vec<String>>,
    pub delay_bucket_labels: Option<Vec<String>>,
    pub delay_buckets_minutes: Option<DelayBuckets>,
    pub punctuality: Option<Punctuality>,
    pub min_counts: Option<MinCounts>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelayBuckets {
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Punctuality {
    pub on_time_threshold_minutes: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MinCounts {
    pub leaderboard_min_trains: Option<f64>,
}

/// Manifest with every field resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestConfig {
    pub built_at_utc: Option<String>,
    pub gold_files: Vec<String>,
    pub delay_bucket_labels: Vec<String>,
    pub on_time_threshold_minutes: f64,
    pub leaderboard_min_trains: f64,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.clone()
    }
}

fn non_empty(list: Option<Vec<String>>) -> Option<Vec<String>> {
    list.map(|l| {
        l.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    })
    .filter(|l| !l.is_empty())
}

impl Manifest {
    pub fn from_json(text: &str) -> serde_json::Result<Manifest> {
        serde_json::from_str(text)
    }

    pub fn resolve(self) -> ManifestConfig {
        let defaults = ManifestConfig::default();
        let labels = non_empty(self.delay_bucket_labels)
            .or_else(|| non_empty(self.delay_buckets_minutes.and_then(|b| b.labels)))
            .unwrap_or(defaults.delay_bucket_labels);
        let threshold = self
            .punctuality
            .and_then(|p| p.on_time_threshold_minutes)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(defaults.on_time_threshold_minutes);
        let min_trains = self
            .min_counts
            .and_then(|m| m.leaderboard_min_trains)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(defaults.leaderboard_min_trains);
        ManifestConfig {
            built_at_utc: self
                .built_at_utc
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            gold_files: non_empty(self.gold_files).unwrap_or(defaults.gold_files),
            delay_bucket_labels: labels,
            on_time_threshold_minutes: threshold,
            leaderboard_min_trains: min_trains,
        }
    }
}

impl ManifestConfig {
    /// Build timestamp, when present and RFC 3339.
    pub fn built_at(&self) -> Option<DateTime<FixedOffset>> {
        self.built_at_utc
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    }

    /// Build stamp for display. An RFC 3339 timestamp is shown in UTC, any
    /// other non-empty value verbatim.
    pub fn build_stamp(&self) -> Option<String> {
        match self.built_at() {
            Some(t) => Some(t.with_timezone(&Utc).format("%Y-%m-%d %H:%M UTC").to_string()),
            None => self.built_at_utc.clone(),
        }
    }

    /// What "on time" means under this build's threshold.
    pub fn threshold_note(&self) -> String {
        format!(
            "In orario significa ritardo arrivo tra 0 e {} minuti. Anticipo è ritardo negativo.",
            format_number(self.on_time_threshold_minutes, 0)
        )
    }

    /// Gold tables listed by the manifest that this crate understands,
    /// followed by the known tables the manifest did not mention.
    pub fn table_kinds(&self) -> Vec<TableKind> {
        let mut kinds: Vec<TableKind> = self
            .gold_files
            .iter()
            .filter_map(|f| TableKind::from_file_name(f))
            .collect();
        for k in TableKind::ALL {
            if !kinds.contains(&k) {
                kinds.push(k);
            }
        }
        kinds
    }
}
