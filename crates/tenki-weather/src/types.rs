use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage format for fetch timestamps (second resolution).
pub const FETCHED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage and display format for calendar days.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Level of a region in the two-level hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Center,
    Office,
}

impl RegionKind {
    /// Value stored in the `area_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Office => "office",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "center" => Some(Self::Center),
            "office" => Some(Self::Office),
            _ => None,
        }
    }
}

/// A named forecast area, either a top-level center or a child office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub code: String,
    pub name: String,
    pub kind: RegionKind,
    pub parent_code: Option<String>,
}

/// Weather for a single calendar day, merged from every time series that
/// mentions that day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: String,
    pub weather_text: Option<String>,
    pub temp_min: Option<String>,
    pub temp_max: Option<String>,
}

impl DailyForecast {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            ..Self::default()
        }
    }
}

/// Parsed forecast keyed by calendar day; iteration order is ascending.
pub type ForecastDays = BTreeMap<String, DailyForecast>;

/// A persisted forecast row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub region_code: String,
    pub region_name: String,
    pub date: String,
    pub weather_text: Option<String>,
    pub temp_min: Option<String>,
    pub temp_max: Option<String>,
    pub fetched_at: NaiveDateTime,
}

/// A single row that could not be written during `save_forecasts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWrite {
    pub date: String,
    pub reason: String,
}

/// Outcome of a batch write; row failures do not abort the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: usize,
    pub failed: Vec<FailedWrite>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Display-ready forecast for one region, read back from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub region_code: String,
    pub region_name: String,
    /// Set when the snapshot was selected from history by fetch day
    pub fetched_on: Option<NaiveDate>,
    pub records: Vec<ForecastRecord>,
}

impl ForecastSnapshot {
    /// Build a snapshot holding at most `display_days` records, earliest first.
    pub fn new(
        region_code: impl Into<String>,
        region_name: impl Into<String>,
        mut records: Vec<ForecastRecord>,
        display_days: usize,
    ) -> Self {
        records.sort_by(|a, b| a.date.cmp(&b.date));
        records.truncate(display_days);
        Self {
            region_code: region_code.into(),
            region_name: region_name.into(),
            fetched_on: None,
            records,
        }
    }

    pub fn with_fetch_day(mut self, day: NaiveDate) -> Self {
        self.fetched_on = Some(day);
        self
    }

    /// Most recent fetch timestamp among the records
    pub fn fetched_at(&self) -> Option<NaiveDateTime> {
        self.records.iter().map(|r| r.fetched_at).max()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of a region selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForecastOutcome {
    /// Freshly fetched and confirmed by the store
    Live(ForecastSnapshot),
    /// Live fetch failed; serving the most recent stored snapshot
    Cached {
        snapshot: ForecastSnapshot,
        reason: String,
    },
}

impl ForecastOutcome {
    pub fn snapshot(&self) -> &ForecastSnapshot {
        match self {
            Self::Live(snapshot) => snapshot,
            Self::Cached { snapshot, .. } => snapshot,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }
}
