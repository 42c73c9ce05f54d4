//! Normalizes a forecast document into one record per calendar day.
//!
//! A document is a list of forecast items (short-range first, then weekly),
//! each holding time series blocks. Every block has a `timeDefines` list and
//! an `areas` list whose first entry belongs to the requested region. The
//! field groups found on that entry are index-aligned with `timeDefines`:
//!
//! - `weathers`: weather text per timestamp
//! - `temps`: short-range temperatures, folded into a running min/max per day
//! - `tempsMin` / `tempsMax`: weekly temperatures, assigned directly
//!
//! Blocks are applied in document order. A later non-empty value replaces an
//! earlier one; an empty value never erases a filled field.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{DailyForecast, ForecastDays};

/// Raw forecast response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ForecastDocument {
    pub items: Vec<ForecastItem>,
}

impl ForecastDocument {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastItem {
    #[serde(rename = "timeSeries", default)]
    pub time_series: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeSeries {
    #[serde(rename = "timeDefines", default)]
    pub time_defines: Vec<String>,
    #[serde(default)]
    pub areas: Vec<AreaSeries>,
}

/// Series values are kept as raw JSON so a stray number, null or nested
/// value never fails the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaSeries {
    #[serde(default)]
    pub weathers: Vec<Value>,
    #[serde(default)]
    pub temps: Vec<Value>,
    #[serde(rename = "tempsMin", default)]
    pub temps_min: Vec<Value>,
    #[serde(rename = "tempsMax", default)]
    pub temps_max: Vec<Value>,
}

/// Calendar-day portion of an ISO timestamp
pub fn day_key(time_define: &str) -> &str {
    match time_define.char_indices().nth(10) {
        Some((idx, _)) => &time_define[..idx],
        None => time_define,
    }
}

/// Non-empty text of a series cell
fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn numeric(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn day_entry<'a>(days: &'a mut ForecastDays, time_define: &str) -> &'a mut DailyForecast {
    let key = day_key(time_define);
    days.entry(key.to_string())
        .or_insert_with(|| DailyForecast::new(key))
}

/// Parse a forecast document into per-day records.
///
/// Never fails: malformed cells are skipped. An empty map means the document
/// carried no usable series.
pub fn parse_forecast(document: &ForecastDocument) -> ForecastDays {
    let mut days = ForecastDays::new();

    for series in document.items.iter().flat_map(|item| &item.time_series) {
        let Some(area) = series.areas.first() else {
            continue;
        };
        let time_defines = &series.time_defines;

        if !area.weathers.is_empty() {
            for (i, time_define) in time_defines.iter().enumerate() {
                let entry = day_entry(&mut days, time_define);
                if let Some(text) = cell_text(area.weathers.get(i)) {
                    entry.weather_text = Some(text);
                }
            }
        }

        if !area.temps.is_empty() {
            for (i, time_define) in time_defines.iter().enumerate() {
                let Some(text) = cell_text(area.temps.get(i)) else {
                    continue;
                };
                let Some(value) = numeric(&text) else {
                    tracing::debug!(time_define = %time_define, value = %text, "Skipping non-numeric temperature");
                    continue;
                };
                let entry = day_entry(&mut days, time_define);
                fold_temperature(entry, &text, value);
            }
        }

        if !area.temps_min.is_empty() || !area.temps_max.is_empty() {
            for (i, time_define) in time_defines.iter().enumerate() {
                let entry = day_entry(&mut days, time_define);
                if let Some(text) = cell_text(area.temps_min.get(i)) {
                    entry.temp_min = Some(text);
                }
                if let Some(text) = cell_text(area.temps_max.get(i)) {
                    entry.temp_max = Some(text);
                }
            }
        }
    }

    days
}

/// Running min/max for short-range temperatures. A current value that is
/// not numeric is replaced.
fn fold_temperature(entry: &mut DailyForecast, text: &str, value: f64) {
    let below_min = entry
        .temp_min
        .as_deref()
        .and_then(numeric)
        .map_or(true, |min| value < min);
    if below_min {
        entry.temp_min = Some(text.to_string());
    }

    let above_max = entry
        .temp_max
        .as_deref()
        .and_then(numeric)
        .map_or(true, |max| value > max);
    if above_max {
        entry.temp_max = Some(text.to_string());
    }
}
