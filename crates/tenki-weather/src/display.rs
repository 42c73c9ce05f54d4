//! Display-ready forecast cards. Plain data; rendering is up to the caller.

use serde::{Deserialize, Serialize};

use crate::types::ForecastRecord;

const SUMMARY_MAX_CHARS: usize = 20;
const SUMMARY_CUT_CHARS: usize = 18;

/// Icon categories derived from forecast text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherIcon {
    Sun,
    SunCloud,
    Cloud,
    Rain,
    SunRain,
    CloudRain,
    Snow,
    Unknown,
}

impl WeatherIcon {
    /// Classify JMA weather text such as "晴れ 時々 くもり".
    ///
    /// Snow takes precedence, then rain combinations, then sun/cloud.
    /// Text with no known keyword is shown as cloudy.
    pub fn classify(text: Option<&str>) -> Self {
        let Some(text) = text else {
            return Self::Unknown;
        };

        let rain = text.contains('雨');
        let snow = text.contains('雪');
        let cloudy = text.contains('曇') || text.contains("くもり");
        let sunny = text.contains('晴');

        match (snow, rain, sunny, cloudy) {
            (true, ..) => Self::Snow,
            (false, true, true, _) => Self::SunRain,
            (false, true, false, true) => Self::CloudRain,
            (false, true, false, false) => Self::Rain,
            (false, false, true, true) => Self::SunCloud,
            (false, false, true, false) => Self::Sun,
            (false, false, false, _) => Self::Cloud,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Sun => "☀️",
            Self::SunCloud => "⛅",
            Self::Cloud => "☁️",
            Self::Rain => "🌧️",
            Self::SunRain => "🌤️🌧️",
            Self::CloudRain => "☁️🌧️",
            Self::Snow => "❄️",
            Self::Unknown => "❓",
        }
    }
}

/// One day of forecast, formatted for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastCard {
    pub date: String,
    pub icon: WeatherIcon,
    pub summary: String,
    pub temp_min: String,
    pub temp_max: String,
}

impl ForecastCard {
    /// `None` for records without weather text; those are not shown.
    pub fn from_record(record: &ForecastRecord) -> Option<Self> {
        let weather = record.weather_text.as_deref().filter(|w| !w.is_empty())?;

        Some(Self {
            date: record.date.clone(),
            icon: WeatherIcon::classify(Some(weather)),
            summary: summarize(weather),
            temp_min: temperature_label(record.temp_min.as_deref()),
            temp_max: temperature_label(record.temp_max.as_deref()),
        })
    }
}

/// Cards for every record that carries weather text, in record order.
pub fn cards(records: &[ForecastRecord]) -> Vec<ForecastCard> {
    records.iter().filter_map(ForecastCard::from_record).collect()
}

/// Single-line weather text, shortened to fit a card.
pub fn summarize(weather: &str) -> String {
    let line: String = weather
        .chars()
        .map(|c| if c == '\n' || c == '\u{3000}' { ' ' } else { c })
        .collect();

    if line.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = line.chars().take(SUMMARY_CUT_CHARS).collect();
        format!("{cut}...")
    } else {
        line
    }
}

fn temperature_label(value: Option<&str>) -> String {
    match value {
        Some(t) if !t.is_empty() => format!("{t}°C"),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::NaiveDateTime;

    fn record(weather: Option<&str>, min: Option<&str>, max: Option<&str>) -> ForecastRecord {
        ForecastRecord {
            region_code: "130000".into(),
            region_name: "東京都".into(),
            date: "2024-01-01".into(),
            weather_text: weather.map(str::to_string),
            temp_min: min.map(str::to_string),
            temp_max: max.map(str::to_string),
            fetched_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn test_classify_snow_wins() {
        assert_eq!(WeatherIcon::classify(Some("雨か雪")), WeatherIcon::Snow);
        assert_eq!(WeatherIcon::classify(Some("晴れ 夜 雪")), WeatherIcon::Snow);
    }

    #[test]
    fn test_classify_rain_combinations() {
        assert_eq!(WeatherIcon::classify(Some("晴れ 時々 雨")), WeatherIcon::SunRain);
        assert_eq!(WeatherIcon::classify(Some("くもり 一時 雨")), WeatherIcon::CloudRain);
        assert_eq!(WeatherIcon::classify(Some("曇時々雨")), WeatherIcon::CloudRain);
        assert_eq!(WeatherIcon::classify(Some("雨")), WeatherIcon::Rain);
    }

    #[test]
    fn test_classify_sun_and_cloud() {
        assert_eq!(WeatherIcon::classify(Some("晴れ 時々 くもり")), WeatherIcon::SunCloud);
        assert_eq!(WeatherIcon::classify(Some("晴れ")), WeatherIcon::Sun);
        assert_eq!(WeatherIcon::classify(Some("くもり")), WeatherIcon::Cloud);
        assert_eq!(WeatherIcon::classify(Some("霧")), WeatherIcon::Cloud);
        assert_eq!(WeatherIcon::classify(None), WeatherIcon::Unknown);
    }

    #[test]
    fn test_summarize_flattens_whitespace() {
        assert_eq!(summarize("くもり\n夜　雨"), "くもり 夜 雨");
    }

    #[test]
    fn test_summarize_truncates_long_text() {
        let long = "くもり　昼過ぎ　から　晴れ　所により　夜遅く　雨";
        let summary = summarize(long);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), SUMMARY_CUT_CHARS + 3);

        let exact = "あ".repeat(SUMMARY_MAX_CHARS);
        assert_eq!(summarize(&exact), exact);
    }

    #[test]
    fn test_card_temperature_labels() {
        let card = ForecastCard::from_record(&record(Some("晴れ"), Some("3"), None)).unwrap();
        assert_eq!(card.temp_min, "3°C");
        assert_eq!(card.temp_max, "-");
        assert_eq!(card.icon, WeatherIcon::Sun);
    }

    #[test]
    fn test_cards_skip_records_without_weather() {
        let records = vec![
            record(Some("雨"), Some("1"), Some("4")),
            record(None, Some("2"), Some("5")),
            record(Some(""), None, None),
        ];
        assert_eq!(cards(&records).len(), 1);
    }
}
