//! SQLite-backed forecast history.
//!
//! Every fetch is stored as its own batch keyed by `(area_code,
//! forecast_date, fetched_at)`. Rows accumulate without expiry.

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use std::path::Path;
use tenki_core::{DatabaseError, RusqliteErrorExt};

use crate::types::{
    FailedWrite, ForecastDays, ForecastRecord, Region, RegionKind, SaveReport, DAY_FORMAT,
    FETCHED_AT_FORMAT,
};

const RECORD_COLUMNS: &str =
    "area_code, area_name, forecast_date, weather, temp_min, temp_max, fetched_at";

/// Shared forecast store; statements are serialized through a mutex.
pub struct ForecastStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> DatabaseError {
    e.into_database_error()
}

impl ForecastStore {
    /// Open (or create) the store at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create the schema if absent. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS areas (
                    area_code TEXT PRIMARY KEY,
                    area_name TEXT NOT NULL,
                    parent_code TEXT,
                    area_type TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS forecasts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    area_code TEXT NOT NULL,
                    area_name TEXT NOT NULL,
                    forecast_date TEXT NOT NULL,
                    weather TEXT,
                    temp_min TEXT,
                    temp_max TEXT,
                    fetched_at TEXT NOT NULL,
                    UNIQUE(area_code, forecast_date, fetched_at)
                );

                CREATE INDEX IF NOT EXISTS idx_forecasts_area_date
                    ON forecasts(area_code, forecast_date);
                "#,
            )
            .map_err(db_err)
    }

    /// Upsert centers and offices by code.
    pub fn save_areas(&self, regions: &[Region]) -> Result<usize, DatabaseError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO areas (area_code, area_name, parent_code, area_type)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(db_err)?;
            for region in regions {
                stmt.execute(params![
                    region.code,
                    region.name,
                    region.parent_code,
                    region.kind.as_str()
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(regions.len())
    }

    /// Look up a stored region.
    pub fn area(&self, code: &str) -> Result<Option<Region>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT area_code, area_name, parent_code, area_type FROM areas WHERE area_code = ?1",
            )
            .map_err(db_err)?;
        let mut rows = stmt.query(params![code]).map_err(db_err)?;

        let Some(row) = rows.next().map_err(db_err)? else {
            return Ok(None);
        };
        let kind: String = row.get(3).map_err(db_err)?;
        let kind = RegionKind::parse(&kind).ok_or_else(|| {
            DatabaseError::Corruption(format!("unknown area_type '{}' for {}", kind, code))
        })?;

        Ok(Some(Region {
            code: row.get(0).map_err(db_err)?,
            name: row.get(1).map_err(db_err)?,
            parent_code: row.get(2).map_err(db_err)?,
            kind,
        }))
    }

    /// Upsert one row per day for a single fetch.
    ///
    /// A failing row is logged and reported; the rest of the batch is still
    /// written. Only failures to open or commit the batch are returned as errors.
    pub fn save_forecasts(
        &self,
        region_code: &str,
        region_name: &str,
        days: &ForecastDays,
        fetched_at: NaiveDateTime,
    ) -> Result<SaveReport, DatabaseError> {
        let fetched_at = fetched_at.format(FETCHED_AT_FORMAT).to_string();
        let mut report = SaveReport::default();

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR REPLACE INTO forecasts ({RECORD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ))
                .map_err(db_err)?;

            for (date, day) in days {
                let result = stmt.execute(params![
                    region_code,
                    region_name,
                    date,
                    day.weather_text,
                    day.temp_min,
                    day.temp_max,
                    fetched_at,
                ]);
                match result {
                    Ok(_) => report.saved += 1,
                    Err(e) => {
                        tracing::warn!(
                            region = region_code,
                            date = %date,
                            "Failed to save forecast row: {}",
                            e
                        );
                        report.failed.push(FailedWrite {
                            date: date.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        tx.commit().map_err(db_err)?;

        tracing::info!(
            region = region_code,
            saved = report.saved,
            failed = report.failed.len(),
            "Saved forecast for {}",
            region_name
        );
        Ok(report)
    }

    /// Rows of the most recent fetch for a region, earliest date first.
    pub fn latest(&self, region_code: &str) -> Result<Vec<ForecastRecord>, DatabaseError> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM forecasts
                 WHERE area_code = ?1 AND fetched_at = (
                     SELECT MAX(fetched_at) FROM forecasts WHERE area_code = ?1
                 )
                 ORDER BY forecast_date ASC"
            ),
            params![region_code],
        )
    }

    /// Rows fetched on the given calendar day, earliest date first.
    ///
    /// Several fetches on the same day all match; ties on date are ordered
    /// newest fetch first.
    pub fn as_of(
        &self,
        region_code: &str,
        day: NaiveDate,
    ) -> Result<Vec<ForecastRecord>, DatabaseError> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM forecasts
                 WHERE area_code = ?1 AND DATE(fetched_at) = ?2
                 ORDER BY forecast_date ASC, fetched_at DESC"
            ),
            params![region_code, day.format(DAY_FORMAT).to_string()],
        )
    }

    /// Distinct fetch days for a region, most recent first.
    pub fn available_fetch_days(
        &self,
        region_code: &str,
        limit: usize,
    ) -> Result<Vec<NaiveDate>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT DATE(fetched_at) AS fetch_day
                 FROM forecasts
                 WHERE area_code = ?1 AND DATE(fetched_at) IS NOT NULL
                 ORDER BY fetch_day DESC
                 LIMIT ?2",
            )
            .map_err(db_err)?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![region_code, limit], |row| {
                let day: String = row.get(0)?;
                NaiveDate::parse_from_str(&day, DAY_FORMAT)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
            })
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ForecastRecord>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params, Self::row_to_record).map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ForecastRecord> {
        let fetched_at: String = row.get(6)?;
        let fetched_at = NaiveDateTime::parse_from_str(&fetched_at, FETCHED_AT_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

        Ok(ForecastRecord {
            region_code: row.get(0)?,
            region_name: row.get(1)?,
            date: row.get(2)?,
            weather_text: row.get(3)?,
            temp_min: row.get(4)?,
            temp_max: row.get(5)?,
            fetched_at,
        })
    }

    /// Run raw SQL against the connection (test setup only).
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        self.conn.lock().execute_batch(sql).map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::DailyForecast;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, FETCHED_AT_FORMAT).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DAY_FORMAT).unwrap()
    }

    fn days(entries: &[(&str, &str, &str, &str)]) -> ForecastDays {
        entries
            .iter()
            .map(|(date, weather, min, max)| {
                let forecast = DailyForecast {
                    date: date.to_string(),
                    weather_text: Some(weather.to_string()),
                    temp_min: (!min.is_empty()).then(|| min.to_string()),
                    temp_max: (!max.is_empty()).then(|| max.to_string()),
                };
                (date.to_string(), forecast)
            })
            .collect()
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let store = ForecastStore::in_memory().unwrap();
        store.initialize().unwrap();
        store.initialize().unwrap();
    }

    #[test]
    fn test_open_on_disk_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.db");
        {
            let store = ForecastStore::open(&path).unwrap();
            store
                .save_forecasts("130000", "東京都", &days(&[("2024-01-01", "晴れ", "1", "9")]), at("2024-01-01 06:00:00"))
                .unwrap();
        }
        let store = ForecastStore::open(&path).unwrap();
        assert_eq!(store.latest("130000").unwrap().len(), 1);
    }

    #[test]
    fn test_save_areas_overwrites_by_code() {
        let store = ForecastStore::in_memory().unwrap();
        let mut regions = vec![
            Region {
                code: "010300".into(),
                name: "東北地方".into(),
                kind: RegionKind::Center,
                parent_code: None,
            },
            Region {
                code: "040000".into(),
                name: "宮城".into(),
                kind: RegionKind::Office,
                parent_code: Some("010300".into()),
            },
        ];
        assert_eq!(store.save_areas(&regions).unwrap(), 2);

        regions[1].name = "宮城県".into();
        store.save_areas(&regions).unwrap();

        let miyagi = store.area("040000").unwrap().unwrap();
        assert_eq!(miyagi.name, "宮城県");
        assert_eq!(miyagi.kind, RegionKind::Office);
        assert_eq!(miyagi.parent_code.as_deref(), Some("010300"));
        assert_eq!(store.area("010300").unwrap().unwrap().parent_code, None);
        assert!(store.area("999999").unwrap().is_none());
    }

    #[test]
    fn test_same_second_fetch_replaces_rows() {
        let store = ForecastStore::in_memory().unwrap();
        let fetched_at = at("2024-01-01 06:00:00");

        store
            .save_forecasts("130000", "東京都", &days(&[("2024-01-01", "晴れ", "1", "9")]), fetched_at)
            .unwrap();
        store
            .save_forecasts("130000", "東京都", &days(&[("2024-01-01", "雨", "2", "8")]), fetched_at)
            .unwrap();

        let rows = store.latest("130000").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].weather_text.as_deref(), Some("雨"));
    }

    #[test]
    fn test_subsecond_timestamps_collapse_to_one_batch() {
        let store = ForecastStore::in_memory().unwrap();
        let base = at("2024-01-01 06:00:00");
        let later = base + chrono::Duration::milliseconds(400);

        store
            .save_forecasts("130000", "東京都", &days(&[("2024-01-01", "晴れ", "", "")]), base)
            .unwrap();
        store
            .save_forecasts("130000", "東京都", &days(&[("2024-01-01", "曇り", "", "")]), later)
            .unwrap();

        assert_eq!(store.as_of("130000", day("2024-01-01")).unwrap().len(), 1);
    }

    #[test]
    fn test_latest_returns_newest_batch_only() {
        let store = ForecastStore::in_memory().unwrap();
        store
            .save_forecasts(
                "130000",
                "東京都",
                &days(&[("2024-01-01", "晴れ", "1", "9"), ("2024-01-02", "雨", "3", "7")]),
                at("2024-01-01 06:00:00"),
            )
            .unwrap();
        store
            .save_forecasts(
                "130000",
                "東京都",
                &days(&[("2024-01-03", "雪", "-1", "2"), ("2024-01-02", "曇り", "2", "6")]),
                at("2024-01-02 06:00:00"),
            )
            .unwrap();

        let rows = store.latest("130000").unwrap();
        let dates: Vec<_> = rows.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-02", "2024-01-03"]);
        assert!(rows.iter().all(|r| r.fetched_at == at("2024-01-02 06:00:00")));
        assert_eq!(rows[0].temp_min.as_deref(), Some("2"));
    }

    #[test]
    fn test_latest_is_scoped_to_region() {
        let store = ForecastStore::in_memory().unwrap();
        store
            .save_forecasts("130000", "東京都", &days(&[("2024-01-01", "晴れ", "", "")]), at("2024-01-01 06:00:00"))
            .unwrap();
        store
            .save_forecasts("270000", "大阪府", &days(&[("2024-01-01", "雨", "", "")]), at("2024-01-05 06:00:00"))
            .unwrap();

        let tokyo = store.latest("130000").unwrap();
        assert_eq!(tokyo.len(), 1);
        assert_eq!(tokyo[0].region_name, "東京都");
        assert!(store.latest("016000").unwrap().is_empty());
    }

    #[test]
    fn test_as_of_matches_fetch_day() {
        let store = ForecastStore::in_memory().unwrap();
        store
            .save_forecasts("130000", "東京都", &days(&[("2024-01-01", "晴れ", "", "")]), at("2024-01-01 06:00:00"))
            .unwrap();
        store
            .save_forecasts("130000", "東京都", &days(&[("2024-01-02", "雨", "", "")]), at("2024-01-02 23:59:59"))
            .unwrap();

        let rows = store.as_of("130000", day("2024-01-02")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "2024-01-02");
        assert!(store.as_of("130000", day("2023-12-31")).unwrap().is_empty());
    }

    #[test]
    fn test_available_fetch_days_most_recent_first() {
        let store = ForecastStore::in_memory().unwrap();
        for stamp in [
            "2024-01-01 06:00:00",
            "2024-01-03 06:00:00",
            "2024-01-03 18:00:00",
            "2024-01-02 06:00:00",
        ] {
            store
                .save_forecasts("130000", "東京都", &days(&[("2024-01-05", "晴れ", "", "")]), at(stamp))
                .unwrap();
        }

        let fetch_days = store.available_fetch_days("130000", 30).unwrap();
        assert_eq!(fetch_days, vec![day("2024-01-03"), day("2024-01-02"), day("2024-01-01")]);
        assert_eq!(store.available_fetch_days("130000", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_row_failure_does_not_abort_batch() {
        let store = ForecastStore::in_memory().unwrap();
        store
            .execute_batch(
                "CREATE TRIGGER reject_second_day BEFORE INSERT ON forecasts
                 WHEN NEW.forecast_date = '2024-01-02'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let report = store
            .save_forecasts(
                "130000",
                "東京都",
                &days(&[
                    ("2024-01-01", "晴れ", "", ""),
                    ("2024-01-02", "雨", "", ""),
                    ("2024-01-03", "雪", "", ""),
                ]),
                at("2024-01-01 06:00:00"),
            )
            .unwrap();

        assert_eq!(report.saved, 2);
        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].date, "2024-01-02");

        let dates: Vec<_> = store
            .latest("130000")
            .unwrap()
            .into_iter()
            .map(|r| r.date)
            .collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-03"]);
    }

    #[test]
    fn test_missing_fields_round_trip_as_none() {
        let store = ForecastStore::in_memory().unwrap();
        let mut batch = ForecastDays::new();
        batch.insert("2024-01-01".into(), DailyForecast::new("2024-01-01"));
        store
            .save_forecasts("130000", "東京都", &batch, at("2024-01-01 06:00:00"))
            .unwrap();

        let row = &store.latest("130000").unwrap()[0];
        assert_eq!(row.weather_text, None);
        assert_eq!(row.temp_min, None);
        assert_eq!(row.temp_max, None);
    }
}
