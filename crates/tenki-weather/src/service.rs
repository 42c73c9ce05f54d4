//! Forecast orchestration: fetch → parse → persist → read back, with a
//! fallback to the last stored snapshot when the live path fails.

use chrono::{Local, NaiveDate, NaiveDateTime, SubsecRound};
use std::fmt;
use std::sync::Arc;
use tenki_core::{Config, DatabaseError, NetworkError, WeatherConfig};

use crate::catalog::RegionCatalog;
use crate::error::ForecastError;
use crate::parser::{parse_forecast, ForecastDocument};
use crate::provider::ForecastClient;
use crate::store::ForecastStore;
use crate::types::{
    ForecastDays, ForecastOutcome, ForecastRecord, ForecastSnapshot, FETCHED_AT_FORMAT,
};

/// Progress of a single region request, reported through tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching,
    Parsing,
    Persisting,
    Serving,
    FailedTimeout,
    FailedNoData,
    FailedTransport,
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Persisting => "persisting",
            Self::Serving => "serving",
            Self::FailedTimeout => "failed_timeout",
            Self::FailedNoData => "failed_no_data",
            Self::FailedTransport => "failed_transport",
        };
        f.write_str(name)
    }
}

impl FetchState {
    /// Terminal state for a failed live fetch
    pub fn for_error(err: &ForecastError) -> Self {
        match err {
            ForecastError::Timeout => Self::FailedTimeout,
            ForecastError::NoForecastData { .. } => Self::FailedNoData,
            _ => Self::FailedTransport,
        }
    }
}

fn transition(region_code: &str, state: FetchState) {
    tracing::debug!(region = region_code, state = %state, "Forecast request state");
}

/// Entry point for the presentation layer. Each call is independent; the
/// store is the only shared state.
#[derive(Clone)]
pub struct ForecastService {
    client: ForecastClient,
    store: Arc<ForecastStore>,
    excluded_codes: Vec<String>,
    display_days: usize,
    history_limit: usize,
}

impl ForecastService {
    pub fn new(client: ForecastClient, store: Arc<ForecastStore>, config: &WeatherConfig) -> Self {
        Self {
            client,
            store,
            excluded_codes: config.excluded_area_codes.clone(),
            display_days: config.display_days,
            history_limit: config.history_limit,
        }
    }

    /// Open the store under the config directory and build the HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, ForecastError> {
        let path = config.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ForecastError::StoreUnavailable(DatabaseError::ConnectionFailed(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let store = ForecastStore::open(&path)?;
        let client = ForecastClient::new(&config.weather)?;
        tracing::info!("Forecast store at {}", path.display());

        Ok(Self::new(client, Arc::new(store), &config.weather))
    }

    /// Load the region hierarchy and record it in the store.
    ///
    /// Failing to record the regions only degrades history; the catalog is
    /// still returned.
    pub async fn load_catalog(&self) -> Result<RegionCatalog, ForecastError> {
        let catalog = RegionCatalog::load(&self.client, &self.excluded_codes).await?;

        let regions = catalog.regions();
        match self.with_store(move |store| store.save_areas(&regions)).await {
            Ok(count) => tracing::info!("Saved {} regions", count),
            Err(e) => tracing::warn!("Failed to save regions: {}", e),
        }

        Ok(catalog)
    }

    /// Fetch a region's forecast, persist it and serve it from the store.
    ///
    /// Timeouts, transport failures and persistence failures fall back to
    /// the most recent stored snapshot. `NoForecastData` is returned as-is.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn fetch_and_display(
        &self,
        region_code: &str,
        region_name: &str,
    ) -> Result<ForecastOutcome, ForecastError> {
        transition(region_code, FetchState::Idle);
        let fetched_at = Local::now().naive_local();

        let days = match self.fetch_days(region_code).await {
            Ok(days) => days,
            Err(e) => {
                transition(region_code, FetchState::for_error(&e));
                if e.is_transient() {
                    return self.fallback(region_code, region_name, e.to_string()).await;
                }
                return Err(e);
            }
        };

        transition(region_code, FetchState::Persisting);
        match self.persist_and_read(region_code, region_name, days, fetched_at).await {
            Ok(records) => {
                transition(region_code, FetchState::Serving);
                Ok(ForecastOutcome::Live(self.snapshot(region_code, region_name, records)))
            }
            Err(e) => {
                self.fallback(region_code, region_name, format!("failed to persist forecast: {e}"))
                    .await
            }
        }
    }

    /// Fetch days on which forecasts were stored, most recent first.
    pub async fn list_history(&self, region_code: &str) -> Result<Vec<NaiveDate>, ForecastError> {
        let code = region_code.to_string();
        let limit = self.history_limit;
        self.with_store(move |store| store.available_fetch_days(&code, limit))
            .await
    }

    /// Snapshot fetched on a given day. When that day holds several fetches
    /// the newest value per forecast date is kept.
    pub async fn show_as_of(
        &self,
        region_code: &str,
        region_name: &str,
        day: NaiveDate,
    ) -> Result<ForecastSnapshot, ForecastError> {
        let code = region_code.to_string();
        let mut records = self.with_store(move |store| store.as_of(&code, day)).await?;

        // Rows arrive date-ascending with the newest fetch first per date
        records.dedup_by(|later, earlier| later.date == earlier.date);

        Ok(self.snapshot(region_code, region_name, records).with_fetch_day(day))
    }

    async fn fetch_days(&self, region_code: &str) -> Result<ForecastDays, ForecastError> {
        transition(region_code, FetchState::Fetching);
        let body = self.client.fetch_forecast(region_code).await?;

        transition(region_code, FetchState::Parsing);
        let document = ForecastDocument::from_json(&body).map_err(|e| {
            ForecastError::Transport(NetworkError::InvalidResponse(format!(
                "undecodable forecast document: {e}"
            )))
        })?;

        let days = parse_forecast(&document);
        if days.is_empty() {
            return Err(ForecastError::NoForecastData {
                region_code: region_code.to_string(),
            });
        }
        Ok(days)
    }

    /// Save a batch then read the latest batch back; only store-confirmed
    /// rows are ever displayed.
    ///
    /// Fails when no row of this batch was written or the newest stored
    /// batch is not this one, so older rows are never passed off as live.
    async fn persist_and_read(
        &self,
        region_code: &str,
        region_name: &str,
        days: ForecastDays,
        fetched_at: NaiveDateTime,
    ) -> Result<Vec<ForecastRecord>, ForecastError> {
        let code = region_code.to_string();
        let name = region_name.to_string();
        // Stored at second precision
        let batch_at = fetched_at.trunc_subsecs(0);

        let (report, records) = self
            .with_store(move |store| {
                let report = store.save_forecasts(&code, &name, &days, batch_at)?;
                if !report.is_complete() {
                    let failed: Vec<&str> = report.failed.iter().map(|f| f.date.as_str()).collect();
                    tracing::warn!(region = %code, ?failed, "Forecast batch partially saved");
                }
                Ok((report, store.latest(&code)?))
            })
            .await?;

        if report.saved == 0 {
            let reason = report
                .failed
                .first()
                .map_or("empty batch", |f| f.reason.as_str());
            return Err(ForecastError::StoreUnavailable(DatabaseError::QueryFailed(format!(
                "no forecast rows saved: {reason}"
            ))));
        }

        if records.is_empty() || records.iter().any(|r| r.fetched_at != batch_at) {
            return Err(ForecastError::StoreUnavailable(DatabaseError::QueryFailed(format!(
                "batch fetched at {} not found in store",
                batch_at.format(FETCHED_AT_FORMAT)
            ))));
        }
        Ok(records)
    }

    async fn fallback(
        &self,
        region_code: &str,
        region_name: &str,
        reason: String,
    ) -> Result<ForecastOutcome, ForecastError> {
        tracing::warn!(region = region_code, "Live forecast failed, trying store: {}", reason);

        let code = region_code.to_string();
        match self.with_store(move |store| store.latest(&code)).await {
            Ok(records) if !records.is_empty() => {
                tracing::info!(region = region_code, "Serving cached forecast");
                Ok(ForecastOutcome::Cached {
                    snapshot: self.snapshot(region_code, region_name, records),
                    reason,
                })
            }
            Ok(_) => Err(ForecastError::Unavailable {
                region_name: region_name.to_string(),
                reason,
            }),
            Err(store_err) => Err(ForecastError::Unavailable {
                region_name: region_name.to_string(),
                reason: format!("{reason}; {store_err}"),
            }),
        }
    }

    fn snapshot(
        &self,
        region_code: &str,
        region_name: &str,
        records: Vec<ForecastRecord>,
    ) -> ForecastSnapshot {
        ForecastSnapshot::new(region_code, region_name, records, self.display_days)
    }

    /// Run a blocking store operation off the async runtime.
    async fn with_store<T, F>(&self, op: F) -> Result<T, ForecastError>
    where
        F: FnOnce(&ForecastStore) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| {
                ForecastError::StoreUnavailable(DatabaseError::ConnectionFailed(format!(
                    "store task failed: {e}"
                )))
            })?
            .map_err(ForecastError::from)
    }
}
