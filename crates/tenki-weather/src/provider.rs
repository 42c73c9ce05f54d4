//! HTTP access to the region catalog and per-region forecasts.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tenki_core::{NetworkError, ReqwestErrorExt, WeatherConfig};

const USER_AGENT: &str = concat!("Tenki/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ForecastClient {
    client: Arc<Client>,
    config: Arc<WeatherConfig>,
}

impl ForecastClient {
    /// Every request is bounded by `request_timeout_secs`.
    pub fn new(config: &WeatherConfig) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| e.into_network_error())?;

        Ok(Self {
            client: Arc::new(client),
            config: Arc::new(config.clone()),
        })
    }

    /// Raw region hierarchy document.
    pub async fn fetch_area_document(&self) -> Result<String, NetworkError> {
        self.get_text(&self.config.area_url).await
    }

    /// Raw forecast document for a region.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn fetch_forecast(&self, region_code: &str) -> Result<String, NetworkError> {
        let url = self.config.forecast_url(region_code);
        self.get_text(&url).await
    }

    /// GET a non-empty body. Non-2xx statuses and blank bodies are errors.
    async fn get_text(&self, url: &str) -> Result<String, NetworkError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.into_network_error())?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} returned status {}", url, status);
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message: format!("unexpected status {} from {}", status, url),
            });
        }

        let body = response.text().await.map_err(|e| e.into_network_error())?;
        if body.trim().is_empty() {
            return Err(NetworkError::EmptyBody(url.to_string()));
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> WeatherConfig {
        WeatherConfig {
            area_url: format!("{}/common/const/area.json", server.uri()),
            forecast_base_url: format!("{}/forecast/data/forecast", server.uri()),
            request_timeout_secs: 1,
            ..WeatherConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_forecast_uses_region_template() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast/data/forecast/130000.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let client = ForecastClient::new(&config_for(&server)).unwrap();
        assert_eq!(client.fetch_forecast("130000").await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_non_success_status_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ForecastClient::new(&config_for(&server)).unwrap();
        let err = client.fetch_forecast("014030").await.unwrap_err();
        assert!(matches!(err, NetworkError::ServerError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_blank_body_is_empty_body_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .mount(&server)
            .await;

        let client = ForecastClient::new(&config_for(&server)).unwrap();
        let err = client.fetch_forecast("460040").await.unwrap_err();
        assert!(matches!(err, NetworkError::EmptyBody(_)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("[]")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = ForecastClient::new(&config_for(&server)).unwrap();
        let err = client.fetch_forecast("130000").await.unwrap_err();
        assert!(matches!(err, NetworkError::Timeout));
    }
}
