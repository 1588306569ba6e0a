//! [Home Assistant REST API](https://developers.home-assistant.io/docs/api/rest/) client.

mod error;
mod models;

use std::time::Duration;

use bon::Builder;
use reqwest::{
    Client,
    ClientBuilder,
    Url,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;

pub use self::{
    error::Error,
    models::{ApiStatus, EntitiesHistory, HistoryPoint, LogbookEntry, StateRecord, StatisticPoint},
};
use crate::prelude::*;

/// Connection settings, fixed for the lifetime of the process.
///
/// Intentionally not `Debug`: it holds the access token.
#[must_use]
#[derive(Clone, Builder)]
pub struct ClientConfig {
    /// For example: `http://localhost:8123`. A trailing slash is ignored.
    base_url: Url,

    #[builder(into)]
    access_token: String,

    #[builder(default = Duration::from_secs(30))]
    timeout: Duration,
}

pub struct Api {
    client: Client,
    base_url: Url,
}

impl Api {
    pub fn try_new(config: ClientConfig) -> Result<Self> {
        ensure!(!config.base_url.cannot_be_a_base(), "`{}` cannot be a base URL", config.base_url);
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.access_token))
            .context("the access token is not a valid header value")?;
        authorization.set_sensitive(true);
        let headers = HeaderMap::from_iter([
            (AUTHORIZATION, authorization),
            (CONTENT_TYPE, HeaderValue::from_static("application/json")),
        ]);
        let client = ClientBuilder::new()
            .user_agent("ha-history")
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("failed to build the HTTP client")?;
        Ok(Self { client, base_url: config.base_url })
    }

    /// Fetch the state changes of a single entity.
    ///
    /// Without `start`, the upstream picks its own default period.
    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn get_history(
        &self,
        entity_id: &str,
        start: Option<&str>,
        end: Option<&str>,
        minimal_response: bool,
    ) -> Result<Vec<HistoryPoint>, Error> {
        #[skip_serializing_none]
        #[derive(Serialize)]
        struct Query<'a> {
            filter_entity_id: &'a str,
            minimal_response: bool,
            end_time: Option<&'a str>,
        }

        let url = self.endpoint(["history", "period"].into_iter().chain(start))?;
        let history: EntitiesHistory = self
            .get(url, &Query { filter_entity_id: entity_id, minimal_response, end_time: end })
            .await?;
        let points = history.into_first();
        info!(n_points = points.len(), "fetched");
        Ok(points)
    }

    /// Fetch long-term statistics, keyed by the statistic ID.
    ///
    /// The period is passed through as is, and the values are not inspected.
    #[instrument(skip_all, fields(entity_id = entity_id, period = period))]
    pub async fn get_statistics(
        &self,
        entity_id: &str,
        start: &str,
        end: Option<&str>,
        period: &str,
    ) -> Result<Map<String, Value>, Error> {
        #[skip_serializing_none]
        #[derive(Serialize)]
        struct Query<'a> {
            statistic_ids: &'a str,
            start_time: &'a str,
            period: &'a str,
            end_time: Option<&'a str>,
        }

        let url = self.endpoint(["history", "statistics"])?;
        let query = Query { statistic_ids: entity_id, start_time: start, period, end_time: end };
        self.get(url, &query).await
    }

    /// Fetch the current states of all entities.
    #[instrument(skip_all)]
    pub async fn get_states(&self) -> Result<Vec<StateRecord>, Error> {
        let states: Vec<StateRecord> = self.get(self.endpoint(["states"])?, &()).await?;
        info!(n_states = states.len(), "fetched");
        Ok(states)
    }

    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn get_logbook(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        entity_id: Option<&str>,
    ) -> Result<Vec<LogbookEntry>, Error> {
        #[skip_serializing_none]
        #[derive(Serialize)]
        struct Query<'a> {
            end_time: Option<&'a str>,
            entity: Option<&'a str>,
        }

        let url = self.endpoint(std::iter::once("logbook").chain(start))?;
        let entries: Vec<LogbookEntry> =
            self.get(url, &Query { end_time: end, entity: entity_id }).await?;
        info!(n_entries = entries.len(), "fetched");
        Ok(entries)
    }

    /// Check that the API is reachable and the token is accepted.
    ///
    /// The API root is only served with the trailing slash, hence the empty segment.
    #[instrument(skip_all)]
    pub async fn check(&self) -> Result<ApiStatus, Error> {
        self.get(self.endpoint([""])?, &()).await
    }

    /// Build `<base URL>/api/<segments…>`, percent-encoding each segment.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::UnexpectedError(format!("`{}` cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(path = url.path()))]
    async fn get<Q: Serialize, R: DeserializeOwned>(&self, url: Url, query: &Q) -> Result<R, Error> {
        info!(%url, "requesting…");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(Error::from_transport)
            .inspect_err(|error| error!("{error}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|error| {
                warn!("failed to read the error response: {error:#}");
                status.canonical_reason().unwrap_or_default().to_owned()
            });
            error!(%status, body = %body, "request failed");
            return Err(Error::UpstreamError { status, body });
        }
        response.json().await.map_err(Error::from_body).inspect_err(|error| error!("{error}"))
    }
}


#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::{testing::api, *};

    #[tokio::test]
    async fn get_history_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/history/period/2024-01-15T00:00:00")
            .match_header("authorization", "Bearer test-token")
            .match_header("content-type", "application/json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter_entity_id".into(), "sensor.temp".into()),
                Matcher::UrlEncoded("minimal_response".into(), "true".into()),
                Matcher::UrlEncoded("end_time".into(), "2024-01-16T00:00:00".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    [
                        {"entity_id": "sensor.temp", "state": "21.5"},
                        {"state": "21.7"}
                    ],
                    [
                        {"entity_id": "sensor.other", "state": "1"}
                    ]
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let points = api(&server)?
            .get_history(
                "sensor.temp",
                Some("2024-01-15T00:00:00"),
                Some("2024-01-16T00:00:00"),
                true,
            )
            .await?;

        assert_eq!(points.len(), 2);
        assert_eq!(points[1]["state"], "21.7");
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn get_history_without_start_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/history/period")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter_entity_id".into(), "sensor.temp".into()),
                Matcher::UrlEncoded("minimal_response".into(), "false".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let points = api(&server)?.get_history("sensor.temp", None, None, false).await?;

        assert!(points.is_empty());
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn get_statistics_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/history/statistics")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("statistic_ids".into(), "sensor.energy".into()),
                Matcher::UrlEncoded("start_time".into(), "2024-01-01T00:00:00".into()),
                Matcher::UrlEncoded("period".into(), "day".into()),
            ]))
            .with_status(200)
            .with_body(json!({"sensor.energy": [{"start": 1_704_067_200_000_u64, "sum": 3.5}]}).to_string())
            .create_async()
            .await;

        let statistics = api(&server)?
            .get_statistics("sensor.energy", "2024-01-01T00:00:00", None, "day")
            .await?;

        assert_eq!(statistics["sensor.energy"].as_array().map(Vec::len), Some(1));
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn get_logbook_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/logbook/2024-01-15T10:30:00+00:00")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("entity".into(), "light.kitchen".into()),
                Matcher::UrlEncoded("end_time".into(), "2024-01-15T12:00:00".into()),
            ]))
            .with_status(200)
            .with_body(json!([{"name": "Kitchen", "message": "turned on"}]).to_string())
            .create_async()
            .await;

        let entries = api(&server)?
            .get_logbook(
                Some("2024-01-15T10:30:00+00:00"),
                Some("2024-01-15T12:00:00"),
                Some("light.kitchen"),
            )
            .await?;

        assert_eq!(entries.len(), 1);
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn check_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(r#"{"message": "API running."}"#)
            .create_async()
            .await;

        let status = api(&server)?.check().await?;

        assert_eq!(status.message, "API running.");
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn base_url_trailing_slash_is_ignored() -> Result {
        let mut server = Server::new_async().await;
        let mock =
            server.mock("GET", "/api/states").with_status(200).with_body("[]").create_async().await;

        let api = Api::try_new(
            ClientConfig::builder()
                .base_url(Url::parse(&format!("{}/", server.url()))?)
                .access_token("test-token")
                .build(),
        )?;
        assert!(api.get_states().await?.is_empty());
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn unauthorized_is_upstream_error() -> Result {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states")
            .with_status(401)
            .with_body("401: Unauthorized")
            .create_async()
            .await;

        let error = api(&server)?.get_states().await.unwrap_err();

        assert!(matches!(error, Error::UpstreamError { status, .. } if status.as_u16() == 401));
        assert_eq!(error.to_string(), "Home Assistant API error: 401 - 401: Unauthorized");
        Ok(())
    }

    #[tokio::test]
    async fn invalid_json_is_unexpected_error() -> Result {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states")
            .with_status(200)
            .with_body("<html>definitely not JSON</html>")
            .create_async()
            .await;

        let error = api(&server)?.get_states().await.unwrap_err();

        assert!(matches!(error, Error::UnexpectedError(_)), "{error}");
        Ok(())
    }

    #[tokio::test]
    async fn refused_connection_is_connection_failure() -> Result {
        let port = TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
        let api = Api::try_new(
            ClientConfig::builder()
                .base_url(Url::parse(&format!("http://127.0.0.1:{port}"))?)
                .access_token("test-token")
                .timeout(Duration::from_secs(5))
                .build(),
        )?;

        let error = api.get_states().await.unwrap_err();

        assert!(matches!(error, Error::ConnectionFailure(_)), "{error}");
        assert!(error.to_string().starts_with("Failed to connect to Home Assistant: "));
        Ok(())
    }

    #[tokio::test]
    async fn timeout_is_connection_failure() -> Result {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states")
            .with_status(200)
            .with_chunked_body(|writer| {
                std::thread::sleep(Duration::from_secs(3));
                writer.write_all(b"[]")
            })
            .create_async()
            .await;
        let api = Api::try_new(
            ClientConfig::builder()
                .base_url(Url::parse(&server.url())?)
                .access_token("test-token")
                .timeout(Duration::from_millis(500))
                .build(),
        )?;

        let error = api.get_states().await.unwrap_err();

        assert!(matches!(error, Error::ConnectionFailure(_)), "{error}");
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_error_body_falls_back_to_reason() -> Result {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states")
            .with_status(500)
            .with_chunked_body(|writer| {
                std::thread::sleep(Duration::from_secs(3));
                writer.write_all(b"too late")
            })
            .create_async()
            .await;
        let api = Api::try_new(
            ClientConfig::builder()
                .base_url(Url::parse(&server.url())?)
                .access_token("test-token")
                .timeout(Duration::from_millis(500))
                .build(),
        )?;

        let error = api.get_states().await.unwrap_err();

        assert_eq!(error.to_string(), "Home Assistant API error: 500 - Internal Server Error");
        Ok(())
    }

    #[test]
    fn cannot_be_a_base_url_is_rejected() -> Result {
        let config = ClientConfig::builder()
            .base_url(Url::parse("mailto:someone@example.com")?)
            .access_token("test-token")
            .build();
        assert!(Api::try_new(config).is_err());
        Ok(())
    }
}
