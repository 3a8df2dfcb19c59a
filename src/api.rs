//! REST probe used before credentials are saved
//!
//! `roomdeck setup` checks a URL and token against `/api/` and reads
//! `/api/config` so bad credentials are caught before anything is stored.
//! Everything else goes over the WebSocket connection.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration, insecure: bool) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(format!("roomdeck/{}", env!("CARGO_PKG_VERSION")));

        if insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("building HTTP client")?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/api{}", self.base_url, path);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_to_error(status, &url, &error_text));
        }

        response
            .json()
            .await
            .with_context(|| format!("parsing response from {url}"))
    }

    /// Check that the API answers and accepts the token
    pub async fn probe(&self) -> Result<HubInfo> {
        let status: Value = self.get("/").await?;
        let config: HubConfig = self.get("/config").await?;

        Ok(HubInfo {
            message: status
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("API running.")
                .to_string(),
            location_name: config.location_name,
            version: config.version,
            time_zone: config.time_zone,
            state: config.state,
        })
    }
}

/// Strip trailing slashes and a trailing `/api`
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn status_to_error(status: StatusCode, url: &str, body: &str) -> anyhow::Error {
    let hint = match status {
        StatusCode::UNAUTHORIZED => "Check the long-lived access token",
        StatusCode::FORBIDDEN => "The token may not have sufficient permissions",
        StatusCode::NOT_FOUND => "Is this the Home Assistant base URL?",
        StatusCode::SERVICE_UNAVAILABLE => "Home Assistant may be starting up or restarting",
        _ => "",
    };

    let msg = if body.is_empty() {
        format!("HTTP {status} from {url}")
    } else {
        format!("HTTP {status} from {url}: {body}")
    };

    if hint.is_empty() {
        anyhow!(msg)
    } else {
        anyhow!("{msg}\nHint: {hint}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubInfo {
    pub message: String,
    pub location_name: String,
    pub version: String,
    pub time_zone: String,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
struct HubConfig {
    #[serde(default)]
    location_name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    time_zone: String,
    #[serde(default)]
    state: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, RestClient) {
        let server = MockServer::start().await;
        let client = RestClient::new(&server.uri(), "secret", Duration::from_secs(5), false).unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_probe_reads_config() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/api/"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "API running."})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "location_name": "Home",
                "version": "2025.1.0",
                "time_zone": "Europe/Berlin",
                "state": "RUNNING",
                "components": ["light"]
            })))
            .mount(&server)
            .await;

        let info = client.probe().await.unwrap();
        assert_eq!(info.message, "API running.");
        assert_eq!(info.location_name, "Home");
        assert_eq!(info.version, "2025.1.0");
    }

    #[tokio::test]
    async fn test_probe_rejects_bad_token() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/api/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("401: Unauthorized"))
            .mount(&server)
            .await;

        let err = client.probe().await.unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("401"));
        assert!(text.contains("access token"));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://hass:8123/"), "http://hass:8123");
        assert_eq!(normalize_base_url("https://hass/api"), "https://hass");
        assert_eq!(normalize_base_url("hass.local:8123"), "http://hass.local:8123");
    }
}
