use async_trait::async_trait;
use beacon_core::{Channel, ChatRequest, ChatResponse};
use beacon_ports::{FetchError, Fetcher};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::GatewayError;
use crate::transport::config::PollingConfig;

fn fetch_error(err: reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::Decode(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

/// REST client for the backend's per-channel endpoints
///
/// Shared by the polling transport and the one-shot fetch path.
#[derive(Clone)]
pub struct RestFetcher {
    client: Client,
    base_url: String,
    config: PollingConfig,
}

impl RestFetcher {
    pub fn new(base_url: impl Into<String>, config: PollingConfig) -> Result<Self, GatewayError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(RestFetcher {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// URL polled for `channel`, with `params` as `?symbols=a,b`
    pub fn channel_url(&self, channel: Channel, params: &[String]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, self.config.endpoint(channel)))
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .append_pair("symbols", &params.join(","));
        }
        Ok(url)
    }

    /// GET the current payload for a channel
    pub async fn get_channel(&self, channel: Channel, params: &[String]) -> Result<Value, FetchError> {
        let url = self.channel_url(channel, params)?;
        log::debug!("GET {}", url);
        let resp = self.client.get(url).send().await.map_err(fetch_error)?;
        Self::handle_response(resp).await
    }

    /// POST a JSON body to the channel's endpoint
    pub async fn post(&self, channel: Channel, body: &Value) -> Result<Value, FetchError> {
        let url = self.channel_url(channel, &[])?;
        log::debug!("POST {}", url);
        let resp = self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(fetch_error)?;
        Self::handle_response(resp).await
    }

    /// GET the health path; any 2xx counts as healthy
    pub async fn probe_health(&self) -> Result<(), FetchError> {
        let url = format!("{}{}", self.base_url, self.config.health_path);
        let resp = self.client.get(&url).send().await.map_err(fetch_error)?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::status_error(status, resp).await)
        }
    }

    async fn handle_response<T: DeserializeOwned>(resp: Response) -> Result<T, FetchError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::status_error(status, resp).await);
        }

        let text = resp.text().await.map_err(fetch_error)?;
        serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn status_error(status: StatusCode, resp: Response) -> FetchError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return FetchError::RateLimited;
        }
        let message = resp.text().await.unwrap_or_default();
        FetchError::Http {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl Fetcher for RestFetcher {
    async fn fetch(&self, channel: Channel, params: &[String]) -> Result<Value, FetchError> {
        self.get_channel(channel, params).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, FetchError> {
        let body = serde_json::to_value(request).map_err(|e| FetchError::Decode(e.to_string()))?;
        let reply = self.post(Channel::AiChat, &body).await?;
        serde_json::from_value(reply).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
