// HTTP query API provider
use crate::application::query_provider::{QueryError, QueryProvider, QueryRange};
use crate::domain::channel::{Channel, ChannelId, ChannelState};
use crate::domain::telemetry::{BinnedSeries, RawSeries};
use crate::infrastructure::config::ProviderSettings;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpQueryProvider {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpQueryProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            client,
        })
    }

    fn build_url(&self, path: &str, params: &[(&str, &str)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        }
    }

    fn event_params<'a>(channel: &'a Channel, range: &'a QueryRange) -> Vec<(&'a str, &'a str)> {
        vec![
            ("backend", channel.backend.as_str()),
            ("channelName", channel.name.as_str()),
            ("begDate", range.start.as_str()),
            ("endDate", range.end.as_str()),
            ("expand", if range.expand { "true" } else { "false" }),
        ]
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, QueryError> {
        tracing::debug!("GET {}", url);
        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Status { status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl QueryProvider for HttpQueryProvider {
    async fn list_backends(&self) -> Result<Vec<String>, QueryError> {
        self.get_json(&self.build_url("/backends", &[])).await
    }

    async fn search_channels(&self, regex: Option<&str>) -> Result<Vec<Channel>, QueryError> {
        let params: Vec<(&str, &str)> = regex.map(|r| ("nameRegex", r)).into_iter().collect();
        self.get_json(&self.build_url("/channels/search", &params))
            .await
    }

    async fn query_raw_data(
        &self,
        channel: &Channel,
        range: &QueryRange,
    ) -> Result<RawSeries, QueryError> {
        let params = Self::event_params(channel, range);
        self.get_json(&self.build_url("/events", &params)).await
    }

    async fn query_binned_data(
        &self,
        channel: &Channel,
        range: &QueryRange,
        bin_count: usize,
    ) -> Result<BinnedSeries, QueryError> {
        let bins = bin_count.to_string();
        let mut params = Self::event_params(channel, range);
        params.push(("binCount", bins.as_str()));
        self.get_json(&self.build_url("/binned", &params)).await
    }

    async fn query_string_data(
        &self,
        channel: &Channel,
        range: &QueryRange,
    ) -> Result<RawSeries, QueryError> {
        let mut params = Self::event_params(channel, range);
        params.push(("valueType", "string"));
        self.get_json(&self.build_url("/events", &params)).await
    }

    async fn query_channel_state(&self, channel: &ChannelId) -> Result<ChannelState, QueryError> {
        let params = [
            ("backend", channel.backend.as_str()),
            ("channelName", channel.name.as_str()),
        ];
        self.get_json(&self.build_url("/channels/state", &params))
            .await
    }
}
