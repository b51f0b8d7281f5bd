// Query API provider trait and the per-backend registry
use crate::domain::channel::{Channel, ChannelId, ChannelState};
use crate::domain::deep_link::format_iso;
use crate::domain::telemetry::{BinnedSeries, RawSeries};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("no API provider registered for backend '{0}'")]
    NoProvider(String),
    #[error("channel '{0}' not found on its backend")]
    ChannelNotFound(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode backend response: {0}")]
    Decode(String),
    #[error("fetch task aborted: {0}")]
    Task(String),
}

/// Time range of a data query, ISO-8601 on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRange {
    pub start: String,
    pub end: String,
    pub expand: bool,
}

impl QueryRange {
    pub fn from_millis(start_ms: i64, end_ms: i64, expand: bool) -> Self {
        Self {
            start: format_iso(start_ms),
            end: format_iso(end_ms),
            expand,
        }
    }
}

#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Backends served by this provider
    async fn list_backends(&self) -> Result<Vec<String>, QueryError>;

    /// Channels whose name matches `regex` (all channels if `None`)
    async fn search_channels(&self, regex: Option<&str>) -> Result<Vec<Channel>, QueryError>;

    /// Full-resolution numeric or boolean data
    async fn query_raw_data(
        &self,
        channel: &Channel,
        range: &QueryRange,
    ) -> Result<RawSeries, QueryError>;

    /// Pre-aggregated data in `bin_count` bins
    async fn query_binned_data(
        &self,
        channel: &Channel,
        range: &QueryRange,
        bin_count: usize,
    ) -> Result<BinnedSeries, QueryError>;

    /// Full-resolution string-valued data
    async fn query_string_data(
        &self,
        channel: &Channel,
        range: &QueryRange,
    ) -> Result<RawSeries, QueryError>;

    async fn query_channel_state(&self, channel: &ChannelId) -> Result<ChannelState, QueryError>;
}

/// Maps each backend name to the provider that serves it.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn QueryProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: impl Into<String>, provider: Arc<dyn QueryProvider>) {
        self.providers.insert(backend.into(), provider);
    }

    /// Register `provider` for `backends`, or for whatever it reports when `None`.
    pub async fn register_discovered(
        &mut self,
        provider: Arc<dyn QueryProvider>,
        backends: Option<Vec<String>>,
    ) -> Result<usize, QueryError> {
        let backends = match backends {
            Some(backends) => backends,
            None => provider.list_backends().await?,
        };
        for backend in &backends {
            tracing::info!("Registered query provider for backend {}", backend);
            self.register(backend.clone(), provider.clone());
        }
        Ok(backends.len())
    }

    pub fn provider_for(&self, backend: &str) -> Result<Arc<dyn QueryProvider>, QueryError> {
        self.providers.get(backend).cloned().ok_or_else(|| {
            tracing::warn!("No API provider for backend {}", backend);
            QueryError::NoProvider(backend.to_string())
        })
    }

    pub fn backends(&self) -> Vec<String> {
        let mut backends: Vec<String> = self.providers.keys().cloned().collect();
        backends.sort();
        backends
    }

    /// Search every distinct provider concurrently; failing providers are skipped.
    pub async fn search(&self, regex: Option<&str>, backend: Option<&str>) -> Vec<Channel> {
        let mut distinct: Vec<Arc<dyn QueryProvider>> = Vec::new();
        for (name, provider) in &self.providers {
            if backend.is_some_and(|b| b != name.as_str()) {
                continue;
            }
            if !distinct.iter().any(|p| Arc::ptr_eq(p, provider)) {
                distinct.push(provider.clone());
            }
        }

        let results = join_all(distinct.iter().map(|p| p.search_channels(regex))).await;
        let mut channels = Vec::new();
        for result in results {
            match result {
                Ok(found) => channels.extend(found.into_iter().filter(|c| {
                    backend.map_or(self.providers.contains_key(&c.backend), |b| b == c.backend)
                })),
                Err(e) => tracing::warn!("Channel search failed: {}", e),
            }
        }
        channels
    }

    /// Full metadata for `id`, matched exactly on backend and name.
    pub async fn resolve_channel(&self, id: &ChannelId) -> Result<Channel, QueryError> {
        let provider = self.provider_for(&id.backend)?;
        provider
            .search_channels(Some(&exact_name_regex(&id.name)))
            .await?
            .into_iter()
            .find(|c| c.matches(id))
            .ok_or_else(|| QueryError::ChannelNotFound(id.to_string()))
    }

    pub async fn channel_state(&self, id: &ChannelId) -> Result<ChannelState, QueryError> {
        self.provider_for(&id.backend)?
            .query_channel_state(id)
            .await
    }
}

/// Regex matching exactly `name`, metacharacters included.
fn exact_name_regex(name: &str) -> String {
    format!("^{}$", regex::escape(name))
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::domain::telemetry::{BinStats, BinnedPoint, DataPoint};
    use regex::Regex;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory provider with canned responses and a call log.
    #[derive(Default)]
    pub struct MockProvider {
        pub backends: Vec<String>,
        pub channels: Vec<Channel>,
        pub raw: HashMap<String, Vec<DataPoint>>,
        pub binned: HashMap<String, Vec<BinnedPoint>>,
        pub failing: HashSet<String>,
        pub unresolvable: HashSet<String>,
        pub delays: HashMap<String, Duration>,
        pub calls: Mutex<Vec<String>>,
    }

    impl MockProvider {
        pub fn with_channels(channels: Vec<Channel>) -> Self {
            let mut backends: Vec<String> = channels.iter().map(|c| c.backend.clone()).collect();
            backends.dedup();
            Self {
                backends,
                channels,
                ..Self::default()
            }
        }

        /// `bins` bins, each holding `per_bin` events.
        pub fn bins(bins: usize, per_bin: u64) -> Vec<BinnedPoint> {
            (0..bins)
                .map(|i| BinnedPoint {
                    x: i as i64 * 1000,
                    y: BinStats {
                        min: 0.0,
                        mean: i as f64,
                        max: 10.0,
                        count: per_bin,
                    },
                })
                .collect()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn record(&self, kind: &str, channel: &str) -> Result<(), QueryError> {
            self.calls.lock().unwrap().push(format!("{}:{}", kind, channel));
            if let Some(delay) = self.delays.get(channel) {
                tokio::time::sleep(*delay).await;
            }
            let failed = if kind == "search" {
                self.unresolvable.contains(channel)
            } else {
                self.failing.contains(channel)
            };
            if failed {
                return Err(QueryError::Status {
                    status: 500,
                    body: format!("{} unavailable", channel),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl QueryProvider for MockProvider {
        async fn list_backends(&self) -> Result<Vec<String>, QueryError> {
            Ok(self.backends.clone())
        }

        async fn search_channels(&self, regex: Option<&str>) -> Result<Vec<Channel>, QueryError> {
            let Some(pattern) = regex else {
                return Ok(self.channels.clone());
            };
            let pattern = Regex::new(pattern).map_err(|e| QueryError::Status {
                status: 400,
                body: e.to_string(),
            })?;
            let matching: Vec<Channel> = self
                .channels
                .iter()
                .filter(|c| pattern.is_match(&c.name))
                .cloned()
                .collect();
            for channel in &matching {
                self.record("search", &channel.name).await?;
            }
            Ok(matching)
        }

        async fn query_raw_data(
            &self,
            channel: &Channel,
            _range: &QueryRange,
        ) -> Result<RawSeries, QueryError> {
            self.record("raw", &channel.name).await?;
            Ok(RawSeries {
                name: channel.name.clone(),
                datapoints: self.raw.get(&channel.name).cloned().unwrap_or_default(),
            })
        }

        async fn query_binned_data(
            &self,
            channel: &Channel,
            _range: &QueryRange,
            _bin_count: usize,
        ) -> Result<BinnedSeries, QueryError> {
            self.record("binned", &channel.name).await?;
            Ok(BinnedSeries {
                name: channel.name.clone(),
                datapoints: self.binned.get(&channel.name).cloned().unwrap_or_default(),
            })
        }

        async fn query_string_data(
            &self,
            channel: &Channel,
            _range: &QueryRange,
        ) -> Result<RawSeries, QueryError> {
            self.record("string", &channel.name).await?;
            Ok(RawSeries {
                name: channel.name.clone(),
                datapoints: self.raw.get(&channel.name).cloned().unwrap_or_default(),
            })
        }

        async fn query_channel_state(
            &self,
            channel: &ChannelId,
        ) -> Result<ChannelState, QueryError> {
            self.record("state", &channel.name).await?;
            Ok(ChannelState {
                connected: true,
                recording: false,
                latest_event_date: None,
            })
        }
    }
}
