// Data acquisition - Per-series concurrent fetches with raw-vs-binned selection
use crate::application::plot_store::PlotStore;
use crate::application::query_provider::{ProviderRegistry, QueryError, QueryRange};
use crate::domain::channel::Channel;
use crate::domain::plot::PlotCommand;
use crate::domain::selectors::RequestSummary;
use crate::domain::telemetry::{DataPoint, SeriesData};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bins requested per aggregated query; also the raw re-fetch threshold.
pub const DEFAULT_BIN_COUNT: usize = 512;

/// Progress of a draw, in completion order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawEvent {
    Started {
        channels: Vec<String>,
        sent_at: i64,
    },
    SeriesFinished {
        index: usize,
        channel: String,
        is_reduced: bool,
        num_datapoints: u64,
        datapoints: Vec<DataPoint>,
    },
    SeriesFailed {
        index: usize,
        channel: String,
        error: String,
    },
    Complete {
        summary: RequestSummary,
    },
}

/// Fetch tasks spawned by one draw.
pub struct DrawBatch {
    handles: Vec<JoinHandle<()>>,
}

impl DrawBatch {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait until every series task has written its result.
    pub async fn finished(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!("Series fetch task failed: {}", e);
            }
        }
    }
}

#[derive(Clone)]
pub struct AcquisitionService {
    registry: Arc<ProviderRegistry>,
    bin_count: usize,
}

impl AcquisitionService {
    pub fn new(registry: Arc<ProviderRegistry>, bin_count: usize) -> Self {
        Self {
            registry,
            bin_count,
        }
    }

    /// Start one independent fetch per selected series.
    ///
    /// Each series is moved to `fetching` before its task is spawned; results
    /// land in `store` as they arrive, in no particular order. A result is
    /// only applied while its request is still the newest one for that
    /// series, so a later draw always wins over an earlier one.
    pub fn draw_plot(
        &self,
        store: &PlotStore,
        events: Option<mpsc::Sender<DrawEvent>>,
    ) -> DrawBatch {
        let (start, end, expand, count) = store.read(|s| {
            (s.start_time, s.end_time, s.query_expansion, s.series.len())
        });
        let range = QueryRange::from_millis(start, end, expand);
        let sent_at = now_ms();

        if let Some(tx) = &events {
            let channels: Vec<String> =
                store.read(|s| s.series.iter().map(|x| x.channel.id().to_string()).collect());
            let _ = tx.try_send(DrawEvent::Started { channels, sent_at });
        }

        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let request = store.update(PlotCommand::DrawPlotRequest { index, sent_at }, |s| {
                s.series
                    .get(index)
                    .and_then(|x| Some((x.channel.clone(), x.request_id?)))
            });
            let Some((channel, request_id)) = request else {
                continue;
            };

            let service = self.clone();
            let store = store.clone();
            let range = range.clone();
            let tx = events.clone();

            handles.push(tokio::spawn(async move {
                let result = service.fetch_series_data(&channel, &range).await;
                let finished_at = now_ms();
                let event = match result {
                    Ok(data) => {
                        tracing::debug!(
                            "Series {} ({}) finished: {} datapoints, reduced={}",
                            index,
                            channel.id(),
                            data.num_datapoints,
                            data.is_reduced
                        );
                        let event = tx.as_ref().map(|_| DrawEvent::SeriesFinished {
                            index,
                            channel: channel.id().to_string(),
                            is_reduced: data.is_reduced,
                            num_datapoints: data.num_datapoints,
                            datapoints: data.datapoints.clone(),
                        });
                        store.dispatch(PlotCommand::DrawPlotSuccess {
                            index,
                            request_id,
                            finished_at,
                            data,
                        });
                        event
                    }
                    Err(e) => {
                        tracing::warn!("Fetching {} failed: {}", channel.id(), e);
                        store.dispatch(PlotCommand::DrawPlotFailure {
                            index,
                            request_id,
                            finished_at,
                            error: e.to_string(),
                        });
                        Some(DrawEvent::SeriesFailed {
                            index,
                            channel: channel.id().to_string(),
                            error: e.to_string(),
                        })
                    }
                };
                if let (Some(tx), Some(event)) = (tx, event) {
                    let _ = tx.send(event).await;
                }
            }));
        }

        DrawBatch { handles }
    }

    /// Draw and report progress on the returned channel, ending with `Complete`.
    pub fn stream_draw(&self, store: &PlotStore) -> mpsc::Receiver<DrawEvent> {
        let capacity = store.read(|s| s.series.len()) + 2;
        let (tx, rx) = mpsc::channel(capacity);
        let batch = self.draw_plot(store, Some(tx.clone()));

        let store = store.clone();
        tokio::spawn(async move {
            batch.finished().await;
            let summary = store.read(RequestSummary::of);
            let _ = tx.send(DrawEvent::Complete { summary }).await;
        });

        rx
    }

    /// Fetch one channel, choosing aggregated or raw data by event count.
    pub async fn fetch_series_data(
        &self,
        channel: &Channel,
        range: &QueryRange,
    ) -> Result<SeriesData, QueryError> {
        let provider = self.registry.provider_for(&channel.backend)?;

        if channel.data_type.is_string() {
            let series = provider.query_string_data(channel, range).await?;
            return Ok(SeriesData {
                num_datapoints: series.datapoints.len() as u64,
                datapoints: series.datapoints,
                is_reduced: false,
            });
        }

        let binned = provider
            .query_binned_data(channel, range, self.bin_count)
            .await?;
        let events = binned.event_count();
        if events > 0 && events < self.bin_count as u64 {
            tracing::debug!(
                "{} has only {} events in range, fetching raw data",
                channel.id(),
                events
            );
            let raw = provider.query_raw_data(channel, range).await?;
            return Ok(SeriesData {
                num_datapoints: raw.datapoints.len() as u64,
                datapoints: raw.datapoints,
                is_reduced: false,
            });
        }

        Ok(SeriesData {
            datapoints: binned.mean_points(),
            is_reduced: true,
            num_datapoints: events,
        })
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
