// Export service - Fetch full-resolution data for every series and render it as text
use crate::application::query_provider::{ProviderRegistry, QueryError, QueryRange};
use crate::domain::channel::Channel;
use crate::domain::deep_link::format_iso;
use crate::domain::export_format::{ExportColumn, GridError, build_rows, grid_len, serialize};
use crate::domain::plot::PlotState;
use futures::future::try_join_all;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExportError {
    #[error("export of {channel} failed: {source}")]
    Fetch {
        channel: String,
        #[source]
        source: QueryError,
    },
    #[error("nothing to export: no channels selected")]
    NoChannels,
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("could not render export: {0}")]
    Render(String),
}

/// Upper bound on grid rows per export.
pub const DEFAULT_MAX_EXPORT_ROWS: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub content: String,
}

#[derive(Clone)]
pub struct ExportService {
    registry: Arc<ProviderRegistry>,
    max_rows: usize,
}

impl ExportService {
    pub fn new(registry: Arc<ProviderRegistry>, max_rows: usize) -> Self {
        Self { registry, max_rows }
    }

    /// Export all series of `state` using its export settings.
    ///
    /// Any failed fetch aborts the export. Ranges whose grid exceeds the row
    /// limit are rejected before any data is fetched.
    pub async fn export(
        &self,
        state: &PlotState,
        created_at: i64,
    ) -> Result<ExportFile, ExportError> {
        if state.series.is_empty() {
            return Err(ExportError::NoChannels);
        }
        let step = state.export.granularity.step_ms();
        grid_len(state.start_time, state.end_time, step, self.max_rows)
            .inspect_err(|e| tracing::warn!("Rejecting export: {}", e))?;

        let range =
            QueryRange::from_millis(state.start_time, state.end_time, state.query_expansion);

        let fetches = state
            .series
            .iter()
            .map(|s| self.fetch_column(&s.channel, &range));
        let columns = try_join_all(fetches).await?;

        let rows = build_rows(&columns, state.start_time, state.end_time, step, self.max_rows)?;
        tracing::info!(
            "Exporting {} channels, {} rows at {} ms steps",
            columns.len(),
            rows.len().saturating_sub(1),
            step
        );

        Ok(ExportFile {
            filename: format!("export_{}.csv", format_iso(created_at)),
            content: serialize(&rows, &state.export)
                .map_err(|e| ExportError::Render(e.to_string()))?,
        })
    }

    async fn fetch_column(
        &self,
        channel: &Channel,
        range: &QueryRange,
    ) -> Result<ExportColumn, ExportError> {
        let fetch = async {
            let provider = self.registry.provider_for(&channel.backend)?;
            if channel.data_type.is_string() {
                provider.query_string_data(channel, range).await
            } else {
                provider.query_raw_data(channel, range).await
            }
        };
        let series = fetch.await.map_err(|source| {
            tracing::error!("Export fetch for {} failed: {}", channel.id(), source);
            ExportError::Fetch {
                channel: channel.id().to_string(),
                source,
            }
        })?;
        Ok(ExportColumn {
            name: channel.name.clone(),
            datapoints: series.datapoints,
        })
    }
}
