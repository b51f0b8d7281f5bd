// HTTP request handlers
use crate::application::export_service::ExportError;
use crate::application::plot_store::PlotStore;
use crate::application::preselect::{apply_plan, canonical_route};
use crate::domain::channel::{Channel, ChannelId};
use crate::domain::deep_link::{TimeMode, decode, parse_query};
use crate::domain::plot::{ExportSettings, PlotCommand, PlotState};
use crate::domain::selectors::RequestSummary;
use crate::infrastructure::chunked_json::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, attachment_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, Query, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub backend: Option<String>,
}

#[derive(Deserialize)]
pub struct ChannelStateQuery {
    pub c: String,
}

/// Plot state after a completed draw
#[derive(Serialize)]
pub struct PlotView {
    pub plot: PlotState,
    pub summary: RequestSummary,
    pub route: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_backends(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.registry.backends())
}

pub async fn search_channels(
    Query(query): Query<SearchQuery>,
    State(state): State<Arc<AppState>>,
) -> Json<Vec<Channel>> {
    let channels = state
        .registry
        .search(query.q.as_deref(), query.backend.as_deref())
        .await;
    Json(channels)
}

pub async fn channel_state(
    Query(query): Query<ChannelStateQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let id = match query.c.parse::<ChannelId>() {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    match state.registry.channel_state(&id).await {
        Ok(channel_state) => Json(channel_state).into_response(),
        Err(e) => {
            tracing::warn!("Channel state for {} failed: {}", id, e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Rebuild a plot from deep-link parameters, draw it and return the result
pub async fn plot(
    RawQuery(query): RawQuery,
    State(state): State<Arc<AppState>>,
) -> Json<PlotView> {
    let params = parse_query(query.as_deref().unwrap_or_default());
    let (store, mode) = open_deep_link(&state, &params).await;

    state.acquisition.draw_plot(&store, None).finished().await;
    Json(plot_view(&store, mode))
}

/// Same as [`plot`], streaming per-series results as they arrive
pub async fn plot_stream(
    RawQuery(query): RawQuery,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let params = parse_query(query.as_deref().unwrap_or_default());
    let (store, _) = open_deep_link(&state, &params).await;

    let rx = state.acquisition.stream_draw(&store);
    stream_from_receiver(rx)
}

/// Single-channel view for the last minute
pub async fn plot_channel(
    Path((backend, name)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let id = ChannelId::new(backend, name.trim_start_matches('/'));
    let channel = match state.registry.resolve_channel(&id).await {
        Ok(channel) => channel,
        Err(e) => return (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    };

    let store = PlotStore::new(PlotState::default());
    store.dispatch(PlotCommand::SetSelectedChannels(vec![channel]));
    state.acquisition.draw_plot(&store, None).finished().await;
    Json(plot_view(&store, TimeMode::Relative)).into_response()
}

/// Export the deep-linked plot as a delimited text file
pub async fn export(
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let params = parse_query(query.as_deref().unwrap_or_default());
    let (store, _) = open_deep_link(&state, &params).await;
    store.dispatch(PlotCommand::SetExportOptions(export_settings(&params)));

    let snapshot = store.snapshot();
    match state.export.export(&snapshot, Utc::now().timestamp_millis()).await {
        Ok(file) => {
            let compress = accepts_brotli(&headers);
            match attachment_response(&file.filename, file.content, compress).await {
                Ok(response) => response,
                Err(status) => status.into_response(),
            }
        }
        Err(e) => (export_status(&e), e.to_string()).into_response(),
    }
}

fn export_status(error: &ExportError) -> StatusCode {
    match error {
        ExportError::NoChannels | ExportError::Grid(_) => StatusCode::BAD_REQUEST,
        ExportError::Fetch { .. } => StatusCode::BAD_GATEWAY,
        ExportError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn open_deep_link(
    state: &AppState,
    params: &HashMap<String, String>,
) -> (PlotStore, TimeMode) {
    let request = decode(params, Utc::now().timestamp_millis());
    let mode = request.time_mode;
    let plan = state.preselect.resolve(request).await;
    (PlotStore::new(apply_plan(PlotState::default(), plan)), mode)
}

fn plot_view(store: &PlotStore, mode: TimeMode) -> PlotView {
    let plot = store.snapshot();
    PlotView {
        summary: RequestSummary::of(&plot),
        route: canonical_route(&plot, mode),
        plot,
    }
}

/// Export options from query parameters; unknown values keep the defaults.
fn export_settings(params: &HashMap<String, String>) -> ExportSettings {
    let defaults = ExportSettings::default();
    ExportSettings {
        granularity: parse_or(params, "granularity", defaults.granularity),
        separator: parse_or(params, "separator", defaults.separator),
        quote: parse_or(params, "quote", defaults.quote),
        line_terminator: parse_or(params, "newline", defaults.line_terminator),
    }
}

fn parse_or<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str, default: T) -> T {
    params
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
