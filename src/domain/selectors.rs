// Pure derivations over a plot state snapshot
use super::plot::{PlotDataSeries, PlotState};
use serde::Serialize;

pub fn pending_requests(state: &PlotState) -> usize {
    state.series.iter().filter(|s| s.fetching).count()
}

pub fn any_request_errors(state: &PlotState) -> bool {
    state.series.iter().any(|s| s.error.is_some())
}

pub fn all_requests_finished(state: &PlotState) -> bool {
    state.series.iter().all(|s| !s.fetching)
}

/// Earliest send time, or `None` if any series has not sent a request.
pub fn first_request_sent_at(state: &PlotState) -> Option<i64> {
    fold_timestamps(&state.series, |s| s.request_sent_at, i64::min)
}

/// Latest finish time, or `None` if any series has not finished.
pub fn last_request_finished_at(state: &PlotState) -> Option<i64> {
    fold_timestamps(&state.series, |s| s.request_finished_at, i64::max)
}

pub fn total_request_duration(state: &PlotState) -> Option<i64> {
    Some(last_request_finished_at(state)? - first_request_sent_at(state)?)
}

/// True once at least one series finished without error.
pub fn should_display_chart(state: &PlotState) -> bool {
    state
        .series
        .iter()
        .any(|s| !s.fetching && s.request_finished_at.is_some() && s.error.is_none())
}

pub fn channels_without_data(state: &PlotState) -> Vec<&PlotDataSeries> {
    state
        .series
        .iter()
        .filter(|s| s.datapoints.as_ref().is_some_and(|d| d.is_empty()))
        .collect()
}

fn fold_timestamps(
    series: &[PlotDataSeries],
    field: impl Fn(&PlotDataSeries) -> Option<i64>,
    pick: fn(i64, i64) -> i64,
) -> Option<i64> {
    let mut acc: Option<i64> = None;
    for s in series {
        let value = field(s)?;
        acc = Some(acc.map_or(value, |a| pick(a, value)));
    }
    acc
}

/// All derived aggregates at once, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub pending_requests: usize,
    pub any_request_errors: bool,
    pub all_requests_finished: bool,
    pub first_request_sent_at: Option<i64>,
    pub last_request_finished_at: Option<i64>,
    pub total_request_duration: Option<i64>,
    pub should_display_chart: bool,
    pub channels_without_data: Vec<String>,
}

impl RequestSummary {
    pub fn of(state: &PlotState) -> Self {
        Self {
            pending_requests: pending_requests(state),
            any_request_errors: any_request_errors(state),
            all_requests_finished: all_requests_finished(state),
            first_request_sent_at: first_request_sent_at(state),
            last_request_finished_at: last_request_finished_at(state),
            total_request_duration: total_request_duration(state),
            should_display_chart: should_display_chart(state),
            channels_without_data: channels_without_data(state)
                .into_iter()
                .map(|s| s.channel.id().to_string())
                .collect(),
        }
    }
}
