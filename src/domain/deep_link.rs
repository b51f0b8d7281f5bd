//! Bidirectional codec between a plot configuration and a URL query string.
//!
//! Encoding writes `c{i}`, `l{i}`, `y{i}`, `min{i}`, `max{i}` for the first
//! [`MAX_DEEP_LINK_CHANNELS`] series (1-indexed), the time range in either
//! absolute (`startTime`/`endTime`) or relative (`duration`) form, and the
//! plot-wide `queryExpansion`, `title` and `plotVariation` parameters.
//! Decoding produces a [`DeepLinkRequest`]; channel metadata is resolved
//! elsewhere.

use super::channel::ChannelId;
use super::plot::{AxisType, PlotState, PlotVariation};
use chrono::{DateTime, NaiveDateTime, SecondsFormat};
use std::collections::HashMap;

pub const MAX_DEEP_LINK_CHANNELS: usize = 16;

/// Window used when a link carries no time information.
pub const DEFAULT_LINK_DURATION_MS: i64 = 12 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeMode {
    #[default]
    Absolute,
    Relative,
}

/// Per-channel part of a decoded link.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRequest {
    pub id: ChannelId,
    pub label: Option<String>,
    pub axis_type: Option<AxisType>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ChannelRequest {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            label: None,
            axis_type: None,
            min: None,
            max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeepLinkRequest {
    pub start_time: i64,
    pub end_time: i64,
    pub time_mode: TimeMode,
    pub query_expansion: bool,
    pub title: Option<String>,
    pub plot_variation: Option<PlotVariation>,
    pub channels: Vec<ChannelRequest>,
}

pub fn encode(state: &PlotState, mode: TimeMode) -> String {
    let mut params: Vec<(String, String)> = Vec::new();

    for (i, series) in state.series.iter().take(MAX_DEEP_LINK_CHANNELS).enumerate() {
        let n = i + 1;
        params.push((format!("c{}", n), series.channel.id().to_string()));
        if series.label != series.channel.name {
            params.push((format!("l{}", n), series.label.clone()));
        }
        let Some(axis) = state.axes.get(series.y_axis_index) else {
            continue;
        };
        if axis.axis_type != AxisType::Linear {
            params.push((format!("y{}", n), axis.axis_type.as_str().to_string()));
        }
        if let Some(min) = axis.min {
            params.push((format!("min{}", n), min.to_string()));
        }
        if let Some(max) = axis.max {
            params.push((format!("max{}", n), max.to_string()));
        }
    }

    match mode {
        TimeMode::Absolute => {
            params.push(("startTime".to_string(), format_iso(state.start_time)));
            params.push(("endTime".to_string(), format_iso(state.end_time)));
        }
        TimeMode::Relative => {
            let duration = state.end_time - state.start_time;
            params.push(("duration".to_string(), duration.to_string()));
        }
    }

    let expansion = if state.query_expansion { "1" } else { "0" };
    params.push(("queryExpansion".to_string(), expansion.to_string()));
    if let Some(title) = state.title.as_ref().filter(|t| !t.is_empty()) {
        params.push(("title".to_string(), title.clone()));
    }
    params.push((
        "plotVariation".to_string(),
        state.plot_variation.as_str().to_string(),
    ));

    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Split a raw query string into decoded key/value pairs. Later keys win.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match (decode_component(key), decode_component(value)) {
            (Some(key), Some(value)) => {
                params.insert(key, value);
            }
            _ => tracing::debug!("Skipping undecodable query pair '{}'", pair),
        }
    }
    params
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}

pub fn decode(params: &HashMap<String, String>, now_ms: i64) -> DeepLinkRequest {
    let mut end_time = now_ms;
    let mut start_time = end_time - DEFAULT_LINK_DURATION_MS;
    let duration = params.get("duration").and_then(|d| parse_time_value(d));
    if let Some(duration) = duration {
        start_time = end_time - duration;
    }
    let explicit_start = params.get("startTime").and_then(|v| parse_time_value(v));
    let explicit_end = params.get("endTime").and_then(|v| parse_time_value(v));
    if let Some(start) = explicit_start {
        start_time = start;
    }
    if let Some(end) = explicit_end {
        end_time = end;
    }
    let time_mode = if duration.is_some() && explicit_start.is_none() && explicit_end.is_none() {
        TimeMode::Relative
    } else {
        TimeMode::Absolute
    };

    let mut channels = Vec::new();
    for n in 1..=MAX_DEEP_LINK_CHANNELS {
        let Some(raw) = params.get(&format!("c{}", n)) else {
            continue;
        };
        let id = match raw.parse::<ChannelId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::info!("Dropping deep-link channel c{}: {}", n, e);
                continue;
            }
        };
        let mut request = ChannelRequest::new(id);
        request.label = params.get(&format!("l{}", n)).cloned();
        request.axis_type = params
            .get(&format!("y{}", n))
            .and_then(|y| y.parse::<AxisType>().ok());
        request.min = params.get(&format!("min{}", n)).and_then(|v| parse_bound(v));
        request.max = params.get(&format!("max{}", n)).and_then(|v| parse_bound(v));
        channels.push(request);
    }

    DeepLinkRequest {
        start_time,
        end_time,
        time_mode,
        query_expansion: params
            .get("queryExpansion")
            .is_some_and(|v| v == "1" || v == "true"),
        title: params.get("title").filter(|t| !t.is_empty()).cloned(),
        plot_variation: params
            .get("plotVariation")
            .and_then(|v| v.parse::<PlotVariation>().ok()),
        channels,
    }
}

/// Epoch millis when all digits, otherwise an ISO-8601 timestamp.
pub fn parse_time_value(value: &str) -> Option<i64> {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc().timestamp_millis()),
        Err(_) => {
            tracing::info!("Ignoring unparseable time value '{}'", value);
            None
        }
    }
}

fn parse_bound(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn format_iso(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::{Channel, DataType};
    use crate::domain::plot::{PlotCommand, reduce};

    const NOW: i64 = 1_700_000_000_000;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn plot_with(n: usize) -> PlotState {
        let channels = (0..n)
            .map(|i| Channel::new("sf-databuffer", format!("CH:{}", i), DataType::Float64))
            .collect();
        reduce(
            PlotState::with_window(NOW - 3_600_000, NOW),
            PlotCommand::SetSelectedChannels(channels),
        )
    }

    #[test]
    fn test_round_trip_absolute() {
        let mut state = plot_with(3);
        let commands = vec![
            PlotCommand::ChangeDataSeriesLabel {
                index: 1,
                label: "Beam current & more".to_string(),
            },
            PlotCommand::SetAxisType {
                index: 2,
                axis_type: AxisType::Logarithmic,
            },
            PlotCommand::SetAxisMin {
                index: 0,
                value: Some(-2.5),
            },
            PlotCommand::SetAxisMax {
                index: 0,
                value: Some(10.0),
            },
            PlotCommand::SetTitle(Some("Shift report".to_string())),
            PlotCommand::SetQueryExpansion(true),
            PlotCommand::ChangePlotVariation(PlotVariation::SeparatePlots),
        ];
        for command in commands {
            state = reduce(state, command);
        }

        let query = encode(&state, TimeMode::Absolute);
        let decoded = decode(&parse_query(&query), 0);

        assert_eq!(decoded.start_time, state.start_time);
        assert_eq!(decoded.end_time, state.end_time);
        assert_eq!(decoded.time_mode, TimeMode::Absolute);
        assert!(decoded.query_expansion);
        assert_eq!(decoded.title.as_deref(), Some("Shift report"));
        assert_eq!(decoded.plot_variation, Some(PlotVariation::SeparatePlots));

        let ids: Vec<_> = decoded.channels.iter().map(|c| c.id.clone()).collect();
        let expected: Vec<_> = state.series.iter().map(|s| s.channel.id()).collect();
        assert_eq!(ids, expected);
        assert_eq!(decoded.channels[0].label, None);
        assert_eq!(decoded.channels[0].min, Some(-2.5));
        assert_eq!(decoded.channels[0].max, Some(10.0));
        assert_eq!(
            decoded.channels[1].label.as_deref(),
            Some("Beam current & more")
        );
        assert_eq!(decoded.channels[2].axis_type, Some(AxisType::Logarithmic));
        assert_eq!(decoded.channels[1].axis_type, None);
    }

    #[test]
    fn test_round_trip_relative_keeps_duration() {
        let state = plot_with(1);
        let query = encode(&state, TimeMode::Relative);
        assert!(query.contains("duration=3600000"));
        assert!(!query.contains("startTime"));
        assert!(!query.contains("endTime"));

        let decoded = decode(&parse_query(&query), NOW + 5_000);
        assert_eq!(decoded.time_mode, TimeMode::Relative);
        assert_eq!(decoded.end_time, NOW + 5_000);
        assert_eq!(decoded.end_time - decoded.start_time, 3_600_000);
    }

    #[test]
    fn test_encode_truncates_to_sixteen_channels() {
        let query = encode(&plot_with(20), TimeMode::Absolute);
        let keys: Vec<_> = parse_query(&query).into_keys().collect();
        for n in 1..=16 {
            assert!(keys.contains(&format!("c{}", n)));
        }
        for n in 17..=20 {
            assert!(!keys.contains(&format!("c{}", n)));
        }
    }

    #[test]
    fn test_encode_omits_defaults() {
        let query = encode(&plot_with(1), TimeMode::Absolute);
        let params = parse_query(&query);
        assert!(!params.contains_key("l1"));
        assert!(!params.contains_key("y1"));
        assert!(!params.contains_key("min1"));
        assert!(!params.contains_key("title"));
        assert_eq!(params["queryExpansion"], "0");
        assert_eq!(params["c1"], "sf-databuffer/CH:0");
        assert!(query.contains("c1=sf-databuffer%2FCH%3A0"));
    }

    #[test]
    fn test_decode_skips_gaps_and_out_of_range_indices() {
        let decoded = decode(
            &params(&[
                ("c0", "be/zero"),
                ("c4", "be/ch1"),
                ("c9", "be/ch2"),
                ("c17", "be/late"),
            ]),
            NOW,
        );
        let names: Vec<_> = decoded.channels.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(names, vec!["be/ch1", "be/ch2"]);
    }

    #[test]
    fn test_decode_ignores_invalid_overrides() {
        let decoded = decode(
            &params(&[
                ("c1", "be/ch"),
                ("y1", "cubic"),
                ("min1", "low"),
                ("max1", "4e2"),
                ("c2", "missing-separator"),
            ]),
            NOW,
        );
        assert_eq!(decoded.channels.len(), 1);
        assert_eq!(decoded.channels[0].axis_type, None);
        assert_eq!(decoded.channels[0].min, None);
        assert_eq!(decoded.channels[0].max, Some(400.0));
    }

    #[test]
    fn test_decode_time_precedence() {
        let decoded = decode(&params(&[]), NOW);
        assert_eq!(decoded.end_time, NOW);
        assert_eq!(decoded.start_time, NOW - DEFAULT_LINK_DURATION_MS);

        let decoded = decode(&params(&[("duration", "60000")]), NOW);
        assert_eq!(decoded.start_time, NOW - 60_000);

        let decoded = decode(
            &params(&[
                ("duration", "60000"),
                ("startTime", "1000"),
                ("endTime", "2023-11-14T22:13:20.000Z"),
            ]),
            NOW,
        );
        assert_eq!(decoded.start_time, 1000);
        assert_eq!(decoded.end_time, 1_700_000_000_000);
        assert_eq!(decoded.time_mode, TimeMode::Absolute);

        // An explicit end alone still leaves start derived from `now - duration`.
        let decoded = decode(&params(&[("duration", "60000"), ("endTime", "5000")]), NOW);
        assert_eq!(decoded.start_time, NOW - 60_000);
        assert_eq!(decoded.end_time, 5000);
    }

    #[test]
    fn test_parse_time_value_forms() {
        assert_eq!(parse_time_value("1700000000000"), Some(NOW));
        assert_eq!(parse_time_value("2023-11-14T22:13:20Z"), Some(NOW));
        assert_eq!(parse_time_value("2023-11-14T23:13:20+01:00"), Some(NOW));
        assert_eq!(parse_time_value("2023-11-14T22:13:20.000"), Some(NOW));
        assert_eq!(parse_time_value("yesterday"), None);
        assert_eq!(parse_time_value("-5"), None);
    }

    #[test]
    fn test_parse_query_decodes_components() {
        let params = parse_query("?title=Hello+World%21&c1=be%2Fa&flag");
        assert_eq!(params["title"], "Hello World!");
        assert_eq!(params["c1"], "be/a");
        assert_eq!(params["flag"], "");
    }
}
