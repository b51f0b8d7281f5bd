// Plot configuration aggregate and its command reducer
use super::channel::{Channel, ChannelId};
use super::telemetry::{DataPoint, SeriesData};
use chrono::Utc;
use serde::Serialize;
use std::str::FromStr;

/// Width of the window a fresh plot starts with.
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisSide {
    Left,
    Right,
}

impl AxisSide {
    /// Sides alternate strictly by position: even left, odd right.
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            AxisSide::Left
        } else {
            AxisSide::Right
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisType {
    #[default]
    Linear,
    Logarithmic,
}

impl AxisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisType::Linear => "linear",
            AxisType::Logarithmic => "logarithmic",
        }
    }
}

impl FromStr for AxisType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(AxisType::Linear),
            "logarithmic" => Ok(AxisType::Logarithmic),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlotVariation {
    SingleAxis,
    #[default]
    SeparateAxes,
    SeparatePlots,
}

impl PlotVariation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlotVariation::SingleAxis => "single-axis",
            PlotVariation::SeparateAxes => "separate-axes",
            PlotVariation::SeparatePlots => "separate-plots",
        }
    }
}

impl FromStr for PlotVariation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single-axis" => Ok(PlotVariation::SingleAxis),
            "separate-axes" => Ok(PlotVariation::SeparateAxes),
            "separate-plots" => Ok(PlotVariation::SeparatePlots),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YAxis {
    pub title: String,
    pub unit: Option<String>,
    pub side: AxisSide,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(rename = "type")]
    pub axis_type: AxisType,
    pub categories: Option<Vec<String>>,
}

impl YAxis {
    fn for_channel(channel: &Channel, index: usize) -> Self {
        Self {
            title: channel.name.clone(),
            unit: channel.unit.clone(),
            side: AxisSide::for_index(index),
            min: None,
            max: None,
            axis_type: AxisType::Linear,
            categories: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotDataSeries {
    pub channel: Channel,
    pub label: String,
    pub y_axis_index: usize,
    pub fetching: bool,
    pub error: Option<String>,
    pub request_sent_at: Option<i64>,
    pub request_finished_at: Option<i64>,
    pub datapoints: Option<Vec<DataPoint>>,
    pub is_reduced: Option<bool>,
    pub num_datapoints: Option<u64>,
    /// Id of the request currently allowed to write into this series.
    #[serde(skip)]
    pub request_id: Option<u64>,
}

impl PlotDataSeries {
    fn for_channel(channel: Channel, y_axis_index: usize) -> Self {
        Self {
            label: channel.name.clone(),
            channel,
            y_axis_index,
            fetching: false,
            error: None,
            request_sent_at: None,
            request_finished_at: None,
            datapoints: None,
            is_reduced: None,
            num_datapoints: None,
            request_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Granularity {
    #[serde(rename = "5s")]
    FiveSeconds,
    #[default]
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "1h")]
    OneHour,
}

impl Granularity {
    pub fn step_ms(&self) -> i64 {
        match self {
            Granularity::FiveSeconds => 5_000,
            Granularity::OneMinute => 60_000,
            Granularity::OneHour => 3_600_000,
        }
    }
}

impl FromStr for Granularity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5s" => Ok(Granularity::FiveSeconds),
            "1min" => Ok(Granularity::OneMinute),
            "1h" | "1hr" => Ok(Granularity::OneHour),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSeparator {
    #[default]
    Tab,
    Comma,
    Semicolon,
}

impl FieldSeparator {
    pub fn delimiter(&self) -> u8 {
        match self {
            FieldSeparator::Tab => b'\t',
            FieldSeparator::Comma => b',',
            FieldSeparator::Semicolon => b';',
        }
    }
}

impl FromStr for FieldSeparator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tab" => Ok(FieldSeparator::Tab),
            "comma" => Ok(FieldSeparator::Comma),
            "semicolon" => Ok(FieldSeparator::Semicolon),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldQuote {
    #[default]
    None,
    Single,
    Double,
}

impl FieldQuote {
    pub fn quote_byte(&self) -> Option<u8> {
        match self {
            FieldQuote::None => None,
            FieldQuote::Single => Some(b'\''),
            FieldQuote::Double => Some(b'"'),
        }
    }
}

impl FromStr for FieldQuote {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(FieldQuote::None),
            "single" => Ok(FieldQuote::Single),
            "double" => Ok(FieldQuote::Double),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    #[default]
    CrLf,
    Lf,
}

impl FromStr for LineTerminator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crlf" => Ok(LineTerminator::CrLf),
            "lf" => Ok(LineTerminator::Lf),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub granularity: Granularity,
    pub separator: FieldSeparator,
    pub quote: FieldQuote,
    pub line_terminator: LineTerminator,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotState {
    pub start_time: i64,
    pub end_time: i64,
    pub query_expansion: bool,
    pub plot_variation: PlotVariation,
    pub title: Option<String>,
    pub series: Vec<PlotDataSeries>,
    pub axes: Vec<YAxis>,
    pub export: ExportSettings,
    #[serde(skip)]
    next_request_id: u64,
}

impl PlotState {
    pub fn with_window(start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time,
            query_expansion: false,
            plot_variation: PlotVariation::default(),
            title: None,
            series: Vec::new(),
            axes: Vec::new(),
            export: ExportSettings::default(),
            next_request_id: 1,
        }
    }

    pub fn is_selected(&self, id: &ChannelId) -> bool {
        self.series.iter().any(|s| s.channel.matches(id))
    }
}

impl Default for PlotState {
    fn default() -> Self {
        let now = Utc::now().timestamp_millis();
        Self::with_window(now - DEFAULT_WINDOW_MS, now)
    }
}

/// Every mutation of a [`PlotState`] goes through one of these.
#[derive(Debug, Clone)]
pub enum PlotCommand {
    SelectChannel(Channel),
    UnselectChannel(usize),
    SetSelectedChannels(Vec<Channel>),
    ClearSelection,
    ChangeTime { start_time: i64, end_time: i64 },
    ChangeStartTime(i64),
    ChangeEndTime(i64),
    SetQueryExpansion(bool),
    SetTitle(Option<String>),
    ChangeDataSeriesLabel { index: usize, label: String },
    SetAxisMin { index: usize, value: Option<f64> },
    SetAxisMax { index: usize, value: Option<f64> },
    SetAxisType { index: usize, axis_type: AxisType },
    ChangePlotVariation(PlotVariation),
    SetExportOptions(ExportSettings),
    DrawPlotRequest { index: usize, sent_at: i64 },
    DrawPlotSuccess {
        index: usize,
        request_id: u64,
        finished_at: i64,
        data: SeriesData,
    },
    DrawPlotFailure {
        index: usize,
        request_id: u64,
        finished_at: i64,
        error: String,
    },
}

pub fn reduce(mut state: PlotState, command: PlotCommand) -> PlotState {
    match command {
        PlotCommand::SelectChannel(channel) => {
            if state.is_selected(&channel.id()) {
                return state;
            }
            let index = state.series.len();
            state.axes.push(YAxis::for_channel(&channel, index));
            state.series.push(PlotDataSeries::for_channel(channel, index));
        }
        PlotCommand::UnselectChannel(index) => {
            if index >= state.series.len() {
                tracing::debug!("Ignoring unselect of missing series {}", index);
                return state;
            }
            state.series.remove(index);
            state.axes.remove(index);
            for (i, axis) in state.axes.iter_mut().enumerate().skip(index) {
                axis.side = AxisSide::for_index(i);
            }
            for series in state.series.iter_mut().filter(|s| s.y_axis_index > index) {
                series.y_axis_index -= 1;
            }
        }
        PlotCommand::SetSelectedChannels(channels) => {
            state.series.clear();
            state.axes.clear();
            for channel in channels {
                state = reduce(state, PlotCommand::SelectChannel(channel));
            }
        }
        PlotCommand::ClearSelection => {
            state.series.clear();
            state.axes.clear();
        }
        PlotCommand::ChangeTime {
            start_time,
            end_time,
        } => {
            state.start_time = start_time;
            state.end_time = end_time;
        }
        PlotCommand::ChangeStartTime(start_time) => state.start_time = start_time,
        PlotCommand::ChangeEndTime(end_time) => state.end_time = end_time,
        PlotCommand::SetQueryExpansion(expand) => state.query_expansion = expand,
        PlotCommand::SetTitle(title) => state.title = title.filter(|t| !t.is_empty()),
        PlotCommand::ChangeDataSeriesLabel { index, label } => {
            let Some(series) = state.series.get_mut(index) else {
                return state;
            };
            series.label = label.clone();
            let axis_index = series.y_axis_index;
            if let Some(axis) = state.axes.get_mut(axis_index) {
                axis.title = label;
            }
        }
        PlotCommand::SetAxisMin { index, value } => {
            if let Some(axis) = state.axes.get_mut(index) {
                axis.min = value;
            }
        }
        PlotCommand::SetAxisMax { index, value } => {
            if let Some(axis) = state.axes.get_mut(index) {
                axis.max = value;
            }
        }
        PlotCommand::SetAxisType { index, axis_type } => {
            if let Some(axis) = state.axes.get_mut(index) {
                axis.axis_type = axis_type;
            }
        }
        PlotCommand::ChangePlotVariation(variation) => state.plot_variation = variation,
        PlotCommand::SetExportOptions(export) => state.export = export,
        PlotCommand::DrawPlotRequest { index, sent_at } => {
            let request_id = state.next_request_id;
            let Some(series) = state.series.get_mut(index) else {
                return state;
            };
            state.next_request_id += 1;
            series.fetching = true;
            series.error = None;
            series.datapoints = None;
            series.is_reduced = None;
            series.num_datapoints = None;
            series.request_sent_at = Some(sent_at);
            series.request_finished_at = None;
            series.request_id = Some(request_id);
        }
        PlotCommand::DrawPlotSuccess {
            index,
            request_id,
            finished_at,
            data,
        } => {
            let Some(series) = current_request(&mut state, index, request_id) else {
                return state;
            };
            series.fetching = false;
            series.request_finished_at = Some(finished_at);
            series.is_reduced = Some(data.is_reduced);
            series.num_datapoints = Some(data.num_datapoints);
            let categories = series
                .channel
                .data_type
                .is_string()
                .then(|| distinct_values(&data.datapoints));
            series.datapoints = Some(data.datapoints);
            let axis_index = series.y_axis_index;
            if let Some(axis) = state.axes.get_mut(axis_index) {
                axis.categories = categories;
            }
        }
        PlotCommand::DrawPlotFailure {
            index,
            request_id,
            finished_at,
            error,
        } => {
            let Some(series) = current_request(&mut state, index, request_id) else {
                return state;
            };
            series.fetching = false;
            series.request_finished_at = Some(finished_at);
            series.error = Some(error);
        }
    }
    state
}

/// The series at `index`, only if `request_id` is still the newest request for it.
fn current_request(
    state: &mut PlotState,
    index: usize,
    request_id: u64,
) -> Option<&mut PlotDataSeries> {
    let series = state.series.get_mut(index)?;
    if series.request_id != Some(request_id) {
        tracing::debug!(
            "Dropping stale response {} for series {} ({})",
            request_id,
            index,
            series.channel.name
        );
        return None;
    }
    Some(series)
}

fn distinct_values(points: &[DataPoint]) -> Vec<String> {
    let mut seen = Vec::new();
    for point in points {
        let value = point.y.to_string();
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}
