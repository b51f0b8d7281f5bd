// Preselect - Rebuild a plot from a deep link
use crate::application::query_provider::ProviderRegistry;
use crate::domain::channel::{Channel, ChannelId};
use crate::domain::deep_link::{ChannelRequest, DeepLinkRequest, TimeMode, encode};
use crate::domain::plot::{PlotCommand, PlotState, reduce};
use futures::future::join_all;
use std::sync::Arc;

/// Route of the canonical plot view.
pub const PLOT_ROUTE: &str = "/plot";

/// A decoded link whose channels have all been resolved, in link order.
#[derive(Debug, Clone, PartialEq)]
pub struct PreselectPlan {
    pub request: DeepLinkRequest,
    pub channels: Vec<(Channel, ChannelRequest)>,
}

#[derive(Clone)]
pub struct PreselectService {
    registry: Arc<ProviderRegistry>,
}

impl PreselectService {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Look up metadata for every requested channel concurrently.
    ///
    /// Channels that fail to resolve are dropped; the rest keep the order in
    /// which the link listed them, regardless of which lookup returned first.
    pub async fn resolve(&self, mut request: DeepLinkRequest) -> PreselectPlan {
        let mut seen: Vec<ChannelId> = Vec::new();
        let requested: Vec<ChannelRequest> = std::mem::take(&mut request.channels)
            .into_iter()
            .filter(|c| {
                if seen.contains(&c.id) {
                    return false;
                }
                seen.push(c.id.clone());
                true
            })
            .collect();

        let lookups = requested
            .iter()
            .map(|c| self.registry.resolve_channel(&c.id));
        let results = join_all(lookups).await;

        let channels = requested
            .into_iter()
            .zip(results)
            .filter_map(|(requested, result)| match result {
                Ok(channel) => Some((channel, requested)),
                Err(e) => {
                    tracing::info!("Dropping {} from deep link: {}", requested.id, e);
                    None
                }
            })
            .collect();

        PreselectPlan { request, channels }
    }
}

/// Apply a resolved plan to `state`. The caller triggers the draw.
pub fn apply_plan(state: PlotState, plan: PreselectPlan) -> PlotState {
    let PreselectPlan { request, channels } = plan;
    let mut commands = Vec::new();

    if let Some(variation) = request.plot_variation {
        commands.push(PlotCommand::ChangePlotVariation(variation));
    }
    commands.push(PlotCommand::ChangeEndTime(request.end_time));
    commands.push(PlotCommand::ChangeStartTime(request.start_time));
    if request.title.is_some() {
        commands.push(PlotCommand::SetTitle(request.title));
    }
    commands.push(PlotCommand::SetQueryExpansion(request.query_expansion));
    commands.push(PlotCommand::SetSelectedChannels(
        channels.iter().map(|(channel, _)| channel.clone()).collect(),
    ));

    // Overrides follow the resolved position, not the link index.
    for (index, (_, overrides)) in channels.into_iter().enumerate() {
        if let Some(label) = overrides.label {
            commands.push(PlotCommand::ChangeDataSeriesLabel { index, label });
        }
        if let Some(axis_type) = overrides.axis_type {
            commands.push(PlotCommand::SetAxisType { index, axis_type });
        }
        if overrides.min.is_some() {
            commands.push(PlotCommand::SetAxisMin {
                index,
                value: overrides.min,
            });
        }
        if overrides.max.is_some() {
            commands.push(PlotCommand::SetAxisMax {
                index,
                value: overrides.max,
            });
        }
    }

    commands.into_iter().fold(state, reduce)
}

/// The plot view URL for `state`.
pub fn canonical_route(state: &PlotState, mode: TimeMode) -> String {
    format!("{}?{}", PLOT_ROUTE, encode(state, mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::query_provider::mock::MockProvider;
    use crate::domain::channel::DataType;
    use crate::domain::deep_link::{decode, parse_query};
    use crate::domain::plot::{AxisSide, AxisType, PlotVariation};
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000_000;

    fn service(provider: MockProvider) -> PreselectService {
        let provider = Arc::new(provider);
        let mut registry = ProviderRegistry::new();
        registry.register("be", provider);
        PreselectService::new(Arc::new(registry))
    }

    fn channels() -> Vec<Channel> {
        vec![
            Channel::new("be", "ch1", DataType::Float64).with_unit("A"),
            Channel::new("be", "ch2", DataType::String),
            Channel::new("be", "ch3", DataType::Float64),
        ]
    }

    #[tokio::test]
    async fn test_gaps_resolve_to_dense_list() {
        let service = service(MockProvider::with_channels(channels()));
        let request = decode(&parse_query("c4=be%2Fch1&c9=be%2Fch2"), NOW);

        let plan = service.resolve(request).await;

        let ids: Vec<String> = plan.channels.iter().map(|(c, _)| c.id().to_string()).collect();
        assert_eq!(ids, vec!["be/ch1", "be/ch2"]);
        assert_eq!(plan.channels[1].0.data_type, DataType::String);
    }

    #[tokio::test]
    async fn test_order_is_link_order_not_completion_order() {
        let mut provider = MockProvider::with_channels(channels());
        provider.delays.insert("ch1".into(), Duration::from_millis(30));
        let service = service(provider);
        let request = decode(&parse_query("c1=be/ch1&c2=be/ch3&c3=be/ch1"), NOW);

        let plan = service.resolve(request).await;

        let names: Vec<&str> = plan.channels.iter().map(|(c, _)| c.name.as_str()).collect();
        assert_eq!(names, vec!["ch1", "ch3"]);
    }

    #[tokio::test]
    async fn test_unresolved_channels_shift_overrides() {
        let mut provider = MockProvider::with_channels(channels());
        provider.unresolvable.insert("ch2".into());
        let service = service(provider);
        let query = "c1=be/missing&l1=Gone&c2=be/ch2&c3=nowhere/x&c5=be/ch3&l5=Third&y5=logarithmic&min5=1&max5=100\
                     &c6=be/ch1&startTime=1000&endTime=2000&title=Run&queryExpansion=1&plotVariation=single-axis";
        let request = decode(&parse_query(query), NOW);

        let plan = service.resolve(request).await;
        let state = apply_plan(PlotState::with_window(0, 1), plan);

        assert_eq!(state.series.len(), 2);
        assert_eq!(state.series[0].channel.name, "ch3");
        assert_eq!(state.series[0].label, "Third");
        assert_eq!(state.axes[0].title, "Third");
        assert_eq!(state.axes[0].axis_type, AxisType::Logarithmic);
        assert_eq!((state.axes[0].min, state.axes[0].max), (Some(1.0), Some(100.0)));
        assert_eq!(state.series[1].channel.name, "ch1");
        assert_eq!(state.series[1].label, "ch1");
        assert_eq!(state.axes[1].unit.as_deref(), Some("A"));
        assert_eq!(state.axes[1].side, AxisSide::Right);
        assert_eq!((state.start_time, state.end_time), (1000, 2000));
        assert_eq!(state.title.as_deref(), Some("Run"));
        assert!(state.query_expansion);
        assert_eq!(state.plot_variation, PlotVariation::SingleAxis);
    }

    #[tokio::test]
    async fn test_canonical_route_round_trips() {
        let service = service(MockProvider::with_channels(channels()));
        let request = decode(
            &parse_query("c1=be/ch2&l1=Mode&c2=be/ch3&max2=5&duration=600000"),
            NOW,
        );
        let mode = request.time_mode;
        let state = apply_plan(PlotState::with_window(0, 1), service.resolve(request).await);

        let route = canonical_route(&state, mode);
        assert!(route.starts_with("/plot?c1=be%2Fch2&l1=Mode&c2=be%2Fch3&max2=5&duration=600000"));

        let query = route.trim_start_matches("/plot?");
        let again = apply_plan(
            PlotState::with_window(0, 1),
            service.resolve(decode(&parse_query(query), NOW)).await,
        );
        assert_eq!(again.series, state.series);
        assert_eq!(again.axes, state.axes);
    }
}
