// Domain layer - Plot model, codecs and pure derivations
pub mod channel;
pub mod deep_link;
pub mod export_format;
pub mod plot;
pub mod selectors;
pub mod telemetry;
