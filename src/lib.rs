//! Plot controller for time-series channels served by one or more query backends.
//!
//! Channels are selected into a [`domain::plot::PlotState`], fetched
//! concurrently by [`application::acquisition::AcquisitionService`], shared as
//! deep links through [`domain::deep_link`] and exported as delimited text by
//! [`application::export_service::ExportService`].

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
