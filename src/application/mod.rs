// Application layer - Use cases over the plot model
pub mod acquisition;
pub mod export_service;
pub mod plot_store;
pub mod preselect;
pub mod query_provider;
