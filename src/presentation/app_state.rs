// Application state for HTTP handlers
use crate::application::acquisition::AcquisitionService;
use crate::application::export_service::ExportService;
use crate::application::preselect::PreselectService;
use crate::application::query_provider::ProviderRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub acquisition: AcquisitionService,
    pub preselect: PreselectService,
    pub export: ExportService,
}

impl AppState {
    pub fn new(registry: Arc<ProviderRegistry>, bin_count: usize, max_export_rows: usize) -> Self {
        Self {
            acquisition: AcquisitionService::new(registry.clone(), bin_count),
            preselect: PreselectService::new(registry.clone()),
            export: ExportService::new(registry.clone(), max_export_rows),
            registry,
        }
    }
}
