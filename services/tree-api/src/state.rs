//! Shared application state.

use metrics_exporter_prometheus::PrometheusHandle;

use data_service::DataService;

/// State handed to every handler behind an `Arc`.
pub struct AppState {
    pub service: DataService,

    /// Show backend and internal error detail to clients.
    pub debug_errors: bool,

    /// Renders `/metrics`. Absent when no recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: DataService) -> Self {
        Self {
            service,
            debug_errors: false,
            prometheus: None,
        }
    }

    pub fn with_debug_errors(mut self, debug: bool) -> Self {
        self.debug_errors = debug;
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}
