pub mod catalog_service;
pub mod governance_service;
pub mod metrics;
pub mod report_service;
pub mod transformation_service;

use std::sync::Arc;

pub use catalog_service::CatalogService;
pub use governance_service::GovernanceService;
pub use metrics::{BusinessMetrics, InMemoryMetricsSource, MetricsError, MetricsSource, SyntheticMetricsSource};
pub use report_service::ReportService;
pub use transformation_service::TransformationService;

use crate::jobs::ExecutorRegistry;

/// Registry with an executor for every job type
pub fn standard_registry(metrics: Arc<dyn MetricsSource>) -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with(Arc::new(ReportService::new(metrics)))
        .with(Arc::new(GovernanceService::new()))
        .with(Arc::new(TransformationService::new()))
        .with(Arc::new(CatalogService::new()))
}
