use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Verification and monitoring figures for one business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessMetrics {
    pub business_id: String,
    pub verification_checks: u32,
    pub passed_checks: u32,
    pub open_alerts: u32,
    pub resolved_alerts: u32,
    /// 0 (low) to 100 (high)
    pub risk_score: u8,
    pub documents_on_file: u32,
}

impl BusinessMetrics {
    pub fn pass_rate(&self) -> f64 {
        if self.verification_checks == 0 {
            return 0.0;
        }
        self.passed_checks as f64 / self.verification_checks as f64
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricsError {
    #[error("no metrics recorded for business {0}")]
    UnknownBusiness(String),

    #[error("metrics source unavailable: {0}")]
    Unavailable(String),
}

/// Where report jobs get their numbers from
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn business_metrics(&self, business_id: &str) -> Result<BusinessMetrics, MetricsError>;
}

/// Placeholder source: figures are derived from a hash of the business id,
/// stable across calls but not real data. Swap in a real source when one
/// exists.
#[derive(Debug, Clone, Default)]
pub struct SyntheticMetricsSource;

#[async_trait]
impl MetricsSource for SyntheticMetricsSource {
    async fn business_metrics(&self, business_id: &str) -> Result<BusinessMetrics, MetricsError> {
        let digest = Sha256::digest(business_id.as_bytes());
        let checks = 20 + u32::from(digest[0] % 80);
        let passed = checks - u32::from(digest[1]) % (checks / 4 + 1);

        Ok(BusinessMetrics {
            business_id: business_id.to_string(),
            verification_checks: checks,
            passed_checks: passed,
            open_alerts: u32::from(digest[2] % 12),
            resolved_alerts: u32::from(digest[3] % 40),
            risk_score: digest[4] % 101,
            documents_on_file: u32::from(digest[5] % 30),
        })
    }
}

/// Explicitly seeded source; unknown businesses are an error
#[derive(Debug, Default)]
pub struct InMemoryMetricsSource {
    metrics: RwLock<HashMap<String, BusinessMetrics>>,
}

impl InMemoryMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, metrics: BusinessMetrics) -> Result<(), MetricsError> {
        let mut map = self
            .metrics
            .write()
            .map_err(|_| MetricsError::Unavailable("metrics lock poisoned".to_string()))?;
        map.insert(metrics.business_id.clone(), metrics);
        Ok(())
    }
}

#[async_trait]
impl MetricsSource for InMemoryMetricsSource {
    async fn business_metrics(&self, business_id: &str) -> Result<BusinessMetrics, MetricsError> {
        let map = self
            .metrics
            .read()
            .map_err(|_| MetricsError::Unavailable("metrics lock poisoned".to_string()))?;
        map.get(business_id)
            .cloned()
            .ok_or_else(|| MetricsError::UnknownBusiness(business_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthetic_metrics_are_deterministic_and_consistent() {
        let source = SyntheticMetricsSource;
        let a = source.business_metrics("biz-1").await.unwrap();
        let b = source.business_metrics("biz-1").await.unwrap();
        assert_eq!(a, b);
        assert!(a.passed_checks <= a.verification_checks);
        assert!(a.risk_score <= 100);
        assert!((0.0..=1.0).contains(&a.pass_rate()));
    }

    #[tokio::test]
    async fn in_memory_source_reports_unknown_business() {
        let source = InMemoryMetricsSource::new();
        let err = source.business_metrics("biz-404").await.unwrap_err();
        assert_eq!(err, MetricsError::UnknownBusiness("biz-404".to_string()));
    }

    #[tokio::test]
    async fn poisoned_lock_is_reported_on_insert_and_read() {
        let source = std::sync::Arc::new(InMemoryMetricsSource::new());
        let holder = source.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.metrics.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        let seed = BusinessMetrics {
            business_id: "biz-1".to_string(),
            verification_checks: 1,
            passed_checks: 1,
            open_alerts: 0,
            resolved_alerts: 0,
            risk_score: 10,
            documents_on_file: 0,
        };
        assert!(matches!(source.insert(seed), Err(MetricsError::Unavailable(_))));
        assert!(matches!(
            source.business_metrics("biz-1").await,
            Err(MetricsError::Unavailable(_))
        ));
    }
}
