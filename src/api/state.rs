use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::detect::catalog::MetricCatalog;
use crate::detect::evaluator::AnomalyEvaluator;
use crate::storage::Pool;

/// Shared handler state. The evaluator is the single live evaluation context.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub catalog: Arc<MetricCatalog>,
    pub evaluator: Arc<AnomalyEvaluator>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: Pool, config: AppConfig) -> Result<Self> {
        let catalog = Arc::new(config.catalog()?);
        let evaluator = Arc::new(AnomalyEvaluator::new(Arc::clone(&catalog)));
        Ok(Self {
            pool,
            catalog,
            evaluator,
            config: Arc::new(config),
        })
    }
}
