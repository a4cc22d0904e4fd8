//! Metric definition access port.

use crate::domain::error::StratifyrError;
use crate::domain::metric::MetricDefinition;

pub trait MetricDefinitionPort {
    fn get_metric(&self, id: i64) -> Result<Option<MetricDefinition>, StratifyrError>;

    fn list_metrics(&self) -> Result<Vec<MetricDefinition>, StratifyrError>;
}
