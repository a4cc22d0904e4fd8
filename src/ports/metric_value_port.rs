//! Computed metric value persistence port.

use crate::domain::error::StratifyrError;
use crate::domain::metric::{ComputedMetricValue, MetricValueFilter, NewMetricValue};

pub trait MetricValuePort {
    fn create_value(&self, value: &NewMetricValue) -> Result<ComputedMetricValue, StratifyrError>;

    fn update_value(&self, id: i64, value: f64) -> Result<ComputedMetricValue, StratifyrError>;

    fn retrieve_value(&self, id: i64) -> Result<Option<ComputedMetricValue>, StratifyrError>;

    /// Values matching every field set on `filter`, ordered by metric id.
    fn query_values(
        &self,
        filter: &MetricValueFilter,
    ) -> Result<Vec<ComputedMetricValue>, StratifyrError>;
}
