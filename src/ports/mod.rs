//! Port traits for the collaborators the metrics pipeline reads from and writes to.

pub mod bar_port;
pub mod cache_port;
pub mod clock_port;
pub mod config_port;
pub mod holiday_port;
pub mod metric_port;
pub mod metric_value_port;
pub mod store_admin_port;
