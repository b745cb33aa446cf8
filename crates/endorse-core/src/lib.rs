pub mod aggregation;
pub mod app_config;
pub mod clock;
pub mod config;
pub mod entity;
pub mod history;
pub mod period;

pub use aggregation::{
    compute_cumulative_snapshot, compute_days, compute_period_days, sum_closed_periods,
    verify_totals, CumulativeSnapshot, IntegrityReport, IntegrityViolation, PeriodDays, Totals,
    MS_PER_DAY,
};
pub use app_config::{AppConfig, Environment};
pub use clock::{to_storage_precision, Clock, FixedClock, SystemClock};
pub use config::{load_app_config, load_app_config_from_env};
pub use entity::{EntityType, HistoryKey};
pub use history::EndorsementHistory;
pub use period::{validate_position, EndorsementPeriod, PositionChange};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid entity type: {0}")]
    InvalidEntityType(String),
    #[error("invalid position {0}: ranks start at 1")]
    InvalidPosition(i32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
