pub mod config;
pub mod money;
pub mod period;
pub mod transaction;

pub use config::{AnalysisConfig, ConfigError, GradeThresholds};
pub use money::Money;
pub use period::{DateRange, YearMonth};
pub use transaction::{Transaction, TransactionSource, TransactionStatus, TransactionType};
