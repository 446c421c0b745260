//! Error types for the rebalancing simulator

use polars::prelude::PolarsError;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Duplicate asset: {0}")]
    DuplicateAsset(String),

    #[error("Total portfolio worth is zero, allocation percentages are undefined")]
    ZeroTotalWorth,

    #[error("Prices have not been set, call update_prices first")]
    PricesNotSet,

    #[error("Initial allocation has already been performed")]
    AlreadyAllocated,

    #[error("Initial allocation has not been performed")]
    NotAllocated,

    #[error("Asset {asset} is not overweight (excess worth {excess})")]
    NotOverweight { asset: String, excess: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, BalanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_overweight_message() {
        let err = BalanceError::NotOverweight {
            asset: "SPY".to_string(),
            excess: -12.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("SPY"));
        assert!(msg.contains("-12.5"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err: BalanceError = io.into();
        assert!(matches!(err, BalanceError::Io(_)));
        assert!(err.to_string().contains("missing.csv"));
    }
}
