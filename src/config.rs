//! Portfolio configuration document and rebalancing triggers.

use std::fmt;
use std::path::Path;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{BalanceError, Result};

/// Drift below this is numeric noise and never triggers a rebalance.
pub const DRIFT_EPSILON: f64 = 1e-9;

const ALLOCATION_SUM_TOLERANCE: f64 = 1e-6;

/// When the engine checks for drift.
#[derive(Clone, Copy, PartialEq)]
pub enum RebalanceType {
    Threshold(f64),
    Frequency(u32),
    ThresholdAndFrequency(f64, u32),
    None,
}

impl RebalanceType {
    /// Whether a drift check runs at simulation step `step`.
    pub fn is_due(&self, step: usize) -> bool {
        match self {
            RebalanceType::Threshold(_) => true,
            RebalanceType::Frequency(n) | RebalanceType::ThresholdAndFrequency(_, n) => {
                *n > 0 && step % *n as usize == 0
            }
            RebalanceType::None => false,
        }
    }

    /// Minimum absolute drift that triggers an episode, `None` when rebalancing is off.
    pub fn tolerance(&self) -> Option<f64> {
        match self {
            RebalanceType::Threshold(t) | RebalanceType::ThresholdAndFrequency(t, _) => {
                Some(t.max(DRIFT_EPSILON))
            }
            RebalanceType::Frequency(_) => Some(DRIFT_EPSILON),
            RebalanceType::None => None,
        }
    }
}

impl std::fmt::Debug for RebalanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebalanceType::Threshold(t) => write!(f, "Threshold({})", t),
            RebalanceType::Frequency(u) => write!(f, "Frequency({})", u),
            RebalanceType::ThresholdAndFrequency(t, u) => {
                write!(f, "ThresholdAndFrequency({}, {})", t, u)
            }
            RebalanceType::None => write!(f, "None"),
        }
    }
}

/// Target allocation of one asset, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub asset: String,
    pub target: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioConfig {
    pub starting_capital: f64,
    pub rebalancing_percentage_threshold: f64,
    pub tax_ratio: f64,
    #[serde(deserialize_with = "ordered_allocations")]
    pub allocations: Vec<Allocation>,
    /// Only check for drift every this many steps
    #[serde(default)]
    pub rebalance_every: Option<u32>,
}

impl PortfolioConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        contents.parse()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.starting_capital.is_finite() && self.starting_capital > 0.0) {
            return Err(BalanceError::Config(format!(
                "startingCapital must be positive, got {}",
                self.starting_capital
            )));
        }
        if !(0.0..1.0).contains(&self.rebalancing_percentage_threshold) {
            return Err(BalanceError::Config(format!(
                "rebalancingPercentageThreshold must be in [0, 1), got {}",
                self.rebalancing_percentage_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.tax_ratio) {
            return Err(BalanceError::Config(format!(
                "taxRatio must be in [0, 1], got {}",
                self.tax_ratio
            )));
        }
        if self.allocations.is_empty() {
            return Err(BalanceError::Config("allocations must not be empty".to_string()));
        }
        if let Some(bad) = self
            .allocations
            .iter()
            .find(|a| !(0.0..=1.0).contains(&a.target))
        {
            return Err(BalanceError::Config(format!(
                "allocation for {} must be in [0, 1], got {}",
                bad.asset, bad.target
            )));
        }
        if self.rebalance_every == Some(0) {
            return Err(BalanceError::Config("rebalanceEvery must be positive".to_string()));
        }

        let sum: f64 = self.allocations.iter().map(|a| a.target).sum();
        if (sum - 1.0).abs() > ALLOCATION_SUM_TOLERANCE {
            log::warn!("Target allocations sum to {}, not 1.0", sum);
        }
        Ok(())
    }

    pub fn rebalance_type(&self) -> RebalanceType {
        let threshold = self.rebalancing_percentage_threshold;
        match self.rebalance_every {
            None => RebalanceType::Threshold(threshold),
            Some(n) if threshold == 0.0 => RebalanceType::Frequency(n),
            Some(n) => RebalanceType::ThresholdAndFrequency(threshold, n),
        }
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.allocations.iter().map(|a| a.asset.clone()).collect()
    }
}

impl std::str::FromStr for PortfolioConfig {
    type Err = BalanceError;

    fn from_str(s: &str) -> Result<Self> {
        let config: PortfolioConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// Keeps the `allocations` object in document order and rejects repeated names.
fn ordered_allocations<'de, D>(deserializer: D) -> std::result::Result<Vec<Allocation>, D::Error>
where
    D: Deserializer<'de>,
{
    struct AllocationsVisitor;

    impl<'de> Visitor<'de> for AllocationsVisitor {
        type Value = Vec<Allocation>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map from asset name to target fraction")
        }

        fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut allocations: Vec<Allocation> = Vec::new();
            while let Some((asset, target)) = map.next_entry::<String, f64>()? {
                if allocations.iter().any(|a| a.asset == asset) {
                    return Err(de::Error::custom(format!("duplicate asset {}", asset)));
                }
                allocations.push(Allocation { asset, target });
            }
            Ok(allocations)
        }
    }

    deserializer.deserialize_map(AllocationsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "startingCapital": 10000,
        "rebalancingPercentageThreshold": 0.1,
        "taxRatio": 0.25,
        "allocations": { "VTI": 0.5, "BND": 0.3, "GLD": 0.2 }
    }"#;

    #[test]
    fn test_parse_keeps_document_order() {
        let config: PortfolioConfig = SAMPLE.parse().unwrap();
        assert_eq!(config.starting_capital, 10000.0);
        assert_eq!(config.tax_ratio, 0.25);
        assert_eq!(config.asset_names(), vec!["VTI", "BND", "GLD"]);
        assert_eq!(config.rebalance_type(), RebalanceType::Threshold(0.1));
    }

    #[test]
    fn test_duplicate_asset_rejected() {
        let json = r#"{
            "startingCapital": 1000,
            "rebalancingPercentageThreshold": 0.1,
            "taxRatio": 0.2,
            "allocations": { "A": 0.5, "A": 0.5 }
        }"#;
        let err = json.parse::<PortfolioConfig>().unwrap_err();
        assert!(err.to_string().contains("duplicate asset A"));
    }

    #[test]
    fn test_validation_errors() {
        let base: PortfolioConfig = SAMPLE.parse().unwrap();

        let mut config = base.clone();
        config.starting_capital = 0.0;
        assert!(matches!(config.validate(), Err(BalanceError::Config(_))));

        let mut config = base.clone();
        config.rebalancing_percentage_threshold = 1.0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.tax_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.allocations.clear();
        assert!(config.validate().is_err());

        let mut config = base;
        config.rebalance_every = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_field_is_serde_error() {
        let err = r#"{ "startingCapital": 1 }"#.parse::<PortfolioConfig>().unwrap_err();
        assert!(matches!(err, BalanceError::Serde(_)));
    }

    #[test]
    fn test_rebalance_type_mapping() {
        let mut config: PortfolioConfig = SAMPLE.parse().unwrap();
        config.rebalance_every = Some(5);
        assert_eq!(config.rebalance_type(), RebalanceType::ThresholdAndFrequency(0.1, 5));
        config.rebalancing_percentage_threshold = 0.0;
        assert_eq!(config.rebalance_type(), RebalanceType::Frequency(5));
    }

    #[test]
    fn test_rebalance_type_schedule() {
        assert!(RebalanceType::Threshold(0.05).is_due(7));
        assert!(RebalanceType::Frequency(3).is_due(6));
        assert!(!RebalanceType::Frequency(3).is_due(7));
        assert!(!RebalanceType::None.is_due(0));
        assert_eq!(RebalanceType::None.tolerance(), None);
        assert_eq!(RebalanceType::Threshold(0.0).tolerance(), Some(DRIFT_EPSILON));
        assert_eq!(format!("{:?}", RebalanceType::ThresholdAndFrequency(0.1, 2)), "ThresholdAndFrequency(0.1, 2)");
    }
}
