//! # tax_balancing
//!
//! Simulates a multi-asset portfolio over historical daily closes, rebalancing back
//! to target weights whenever an allocation drifts past a tolerance band and
//! paying capital-gains tax on every appreciated lot it sells.
//!
//! ```rust,no_run
//! use tax_balancing::prelude::*;
//!
//! # fn main() -> tax_balancing::error::Result<()> {
//! let config: PortfolioConfig = std::fs::read_to_string("config/config.json")?.parse()?;
//! let series = vec![None; config.allocations.len()];
//! let mut simulation = SimulationLoop::new(SimulationContext::from_config(&config, series)?);
//! let summary = simulation.run(&mut ())?;
//! println!("{}", summary.final_report);
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod config;
pub mod error;
pub mod ledger;
pub mod portfolio;
pub mod prices;
pub mod rebalance;
pub mod report;
pub mod simulation;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::assets::Asset;
    pub use crate::config::{PortfolioConfig, RebalanceType};
    pub use crate::error::{BalanceError, Result};
    pub use crate::ledger::{Lot, LotLedger, Sale};
    pub use crate::portfolio::{Portfolio, PortfolioBuilder};
    pub use crate::prices::{FilePriceProvider, PriceSample, PriceSeries, PriceSeriesProvider};
    pub use crate::rebalance::{RebalanceEpisode, RebalancingEngine, RedistributionPolicy};
    pub use crate::report::{ConsoleReporter, History, PortfolioReport};
    pub use crate::simulation::{SimulationContext, SimulationLoop, SimulationObserver, SimulationSummary};
}
