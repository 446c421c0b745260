//! Drift detection and the sell-and-redistribute episode.
//!
//! A check walks the assets in portfolio order. Each asset whose allocation drifted
//! beyond the tolerance fires one episode: the asset that is currently the most
//! overweight (not necessarily the one that drifted) sheds its excess, and the
//! after-tax proceeds are spread over the underweight assets. Episodes are
//! single-level; nothing re-checks drift created by the redistribution itself
//! until the next asset in the walk, or the next step.

use crate::assets::Asset;
use crate::config::RebalanceType;
use crate::error::{BalanceError, Result};
use crate::ledger::Sale;
use crate::portfolio::Portfolio;
use crate::report::PortfolioReport;

/// How after-tax sale proceeds are spread over the other assets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedistributionPolicy {
    /// One pass in portfolio order. Each asset receives at most its deficit against
    /// the pre-sale total worth; whatever is left after the pass stays idle.
    #[default]
    SinglePassProportionalCap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Purchase {
    pub asset: String,
    pub amount: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Redistribution {
    pub purchases: Vec<Purchase>,
    pub unallocated: f64,
}

impl Redistribution {
    pub fn reinvested(&self) -> f64 {
        self.purchases.iter().map(|p| p.amount).sum()
    }
}

impl RedistributionPolicy {
    /// Spend `proceeds` on every asset except `sold`, sized against `total_worth`.
    pub fn redistribute(
        &self,
        portfolio: &mut Portfolio,
        sold: usize,
        total_worth: f64,
        proceeds: f64,
    ) -> Redistribution {
        match self {
            RedistributionPolicy::SinglePassProportionalCap => {
                let mut remaining = proceeds;
                let mut purchases = Vec::new();

                for i in 0..portfolio.assets().len() {
                    if i == sold {
                        continue;
                    }
                    let asset = &portfolio.assets()[i];
                    let deficit = asset.target_allocation * total_worth - asset.worth();
                    let allocatable = deficit.min(remaining);
                    if allocatable > 0.0 {
                        let name = asset.name.clone();
                        let quantity = portfolio.buy_worth(i, allocatable);
                        remaining -= allocatable;
                        log::debug!("Bought {} units of {} for {}", quantity, name, allocatable);
                        purchases.push(Purchase {
                            asset: name,
                            amount: allocatable,
                            quantity,
                        });
                    }
                }

                Redistribution {
                    purchases,
                    unallocated: remaining,
                }
            }
        }
    }
}

/// One sell-from-overweight, buy-underweight operation.
#[derive(Debug, Clone)]
pub struct RebalanceEpisode {
    /// Asset whose drift fired the episode
    pub trigger: String,
    pub trigger_allocation: f64,
    /// Asset that was sold
    pub sold: String,
    pub sale: Sale,
    pub redistribution: Redistribution,
    pub before: PortfolioReport,
    pub after: PortfolioReport,
}

#[derive(Debug, Clone)]
pub struct RebalancingEngine {
    rebalance_type: RebalanceType,
    policy: RedistributionPolicy,
}

impl RebalancingEngine {
    pub fn new(rebalance_type: RebalanceType) -> Self {
        Self {
            rebalance_type,
            policy: RedistributionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RedistributionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn rebalance_type(&self) -> RebalanceType {
        self.rebalance_type
    }

    pub fn policy(&self) -> RedistributionPolicy {
        self.policy
    }

    /// Run the drift check for simulation step `step` and every episode it fires.
    pub fn check_and_rebalance(
        &self,
        portfolio: &mut Portfolio,
        step: usize,
    ) -> Result<Vec<RebalanceEpisode>> {
        if !portfolio.is_allocated() {
            return Err(BalanceError::NotAllocated);
        }
        let Some(tolerance) = self.rebalance_type.tolerance() else {
            return Ok(Vec::new());
        };
        if !self.rebalance_type.is_due(step) {
            return Ok(Vec::new());
        }

        let mut episodes = Vec::new();
        for i in 0..portfolio.assets().len() {
            let current = portfolio.allocation_at(i)?;
            let asset = &portfolio.assets()[i];
            let drift = current - asset.target_allocation;
            if drift.abs() <= tolerance {
                continue;
            }

            let trigger = asset.name.clone();
            log::info!(
                "Trying to rebalance due to {} being {}%",
                trigger,
                (100.0 * current).round()
            );
            match biggest_overweight(portfolio)? {
                Some(overweight) => {
                    let mut episode = self.sell_and_redistribute(portfolio, overweight)?;
                    episode.trigger = trigger;
                    episode.trigger_allocation = current;
                    episodes.push(episode);
                }
                None => log::debug!("No asset above target, nothing to sell for {}", trigger),
            }
        }
        Ok(episodes)
    }

    /// Sell the excess of the asset at `index` and redistribute the net proceeds.
    pub fn sell_and_redistribute(
        &self,
        portfolio: &mut Portfolio,
        index: usize,
    ) -> Result<RebalanceEpisode> {
        let total_worth = portfolio.total_worth();
        if total_worth <= 0.0 {
            return Err(BalanceError::ZeroTotalWorth);
        }
        let date = portfolio.time_index().and_then(|n| portfolio.date_at(n));
        let before = PortfolioReport::capture(portfolio, date);

        let asset = &portfolio.assets()[index];
        let name = asset.name.clone();
        let excess = excess_worth(asset, total_worth);
        if excess <= 0.0 {
            return Err(BalanceError::NotOverweight {
                asset: name,
                excess,
            });
        }
        let quantity = excess / asset.current_price;
        let current = asset.worth() / total_worth;

        let sale = portfolio.sell_quantity(index, quantity);
        log::info!(
            "Sold {} units of {}: gross {}, net {}, tax {}%",
            sale.quantity_sold,
            name,
            sale.gross_proceeds,
            sale.net_proceeds,
            100.0 * sale.effective_tax_rate()
        );

        let redistribution = self
            .policy
            .redistribute(portfolio, index, total_worth, sale.net_proceeds);
        if redistribution.unallocated > 0.0 {
            log::debug!("{} of proceeds left idle", redistribution.unallocated);
            portfolio.park_cash(redistribution.unallocated);
        }

        Ok(RebalanceEpisode {
            trigger: name.clone(),
            trigger_allocation: current,
            sold: name,
            sale,
            redistribution,
            before,
            after: PortfolioReport::capture(portfolio, date),
        })
    }
}

/// Index of the asset with the largest allocation among those holding a positive
/// excess over target. Ties go to the earliest asset.
fn biggest_overweight(portfolio: &Portfolio) -> Result<Option<usize>> {
    let total_worth = portfolio.total_worth();
    if total_worth <= 0.0 {
        return Err(BalanceError::ZeroTotalWorth);
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, asset) in portfolio.assets().iter().enumerate() {
        // must agree with the excess test in sell_and_redistribute
        if excess_worth(asset, total_worth) <= 0.0 {
            continue;
        }
        let current = asset.worth() / total_worth;
        if best.map_or(true, |(_, top)| current > top) {
            best = Some((i, current));
        }
    }
    Ok(best.map(|(i, _)| i))
}

fn excess_worth(asset: &Asset, total_worth: f64) -> f64 {
    asset.worth() - asset.target_allocation * total_worth
}
