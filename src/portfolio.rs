use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;

use crate::assets::Asset;
use crate::config::PortfolioConfig;
use crate::error::{BalanceError, Result};
use crate::ledger::Sale;
use crate::prices::PriceSeries;

pub struct Portfolio {
    // iteration order is the configured asset order
    assets: Vec<Asset>,
    starting_capital: f64,
    tax_ratio: f64,
    // proceeds a redistribution pass could not place
    idle_cash: f64,
    time_index: Option<usize>,
    allocated: bool,
}

impl Portfolio {
    pub fn builder() -> PortfolioBuilder {
        PortfolioBuilder::new()
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn starting_capital(&self) -> f64 {
        self.starting_capital
    }

    pub fn tax_ratio(&self) -> f64 {
        self.tax_ratio
    }

    pub fn idle_cash(&self) -> f64 {
        self.idle_cash
    }

    /// Hold `amount` as cash. It counts towards total worth but is never reinvested.
    pub fn park_cash(&mut self, amount: f64) {
        if amount > 0.0 {
            self.idle_cash += amount;
        }
    }

    pub fn time_index(&self) -> Option<usize> {
        self.time_index
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.assets
            .iter()
            .position(|asset| asset.name == name)
            .ok_or_else(|| BalanceError::UnknownAsset(name.to_string()))
    }

    pub fn asset(&self, name: &str) -> Result<&Asset> {
        Ok(&self.assets[self.index_of(name)?])
    }

    pub fn asset_worth(&self, name: &str) -> Result<f64> {
        Ok(self.asset(name)?.worth())
    }

    pub fn total_worth(&self) -> f64 {
        self.assets
            .iter()
            .fold(self.idle_cash, |acc, asset| acc + asset.worth())
    }

    pub fn allocation_percentage(&self, name: &str) -> Result<f64> {
        self.allocation_at(self.index_of(name)?)
    }

    /// Current share of total worth held by the asset at `index`.
    pub fn allocation_at(&self, index: usize) -> Result<f64> {
        let total = self.total_worth();
        if total <= 0.0 {
            return Err(BalanceError::ZeroTotalWorth);
        }
        Ok(self.assets[index].worth() / total)
    }

    /// (total worth - starting capital) / starting capital
    pub fn total_yield(&self) -> f64 {
        (self.total_worth() - self.starting_capital) / self.starting_capital
    }

    /// Spend each asset's target share of the starting capital at its current price.
    pub fn init_allocation(&mut self) -> Result<()> {
        if self.allocated {
            return Err(BalanceError::AlreadyAllocated);
        }
        if self.time_index.is_none() {
            return Err(BalanceError::PricesNotSet);
        }

        let capital = self.starting_capital;
        for asset in self.assets.iter_mut() {
            let quantity = asset.target_allocation * capital / asset.current_price;
            asset.ledger.buy(quantity, asset.current_price);
        }
        self.allocated = true;
        Ok(())
    }

    /// Set every asset's price to its sample at `time_index`.
    ///
    /// Series shorter than `time_index` hold their last close; assets without a
    /// series stay at a constant price of 1.
    pub fn update_prices(&mut self, time_index: usize) {
        for asset in self.assets.iter_mut() {
            asset.update_price(time_index);
        }
        self.time_index = Some(time_index);
    }

    /// Length of the longest price series
    pub fn max_series_len(&self) -> usize {
        self.assets.iter().map(Asset::series_len).max().unwrap_or(0)
    }

    /// Date of step `time_index`, taken from the longest series.
    pub fn date_at(&self, time_index: usize) -> Option<NaiveDate> {
        self.assets
            .iter()
            .max_by_key(|asset| asset.series_len())
            .and_then(|asset| asset.prices.as_ref()?.get(time_index))
            .map(|sample| sample.date)
    }

    /// Invest `amount` of cash into the asset at `index`. Returns the units bought.
    pub fn buy_worth(&mut self, index: usize, amount: f64) -> f64 {
        let asset = &mut self.assets[index];
        let quantity = amount / asset.current_price;
        asset.ledger.buy(quantity, asset.current_price);
        quantity
    }

    /// Sell `quantity` units of the asset at `index` at its current price.
    pub fn sell_quantity(&mut self, index: usize, quantity: f64) -> Sale {
        let tax_ratio = self.tax_ratio;
        let asset = &mut self.assets[index];
        asset.ledger.sell(quantity, asset.current_price, tax_ratio)
    }

    pub fn get_actual_weights(&self) -> Result<DataFrame> {
        let mut actual_weights = HashMap::new();
        for (i, asset) in self.assets.iter().enumerate() {
            actual_weights.insert(asset.name.clone(), self.allocation_at(i)?);
        }

        let total_weight: f64 = actual_weights.values().sum();
        debug_assert!(
            (total_weight + self.idle_cash / self.total_worth() - 1.0).abs() < 1e-8,
            "Weights do not add up to 1"
        );
        self.weights_to_dataframe(actual_weights)
    }

    pub fn weights_to_dataframe(&self, weights: HashMap<String, f64>) -> Result<DataFrame> {
        let tickers: Vec<String> = self.assets.iter().map(|a| a.name.clone()).collect();
        let targets: Vec<f64> = self.assets.iter().map(|a| a.target_allocation).collect();
        let weights: Vec<f64> = tickers
            .iter()
            .map(|t| weights.get(t).copied().unwrap_or(0.0))
            .collect();
        Ok(df!(
            "ticker" => tickers,
            "target" => targets,
            "weight" => weights
        )?)
    }
}

pub struct PortfolioBuilder {
    assets: Vec<Asset>,
    starting_capital: f64,
    tax_ratio: f64,
}

impl Default for PortfolioBuilder {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            starting_capital: 0.0,
            tax_ratio: 0.0,
        }
    }
}

impl PortfolioBuilder {
    pub fn new() -> PortfolioBuilder {
        PortfolioBuilder::default()
    }

    /// Seed a builder from a config and the series loaded for its assets, in config order.
    pub fn from_config(config: &PortfolioConfig, series: Vec<Option<PriceSeries>>) -> Self {
        let mut series = series.into_iter();
        config.allocations.iter().fold(
            Self::new()
                .starting_capital(config.starting_capital)
                .tax_ratio(config.tax_ratio),
            |builder, allocation| {
                builder.add_asset(&allocation.asset, allocation.target, series.next().flatten())
            },
        )
    }

    pub fn add_asset(mut self, name: &str, target: f64, prices: Option<PriceSeries>) -> Self {
        self.assets.push(Asset::new(name, target).with_prices(prices));
        self
    }

    pub fn starting_capital(mut self, starting_capital: f64) -> Self {
        self.starting_capital = starting_capital;
        self
    }

    pub fn tax_ratio(mut self, tax_ratio: f64) -> Self {
        self.tax_ratio = tax_ratio;
        self
    }

    pub fn build(self) -> Result<Portfolio> {
        if self.assets.is_empty() {
            return Err(BalanceError::Config("portfolio has no assets".to_string()));
        }
        if !(self.starting_capital > 0.0) {
            return Err(BalanceError::Config(format!(
                "starting capital must be positive, got {}",
                self.starting_capital
            )));
        }
        for (i, asset) in self.assets.iter().enumerate() {
            if self.assets[..i].iter().any(|other| other.name == asset.name) {
                return Err(BalanceError::DuplicateAsset(asset.name.clone()));
            }
        }

        Ok(Portfolio {
            assets: self.assets,
            starting_capital: self.starting_capital,
            tax_ratio: self.tax_ratio,
            idle_cash: 0.0,
            time_index: None,
            allocated: false,
        })
    }
}
