//! Step-by-step driver over the price series.

use crate::config::PortfolioConfig;
use crate::error::{BalanceError, Result};
use crate::portfolio::{Portfolio, PortfolioBuilder};
use crate::prices::PriceSeries;
use crate::rebalance::{RebalanceEpisode, RebalancingEngine};
use crate::report::{History, PortfolioReport};

/// Hooks called as the simulation progresses. All default to doing nothing.
pub trait SimulationObserver {
    fn on_start(&mut self, _report: &PortfolioReport) {}
    fn on_episode(&mut self, _step: usize, _episode: &RebalanceEpisode) {}
    fn on_step(&mut self, _step: usize, _report: &PortfolioReport) {}
}

impl SimulationObserver for () {}

/// Everything a run mutates or reads.
pub struct SimulationContext {
    pub portfolio: Portfolio,
    pub engine: RebalancingEngine,
}

impl SimulationContext {
    pub fn new(portfolio: Portfolio, engine: RebalancingEngine) -> Self {
        Self { portfolio, engine }
    }

    /// `series` holds one entry per configured asset, in config order.
    pub fn from_config(config: &PortfolioConfig, series: Vec<Option<PriceSeries>>) -> Result<Self> {
        let portfolio = PortfolioBuilder::from_config(config, series).build()?;
        let engine = RebalancingEngine::new(config.rebalance_type());
        Ok(Self::new(portfolio, engine))
    }
}

#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub steps: usize,
    pub episodes: usize,
    pub gross_sold: f64,
    pub tax_paid: f64,
    pub history: History,
    pub final_report: PortfolioReport,
}

impl SimulationSummary {
    /// Share of gross rebalancing sales lost to tax
    pub fn tax_drag(&self) -> f64 {
        if self.gross_sold > 0.0 {
            self.tax_paid / self.gross_sold
        } else {
            0.0
        }
    }
}

pub struct SimulationLoop {
    context: SimulationContext,
}

impl SimulationLoop {
    pub fn new(context: SimulationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn into_context(self) -> SimulationContext {
        self.context
    }

    /// Price the portfolio at time index 0 and spend the starting capital.
    pub fn initialize(&mut self) -> Result<PortfolioReport> {
        let portfolio = &mut self.context.portfolio;
        portfolio.update_prices(0);
        portfolio.init_allocation()?;
        Ok(PortfolioReport::capture(portfolio, portfolio.date_at(0)))
    }

    /// Advance to `time_index`, rebalance, and report.
    pub fn step(&mut self, time_index: usize) -> Result<(Vec<RebalanceEpisode>, PortfolioReport)> {
        let SimulationContext { portfolio, engine } = &mut self.context;
        if !portfolio.is_allocated() {
            return Err(BalanceError::NotAllocated);
        }
        portfolio.update_prices(time_index);
        let episodes = engine.check_and_rebalance(portfolio, time_index)?;
        let report = PortfolioReport::capture(portfolio, portfolio.date_at(time_index));
        Ok((episodes, report))
    }

    /// Run every time index from 1 to the end of the longest series.
    pub fn run(&mut self, observer: &mut dyn SimulationObserver) -> Result<SimulationSummary> {
        let initial = self.initialize()?;
        observer.on_start(&initial);

        let mut history = History::default();
        history.push(0, initial.clone());

        let max_n = self.context.portfolio.max_series_len();
        log::info!(
            "Simulating {} steps over {} assets with {:?}",
            max_n.saturating_sub(1),
            self.context.portfolio.assets().len(),
            self.context.engine.rebalance_type()
        );

        let mut summary = SimulationSummary {
            steps: 0,
            episodes: 0,
            gross_sold: 0.0,
            tax_paid: 0.0,
            history: History::default(),
            final_report: initial,
        };

        for n in 1..max_n {
            let (episodes, report) = self.step(n)?;
            for episode in &episodes {
                observer.on_episode(n, episode);
                summary.gross_sold += episode.sale.gross_proceeds;
                summary.tax_paid += episode.sale.tax;
            }
            summary.episodes += episodes.len();
            summary.steps += 1;
            observer.on_step(n, &report);
            history.push(n, report.clone());
            summary.final_report = report;
        }

        log::info!(
            "Simulation finished after {} steps and {} rebalances",
            summary.steps,
            summary.episodes
        );
        summary.history = history;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RebalanceType;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct Recorder {
        started: bool,
        steps: Vec<usize>,
        episodes: Vec<(usize, String)>,
    }

    impl SimulationObserver for Recorder {
        fn on_start(&mut self, _report: &PortfolioReport) {
            self.started = true;
        }

        fn on_episode(&mut self, step: usize, episode: &RebalanceEpisode) {
            self.episodes.push((step, episode.sold.clone()));
        }

        fn on_step(&mut self, step: usize, _report: &PortfolioReport) {
            self.steps.push(step);
        }
    }

    fn context(rebalance_type: RebalanceType) -> SimulationContext {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let portfolio = Portfolio::builder()
            .starting_capital(1000.0)
            .add_asset("A", 0.5, Some(PriceSeries::daily(start, &[1.0, 1.2, 2.0, 2.0])))
            .add_asset("B", 0.5, Some(PriceSeries::daily(start, &[1.0, 1.0, 1.0])))
            .build()
            .unwrap();
        SimulationContext::new(portfolio, RebalancingEngine::new(rebalance_type))
    }

    #[test]
    fn test_run_visits_every_step_once() {
        let mut sim = SimulationLoop::new(context(RebalanceType::Threshold(0.1)));
        let mut recorder = Recorder::default();
        let summary = sim.run(&mut recorder).unwrap();

        assert!(recorder.started);
        assert_eq!(recorder.steps, vec![1, 2, 3]);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.history.len(), 4);
        // 1.2 keeps A within 10%, 2.0 pushes it to 67%
        assert_eq!(recorder.episodes, vec![(2, "A".to_string())]);
        assert_eq!(summary.episodes, 1);
        assert_eq!(summary.tax_paid, 0.0);
        assert_eq!(summary.final_report.asset("A").unwrap().allocation_pct, 50);
    }

    #[test]
    fn test_buy_and_hold_never_sells() {
        let mut sim = SimulationLoop::new(context(RebalanceType::None));
        let summary = sim.run(&mut ()).unwrap();
        assert_eq!(summary.episodes, 0);
        assert_eq!(summary.tax_drag(), 0.0);
        assert_eq!(summary.final_report.total_worth, 1500);
    }

    #[test]
    fn test_step_requires_initialization() {
        let mut sim = SimulationLoop::new(context(RebalanceType::Threshold(0.1)));
        assert!(matches!(sim.step(1), Err(BalanceError::NotAllocated)));
        sim.initialize().unwrap();
        assert!(sim.step(1).is_ok());
    }
}
