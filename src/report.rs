//! Rounded read-only projections of a portfolio and the console/CSV outputs built on them.

use std::fmt;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use colored::Colorize;
use polars::prelude::*;

use crate::error::Result;
use crate::portfolio::Portfolio;
use crate::rebalance::RebalanceEpisode;
use crate::simulation::{SimulationObserver, SimulationSummary};

const BANNER: &str = "--------------------------------";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReport {
    pub name: String,
    pub worth: i64,
    pub allocation_pct: i64,
}

/// Portfolio worth at one point in time, rounded to whole units and percents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioReport {
    pub date: Option<NaiveDate>,
    pub assets: Vec<AssetReport>,
    pub idle_cash: i64,
    pub total_worth: i64,
    pub total_yield_pct: i64,
}

impl PortfolioReport {
    /// Allocation percentages read 0 while the portfolio holds nothing.
    pub fn capture(portfolio: &Portfolio, date: Option<NaiveDate>) -> Self {
        let total = portfolio.total_worth();
        let assets = portfolio
            .assets()
            .iter()
            .map(|asset| {
                let worth = asset.worth();
                let allocation = if total > 0.0 { worth / total } else { 0.0 };
                AssetReport {
                    name: asset.name.clone(),
                    worth: round(worth),
                    allocation_pct: round(100.0 * allocation),
                }
            })
            .collect();

        Self {
            date,
            assets,
            idle_cash: round(portfolio.idle_cash()),
            total_worth: round(total),
            total_yield_pct: round(100.0 * portfolio.total_yield()),
        }
    }

    pub fn asset(&self, name: &str) -> Option<&AssetReport> {
        self.assets.iter().find(|a| a.name == name)
    }
}

fn round(value: f64) -> i64 {
    if value.is_finite() {
        value.round() as i64
    } else {
        0
    }
}

impl fmt::Display for PortfolioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "current worth:")?;
        for asset in &self.assets {
            writeln!(f, "{}: {} ({}%)", asset.name, asset.worth, asset.allocation_pct)?;
        }
        if self.idle_cash != 0 {
            writeln!(f, "idle cash: {}", self.idle_cash)?;
        }
        write!(
            f,
            "total: {} total yield: {}%",
            self.total_worth, self.total_yield_pct
        )
    }
}

/// Every step's report, in order.
#[derive(Debug, Clone, Default)]
pub struct History {
    rows: Vec<(usize, PortfolioReport)>,
}

impl History {
    pub fn push(&mut self, step: usize, report: PortfolioReport) {
        self.rows.push((step, report));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[(usize, PortfolioReport)] {
        &self.rows
    }

    /// One row per step: `step, date, total_worth, total_yield_pct, idle_cash`, then
    /// `<asset>_worth` and `<asset>_pct` for each asset.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let steps: Vec<u64> = self.rows.iter().map(|(n, _)| *n as u64).collect();
        let dates: Vec<Option<String>> = self
            .rows
            .iter()
            .map(|(_, r)| r.date.map(|d| d.to_string()))
            .collect();
        let totals: Vec<i64> = self.rows.iter().map(|(_, r)| r.total_worth).collect();
        let yields: Vec<i64> = self.rows.iter().map(|(_, r)| r.total_yield_pct).collect();
        let cash: Vec<i64> = self.rows.iter().map(|(_, r)| r.idle_cash).collect();

        let mut columns = vec![
            Series::new("step", steps),
            Series::new("date", dates),
            Series::new("total_worth", totals),
            Series::new("total_yield_pct", yields),
            Series::new("idle_cash", cash),
        ];

        let names: Vec<String> = self
            .rows
            .first()
            .map(|(_, r)| r.assets.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default();
        for (i, name) in names.iter().enumerate() {
            let worth: Vec<i64> = self.rows.iter().map(|(_, r)| r.assets[i].worth).collect();
            let pct: Vec<i64> = self
                .rows
                .iter()
                .map(|(_, r)| r.assets[i].allocation_pct)
                .collect();
            columns.push(Series::new(&format!("{}_worth", name), worth));
            columns.push(Series::new(&format!("{}_pct", name), pct));
        }

        Ok(DataFrame::new(columns)?)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).finish(&mut df)?;
        Ok(())
    }
}

/// Human-readable progress on stdout.
#[derive(Debug, Clone, Default)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn print_summary(&self, summary: &SimulationSummary) {
        println!("{}", "Simulation Summary".green().bold());
        println!("{}", "==================".green());
        println!("  Steps:        {}", summary.steps);
        println!("  Rebalances:   {}", summary.episodes);
        println!("  Gross sold:   {:.2}", summary.gross_sold);
        println!("  Tax paid:     {:.2}", summary.tax_paid);
        println!("  Tax drag:     {:.2}%", 100.0 * summary.tax_drag());
        println!("{}", summary.final_report);
    }
}

impl SimulationObserver for ConsoleReporter {
    fn on_start(&mut self, report: &PortfolioReport) {
        if self.quiet {
            return;
        }
        println!("{}", "initial allocation:".cyan());
        println!("{}", report);
    }

    fn on_episode(&mut self, _step: usize, episode: &RebalanceEpisode) {
        if self.quiet {
            return;
        }
        println!(
            "{} {} {} {}{}",
            "trying to rebalance due to".yellow(),
            episode.trigger.yellow(),
            "being".yellow(),
            (100.0 * episode.trigger_allocation).round().to_string().yellow(),
            "%".yellow()
        );
        println!("{}", BANNER.green());
        println!("{} {}", "before selling:".green(), episode.sold.green());
        println!("{}", episode.before);

        let sale = &episode.sale;
        let line = format!(
            "gross sell: {} | net sell: {} | tax %: {}",
            sale.gross_proceeds,
            sale.net_proceeds,
            100.0 * sale.effective_tax_rate()
        );
        println!("{}", line.red());

        println!("\n{} {}", "after selling:".green(), episode.sold.green());
        println!("{}", episode.after);
        println!("{}\n", BANNER.green());
    }

    fn on_step(&mut self, _step: usize, report: &PortfolioReport) {
        if self.quiet {
            return;
        }
        match report.date {
            Some(date) => println!("date: {}", date),
            None => println!("date: {}", "n/a".dimmed()),
        }
        println!("{}", report);
    }
}
