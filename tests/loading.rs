//! Loading configuration and price files from disk and running a full simulation.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use polars::prelude::*;
use tax_balancing::prelude::*;
use tax_balancing::prices::load_price_series;
use tempfile::tempdir;

const CONFIG: &str = r#"{
    "startingCapital": 1000,
    "rebalancingPercentageThreshold": 0.1,
    "taxRatio": 0.25,
    "allocations": { "STOCK": 0.6, "BOND": 0.3, "CASH": 0.1 }
}"#;

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

#[test]
fn test_csv_newest_first_is_read_oldest_first() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("STOCK.csv"),
        "Date,Open,Close\n\
         2020-01-06,1,12.5\n\
         2020-01-03,1,\n\
         2020-01-02,1,11.0\n\
         2020-01-01,1,10.0\n",
    );

    let series = FilePriceProvider::new(dir.path()).load("STOCK").unwrap();
    let closes: Vec<f64> = series.samples().iter().map(|s| s.close).collect();
    assert_eq!(closes, vec![10.0, 11.0, 12.5]);
    assert_eq!(series.get(0).unwrap().date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
}

#[test]
fn test_csv_zero_and_negative_closes_are_skipped() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("STOCK.csv"),
        "Date,Close\n\
         2020-01-01,10.0\n\
         2020-01-02,0\n\
         2020-01-03,-1.5\n\
         2020-01-06,10.5\n",
    );

    let series = FilePriceProvider::new(dir.path()).load("STOCK").unwrap();
    let closes: Vec<f64> = series.samples().iter().map(|s| s.close).collect();
    assert_eq!(closes, vec![10.0, 10.5]);
}

#[test]
fn test_parquet_is_used_without_csv() {
    let dir = tempdir().unwrap();
    let mut df = df!(
        "Date" => &["2020-01-01", "2020-01-02"],
        "Close" => &[100.0, 101.0]
    )
    .unwrap();
    let mut file = File::create(dir.path().join("BOND.parquet")).unwrap();
    ParquetWriter::new(&mut file).finish(&mut df).unwrap();

    let series = FilePriceProvider::new(dir.path()).load("BOND").unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series.get(1).unwrap().close, 101.0);
}

#[test]
fn test_missing_file_is_a_data_error() {
    let dir = tempdir().unwrap();
    let err = FilePriceProvider::new(dir.path()).load("NOPE").unwrap_err();
    assert!(matches!(err, BalanceError::Data(_)));
}

#[test]
fn test_config_from_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    write(&path, CONFIG);

    let config = PortfolioConfig::from_path(&path).unwrap();
    assert_eq!(config.asset_names(), vec!["STOCK", "BOND", "CASH"]);
    assert!(PortfolioConfig::from_path(&dir.path().join("missing.json")).is_err());
}

#[tokio::test]
async fn test_full_run_from_disk() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("STOCK.csv"),
        "Date,Close\n\
         2020-01-04,20.0\n\
         2020-01-03,16.0\n\
         2020-01-02,11.0\n\
         2020-01-01,10.0\n",
    );
    write(
        &dir.path().join("BOND.csv"),
        "Date,Close\n\
         2020-01-03,50.0\n\
         2020-01-02,50.0\n\
         2020-01-01,50.0\n",
    );
    // CASH has no file and falls back to a constant price
    let config: PortfolioConfig = CONFIG.parse().unwrap();

    let provider = Arc::new(FilePriceProvider::new(dir.path()));
    let series = load_price_series(provider, &config.asset_names()).await;
    assert!(series[0].is_some());
    assert!(series[1].is_some());
    assert!(series[2].is_none());

    let ctx = SimulationContext::from_config(&config, series).unwrap();
    let mut sim = SimulationLoop::new(ctx);
    let summary = sim.run(&mut ()).unwrap();

    assert_eq!(summary.steps, 3);
    assert!(summary.episodes >= 1);
    assert!(summary.tax_paid > 0.0);
    assert_eq!(
        summary.final_report.date,
        NaiveDate::from_ymd_opt(2020, 1, 4)
    );

    let out = dir.path().join("history.csv");
    summary.history.write_csv(&out).unwrap();
    let written = fs::read_to_string(&out).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next().unwrap(),
        "step,date,total_worth,total_yield_pct,idle_cash,STOCK_worth,STOCK_pct,BOND_worth,BOND_pct,CASH_worth,CASH_pct"
    );
    assert_eq!(lines.count(), 4);
}
