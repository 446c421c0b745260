//! Historical price series and the batch loading phase that feeds the simulation.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::{stream::FuturesUnordered, StreamExt};
use polars::prelude::*;

use crate::error::{BalanceError, Result};

const DATE_COLUMN: &str = "Date";
const CLOSE_COLUMN: &str = "Close";
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSample {
    pub date: NaiveDate,
    pub close: f64,
}

/// Chronologically ordered (oldest first) closing prices of one asset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    samples: Vec<PriceSample>,
}

impl PriceSeries {
    /// Build a series from samples in any order. Equal dates keep their input order.
    pub fn from_samples(mut samples: Vec<PriceSample>) -> Self {
        samples.sort_by_key(|sample| sample.date);
        Self { samples }
    }

    /// Convenience for consecutive daily closes starting at `start`.
    pub fn daily(start: NaiveDate, closes: &[f64]) -> Self {
        let samples = closes
            .iter()
            .zip(start.iter_days())
            .map(|(&close, date)| PriceSample { date, close })
            .collect();
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<&PriceSample> {
        self.samples.get(index)
    }

    /// Sample at `index`, or the last sample when the series is shorter.
    pub fn clamped(&self, index: usize) -> Option<&PriceSample> {
        self.samples.get(index).or_else(|| self.samples.last())
    }

    /// Parse a frame carrying `Date` and `Close` columns.
    ///
    /// Rows whose close is missing, not numeric, or not positive are skipped.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let closes = df.column(CLOSE_COLUMN)?.cast(&DataType::Float64)?;
        let dates = df.column(DATE_COLUMN)?.cast(&DataType::String)?;

        let mut samples = Vec::with_capacity(df.height());
        for (date, close) in dates.str()?.into_iter().zip(closes.f64()?.into_iter()) {
            let Some(close) = close.filter(|c| c.is_finite() && *c > 0.0) else {
                continue;
            };
            let date = date.ok_or_else(|| BalanceError::Data("Row without a date".to_string()))?;
            samples.push(PriceSample {
                date: parse_date(date)?,
                close,
            });
        }

        Ok(Self::from_samples(samples))
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .ok_or_else(|| BalanceError::Data(format!("Unparseable date: {}", raw)))
}

/// Source of one price series per asset.
pub trait PriceSeriesProvider: Send + Sync {
    fn load(&self, asset: &str) -> Result<PriceSeries>;
}

/// Reads `<data_dir>/<asset>.csv`, or `<asset>.parquet` when there is no CSV.
#[derive(Debug, Clone)]
pub struct FilePriceProvider {
    data_dir: PathBuf,
}

impl FilePriceProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn read_frame(&self, asset: &str) -> Result<DataFrame> {
        let csv = self.data_dir.join(format!("{}.csv", asset));
        if csv.exists() {
            return Ok(CsvReader::from_path(&csv)?.has_header(true).finish()?);
        }

        let parquet = self.data_dir.join(format!("{}.parquet", asset));
        if parquet.exists() {
            return Ok(ParquetReader::new(File::open(&parquet)?).finish()?);
        }

        Err(BalanceError::Data(format!(
            "No price file for {} in {}",
            asset,
            self.data_dir.display()
        )))
    }
}

impl PriceSeriesProvider for FilePriceProvider {
    fn load(&self, asset: &str) -> Result<PriceSeries> {
        let df = self.read_frame(asset)?;
        PriceSeries::from_frame(&df)
    }
}

/// Load every asset's series concurrently and return them in `names` order.
///
/// A failed or empty load leaves that asset without a series; the simulation then
/// prices it at a constant 1.
pub async fn load_price_series<P>(provider: Arc<P>, names: &[String]) -> Vec<Option<PriceSeries>>
where
    P: PriceSeriesProvider + 'static,
{
    let mut futures: FuturesUnordered<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let provider = Arc::clone(&provider);
            let name = name.clone();
            async move { (i, tokio::task::spawn_blocking(move || provider.load(&name)).await) }
        })
        .collect();

    let mut loaded: Vec<Option<PriceSeries>> = vec![None; names.len()];
    while let Some((i, result)) = futures.next().await {
        loaded[i] = match result {
            Ok(Ok(series)) if series.is_empty() => {
                log::warn!("Price data for {} is empty, holding price at 1", names[i]);
                None
            }
            Ok(Ok(series)) => {
                log::debug!("Loaded {} samples for {}", series.len(), names[i]);
                Some(series)
            }
            Ok(Err(e)) => {
                log::warn!("Failed loading price data for {}: {}", names[i], e);
                None
            }
            Err(e) => {
                log::warn!("Price loading task for {} did not complete: {}", names[i], e);
                None
            }
        };
    }

    let lengths: Vec<usize> = loaded.iter().flatten().map(PriceSeries::len).collect();
    if let (Some(min), Some(max)) = (lengths.iter().min(), lengths.iter().max()) {
        if min != max {
            log::warn!(
                "Price series lengths differ ({} to {} samples), shorter series hold their last close",
                min,
                max
            );
        }
    }

    loaded
}
