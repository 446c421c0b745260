use crate::ledger::LotLedger;
use crate::prices::{PriceSample, PriceSeries};

/// Price used for assets without a series (cash-like placeholders).
pub const CONSTANT_PRICE: f64 = 1.0;

pub struct Asset {
    pub name: String,
    pub target_allocation: f64,
    pub current_price: f64,
    pub ledger: LotLedger,
    pub prices: Option<PriceSeries>,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Asset {{ name: {}, target: {}, current_price: {}, quantity: {} }}",
            self.name,
            self.target_allocation,
            self.current_price,
            self.ledger.total_quantity()
        )
    }
}

impl Asset {
    pub fn new(name: &str, target_allocation: f64) -> Self {
        Self {
            name: name.to_string(),
            target_allocation,
            current_price: CONSTANT_PRICE,
            ledger: LotLedger::new(),
            prices: None,
        }
    }

    pub fn with_prices(mut self, prices: Option<PriceSeries>) -> Self {
        self.prices = prices.filter(|series| !series.is_empty());
        self
    }

    pub fn amount_held(&self) -> f64 {
        self.ledger.total_quantity()
    }

    pub fn worth(&self) -> f64 {
        self.ledger.worth(self.current_price)
    }

    /// Number of samples in this asset's series, 0 when unpriced
    pub fn series_len(&self) -> usize {
        self.prices.as_ref().map_or(0, PriceSeries::len)
    }

    pub fn sample_at(&self, time_index: usize) -> Option<&PriceSample> {
        self.prices.as_ref()?.clamped(time_index)
    }

    /// Move `current_price` to the sample at `time_index`.
    pub fn update_price(&mut self, time_index: usize) {
        self.current_price = self
            .sample_at(time_index)
            .map_or(CONSTANT_PRICE, |sample| sample.close);
    }
}
