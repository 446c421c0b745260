//! Lot ledger - per-asset purchase lots with realized-gain accounting.

/// Quantities at or below this are treated as fully liquidated.
pub const QUANTITY_EPSILON: f64 = 1e-10;

/// Units of one asset acquired at a single price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lot {
    pub quantity: f64,
    pub cost_basis: f64,
}

impl Lot {
    pub fn new(quantity: f64, cost_basis: f64) -> Self {
        Self {
            quantity,
            cost_basis,
        }
    }

    /// Total acquisition cost of the units still held in this lot
    pub fn total_cost(&self) -> f64 {
        self.quantity * self.cost_basis
    }
}

/// Outcome of a single [`LotLedger::sell`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sale {
    pub quantity_sold: f64,
    pub gross_proceeds: f64,
    pub realized_gain: f64,
    /// Tax owed on the realized gain. Negative when losses dominate the call.
    pub tax: f64,
    pub net_proceeds: f64,
}

impl Sale {
    /// Share of the gross proceeds consumed by tax, in [0, 1] for gains.
    pub fn effective_tax_rate(&self) -> f64 {
        if self.gross_proceeds > 0.0 {
            self.tax / self.gross_proceeds
        } else {
            0.0
        }
    }
}

/// Purchase lots of one asset, kept in acquisition order.
#[derive(Debug, Clone, Default)]
pub struct LotLedger {
    lots: Vec<Lot>,
}

impl LotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lot of `quantity` units bought at `price`. Returns the amount spent.
    pub fn buy(&mut self, quantity: f64, price: f64) -> f64 {
        debug_assert!(quantity >= 0.0, "buy quantity must be non-negative");
        debug_assert!(price > 0.0, "buy price must be positive");
        self.lots.push(Lot::new(quantity, price));
        quantity * price
    }

    /// Liquidate `quantity` units at `current_price`, highest cost basis first.
    ///
    /// Selling the least-appreciated lots first keeps the realized gain, and so the
    /// tax, as small as possible for the quantity sold. Gains and losses of the lots
    /// touched by one call net out against each other; the resulting tax is not
    /// clamped at zero.
    pub fn sell(&mut self, quantity: f64, current_price: f64, tax_ratio: f64) -> Sale {
        let held = self.total_quantity();
        let mut remaining = quantity.max(0.0);
        if remaining > held + QUANTITY_EPSILON {
            log::warn!(
                "Sell of {} units exceeds holdings of {}, clamping to holdings",
                remaining,
                held
            );
        }
        if remaining > held {
            remaining = held;
        }

        let mut order: Vec<usize> = (0..self.lots.len()).collect();
        order.sort_by(|&a, &b| self.lots[b].cost_basis.total_cmp(&self.lots[a].cost_basis));

        let mut sale = Sale::default();
        for i in order {
            if remaining <= 0.0 {
                break;
            }
            let lot = &mut self.lots[i];
            let units = lot.quantity.min(remaining);
            if units <= 0.0 {
                continue;
            }
            lot.quantity -= units;
            remaining -= units;

            let gain = units * (current_price - lot.cost_basis);
            sale.quantity_sold += units;
            sale.gross_proceeds += units * current_price;
            sale.realized_gain += gain;
            sale.tax += tax_ratio * gain;

            log::debug!(
                "Liquidated {} units from lot with cost basis {} (gain {})",
                units,
                lot.cost_basis,
                gain
            );
        }
        sale.net_proceeds = sale.gross_proceeds - sale.tax;

        self.lots.retain(|lot| lot.quantity > QUANTITY_EPSILON);
        sale
    }

    pub fn total_quantity(&self) -> f64 {
        self.lots.iter().map(|lot| lot.quantity).sum()
    }

    pub fn worth(&self, current_price: f64) -> f64 {
        current_price * self.total_quantity()
    }

    /// Acquisition cost of everything still held
    pub fn cost_basis(&self) -> f64 {
        self.lots.iter().map(Lot::total_cost).sum()
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}
