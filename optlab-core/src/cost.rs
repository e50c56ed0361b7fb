//! Trade costs: fees, minimum fees, slippage and lot-size rounding.
//!
//! Each side (buy/sell) runs in one of two regimes, chosen per call:
//! - fixed-fee regime when that side's fixed fee is nonzero:
//!   `fee = fix + slippage * notional^2` per traded asset
//! - rate regime otherwise:
//!   `fee = notional * (max(rate, min_fee / notional) + slippage * notional)`
//!
//! Missing (NaN) and non-positive prices never trade.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw fee parameters, as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    /// Fixed fee per buy trade.
    pub buy_fix: f64,
    /// Fixed fee per sell trade.
    pub sell_fix: f64,
    /// Proportional buy rate.
    pub buy_rate: f64,
    /// Proportional sell rate.
    pub sell_rate: f64,
    /// Minimum fee per buy trade.
    pub buy_min: f64,
    /// Minimum fee per sell trade.
    pub sell_min: f64,
    /// Slippage coefficient, scaled by traded notional.
    pub slippage: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            buy_fix: 0.0,
            sell_fix: 0.0,
            buy_rate: 0.003,
            sell_rate: 0.001,
            buy_min: 5.0,
            sell_min: 0.0,
            slippage: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostError {
    #[error("cost parameter '{name}' must be finite and non-negative, got {value}")]
    Invalid { name: &'static str, value: f64 },

    #[error("cost rate '{name}' must be below 1, got {value}")]
    RateTooHigh { name: &'static str, value: f64 },
}

/// Result of a sell pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleOutcome {
    /// Units sold per asset, as non-positive numbers.
    pub units: Vec<f64>,
    /// Cash received net of fees.
    pub cash_gained: f64,
    pub fee: f64,
}

/// Result of a buy pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOutcome {
    /// Units bought per asset.
    pub units: Vec<f64>,
    /// Cash paid, fees included.
    pub cash_spent: f64,
    pub fee: f64,
}

/// Validated fee model. Read-only during simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cost {
    params: CostParams,
}

impl Cost {
    pub fn new(params: CostParams) -> Result<Self, CostError> {
        let fields = [
            ("buy_fix", params.buy_fix),
            ("sell_fix", params.sell_fix),
            ("buy_rate", params.buy_rate),
            ("sell_rate", params.sell_rate),
            ("buy_min", params.buy_min),
            ("sell_min", params.sell_min),
            ("slippage", params.slippage),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(CostError::Invalid { name, value });
            }
        }
        for (name, value) in [("buy_rate", params.buy_rate), ("sell_rate", params.sell_rate)] {
            if value >= 1.0 {
                return Err(CostError::RateTooHigh { name, value });
            }
        }
        Ok(Self { params })
    }

    pub fn frictionless() -> Self {
        Self {
            params: CostParams {
                buy_fix: 0.0,
                sell_fix: 0.0,
                buy_rate: 0.0,
                sell_rate: 0.0,
                buy_min: 0.0,
                sell_min: 0.0,
                slippage: 0.0,
            },
        }
    }

    /// Proportional fees only, no minimums.
    pub fn rate_only(buy_rate: f64, sell_rate: f64) -> Result<Self, CostError> {
        Self::new(CostParams {
            buy_rate,
            sell_rate,
            buy_min: 0.0,
            ..CostParams::default()
        })
    }

    pub fn params(&self) -> &CostParams {
        &self.params
    }

    /// Sell `holdings * signal` units of every asset whose signal is negative.
    pub fn selling_result(
        &self,
        prices: &[f64],
        signals: &[f64],
        holdings: &[f64],
        lot_size: f64,
    ) -> SaleOutcome {
        let to_sell: Vec<f64> = signals
            .iter()
            .zip(holdings)
            .map(|(&s, &h)| if s < 0.0 && h > 0.0 { (s.max(-1.0)) * h } else { 0.0 })
            .collect();
        self.sell_units(prices, &to_sell, lot_size)
    }

    /// Sell the given (non-positive) unit counts, truncated to `lot_size`.
    /// An asset is left unsold when its fee would take the whole proceeds,
    /// so `cash_gained` is never negative.
    pub fn sell_units(&self, prices: &[f64], to_sell: &[f64], lot_size: f64) -> SaleOutcome {
        let p = &self.params;
        let mut units = vec![0.0; prices.len()];
        let mut cash_gained = 0.0;
        let mut fee = 0.0;

        for (i, (&price, &amount)) in prices.iter().zip(to_sell).enumerate() {
            if !tradable(price) || amount >= 0.0 {
                continue;
            }
            let qty = round_to_lot(-amount, lot_size);
            if qty <= 0.0 {
                continue;
            }
            let value = qty * price;
            let asset_fee = if p.sell_fix != 0.0 {
                p.sell_fix + p.slippage * value * value
            } else {
                let min_rate = if p.sell_min > 0.0 { p.sell_min / value } else { 0.0 };
                value * (p.sell_rate.max(min_rate) + p.slippage * value)
            };
            // A sale that nets nothing is not worth making.
            if asset_fee >= value {
                continue;
            }
            units[i] = -qty;
            cash_gained += value - asset_fee;
            fee += asset_fee;
        }

        SaleOutcome {
            units,
            cash_gained,
            fee,
        }
    }

    /// Buy back `to_cover` (non-negative) units of short positions, truncated
    /// to `lot_size`. Buy-side fees apply; orders below the buy minimum
    /// still execute and pay the minimum.
    pub fn cover_units(&self, prices: &[f64], to_cover: &[f64], lot_size: f64) -> PurchaseOutcome {
        let p = &self.params;
        let mut units = vec![0.0; prices.len()];
        let mut cash_spent = 0.0;
        let mut fee = 0.0;

        for (i, (&price, &amount)) in prices.iter().zip(to_cover).enumerate() {
            if !tradable(price) || !(amount > 0.0) {
                continue;
            }
            let qty = round_to_lot(amount, lot_size);
            if qty <= 0.0 {
                continue;
            }
            let value = qty * price;
            let asset_fee = if p.buy_fix != 0.0 {
                p.buy_fix + p.slippage * value * value
            } else {
                (value * (p.buy_rate + p.slippage * value)).max(p.buy_min)
            };
            units[i] = qty;
            cash_spent += value + asset_fee;
            fee += asset_fee;
        }

        PurchaseOutcome {
            units,
            cash_spent,
            fee,
        }
    }

    /// Spend up to `purchase_values[i]` on every asset whose signal is positive.
    pub fn purchase_result(
        &self,
        prices: &[f64],
        signals: &[f64],
        purchase_values: &[f64],
        lot_size: f64,
    ) -> PurchaseOutcome {
        let budget: Vec<f64> = signals
            .iter()
            .zip(purchase_values)
            .map(|(&s, &v)| if s > 0.0 { v } else { 0.0 })
            .collect();
        self.buy_notional(prices, &budget, lot_size)
    }

    /// Spend up to the given notional per asset, rounding quantities down to
    /// `lot_size` (0 allows fractional units). Never spends more than budgeted.
    pub fn buy_notional(&self, prices: &[f64], notional: &[f64], lot_size: f64) -> PurchaseOutcome {
        let p = &self.params;
        let mut units = vec![0.0; prices.len()];
        let mut cash_spent = 0.0;
        let mut fee = 0.0;

        for (i, (&price, &budget)) in prices.iter().zip(notional).enumerate() {
            if !tradable(price) || !(budget > 0.0) {
                continue;
            }
            let (qty, asset_fee) = if p.buy_fix != 0.0 {
                let fixed = p.buy_fix + p.slippage * budget * budget;
                if budget <= fixed {
                    continue;
                }
                let qty = round_to_lot((budget - fixed) / price, lot_size);
                (qty, fixed)
            } else {
                if budget < p.buy_min {
                    continue;
                }
                // The minimum fee is expressed as a rate on the notional left
                // after paying it, which keeps the total spend within budget.
                let min_rate = if p.buy_min > 0.0 {
                    let traded = budget - p.buy_min;
                    if traded <= 0.0 {
                        continue;
                    }
                    p.buy_min / traded
                } else {
                    0.0
                };
                let rate = p.buy_rate.max(min_rate) + p.slippage * budget;
                let qty = round_to_lot(budget / (price * (1.0 + rate)), lot_size);
                (qty, (qty * price * rate).max(p.buy_min))
            };
            if qty <= 0.0 {
                continue;
            }
            units[i] = qty;
            cash_spent += qty * price + asset_fee;
            fee += asset_fee;
        }

        PurchaseOutcome {
            units,
            cash_spent,
            fee,
        }
    }
}

impl Default for Cost {
    fn default() -> Self {
        Self {
            params: CostParams::default(),
        }
    }
}

impl TryFrom<CostParams> for Cost {
    type Error = CostError;

    fn try_from(params: CostParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

/// A price at which trading is possible.
pub fn tradable(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Round a quantity down to a whole number of lots. A lot size of 0 leaves
/// the quantity untouched.
pub fn round_to_lot(qty: f64, lot_size: f64) -> f64 {
    if lot_size > 0.0 {
        // Tolerance absorbs representation error such as 0.3 / 0.1.
        ((qty / lot_size) + 1e-9).floor() * lot_size
    } else {
        qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let p = CostParams::default();
        assert_eq!(p.buy_rate, 0.003);
        assert_eq!(p.sell_rate, 0.001);
        assert_eq!(p.buy_min, 5.0);
        assert_eq!(p.sell_min, 0.0);
        assert!(Cost::new(p).is_ok());
    }

    #[test]
    fn negative_parameter_is_rejected() {
        let p = CostParams {
            sell_rate: -0.1,
            ..CostParams::default()
        };
        assert_eq!(
            Cost::new(p),
            Err(CostError::Invalid {
                name: "sell_rate",
                value: -0.1
            })
        );
    }

    #[test]
    fn rate_of_one_is_rejected() {
        assert!(matches!(
            Cost::rate_only(1.0, 0.0),
            Err(CostError::RateTooHigh { .. })
        ));
    }

    #[test]
    fn frictionless_round_trip_is_lossless() {
        let cost = Cost::frictionless();
        let bought = cost.buy_notional(&[10.0], &[500.0], 0.0);
        assert!((bought.units[0] - 50.0).abs() < 1e-10);
        assert!((bought.cash_spent - 500.0).abs() < 1e-10);
        let sold = cost.sell_units(&[10.0], &[-50.0], 0.0);
        assert!((sold.cash_gained - 500.0).abs() < 1e-10);
        assert_eq!(sold.fee, 0.0);
    }

    #[test]
    fn rate_regime_buy() {
        let cost = Cost::rate_only(0.003, 0.001).unwrap();
        let r = cost.buy_notional(&[10.0], &[500.0], 1.0);
        // floor(500 / (10 * 1.003)) = 49
        assert_eq!(r.units[0], 49.0);
        assert!((r.fee - 49.0 * 10.0 * 0.003).abs() < 1e-10);
        assert!((r.cash_spent - (490.0 + r.fee)).abs() < 1e-10);
    }

    #[test]
    fn minimum_fee_keeps_spend_within_budget() {
        let cost = Cost::new(CostParams {
            buy_rate: 0.0003,
            buy_min: 5.0,
            ..CostParams::default()
        })
        .unwrap();
        let r = cost.buy_notional(&[10.0], &[1000.0], 0.0);
        assert!((r.fee - 5.0).abs() < 1e-10);
        assert!((r.cash_spent - 1000.0).abs() < 1e-9);
        assert!((r.units[0] - 99.5).abs() < 1e-9);
    }

    #[test]
    fn orders_below_minimum_fee_are_skipped() {
        let cost = Cost::default();
        let r = cost.buy_notional(&[10.0], &[4.0], 0.0);
        assert_eq!(r.units[0], 0.0);
        assert_eq!(r.cash_spent, 0.0);
    }

    #[test]
    fn fixed_regime_buy_charges_once_per_asset() {
        let cost = Cost::new(CostParams {
            buy_fix: 10.0,
            ..CostParams::default()
        })
        .unwrap();
        let r = cost.buy_notional(&[10.0, 20.0], &[110.0, 0.0], 0.0);
        assert!((r.units[0] - 10.0).abs() < 1e-10);
        assert_eq!(r.units[1], 0.0);
        assert!((r.fee - 10.0).abs() < 1e-10);
        assert!((r.cash_spent - 110.0).abs() < 1e-10);
    }

    #[test]
    fn zero_and_missing_prices_never_trade() {
        let cost = Cost::frictionless();
        let r = cost.buy_notional(&[0.0, f64::NAN], &[100.0, 100.0], 0.0);
        assert_eq!(r.units, vec![0.0, 0.0]);
        let s = cost.sell_units(&[0.0, f64::NAN], &[-1.0, -1.0], 0.0);
        assert_eq!(s.units, vec![0.0, 0.0]);
    }

    #[test]
    fn selling_by_signal_liquidates_fraction() {
        let cost = Cost::rate_only(0.0, 0.001).unwrap();
        let r = cost.selling_result(&[20.0, 5.0], &[-0.5, 0.3], &[100.0, 40.0], 0.0);
        assert_eq!(r.units, vec![-50.0, 0.0]);
        assert!((r.fee - 1.0).abs() < 1e-10);
        assert!((r.cash_gained - 999.0).abs() < 1e-10);
    }

    #[test]
    fn sell_lot_truncates() {
        let cost = Cost::frictionless();
        let r = cost.sell_units(&[1.0], &[-250.0], 100.0);
        assert_eq!(r.units, vec![-200.0]);
    }

    #[test]
    fn sell_minimum_fee_applies() {
        let cost = Cost::new(CostParams {
            sell_rate: 0.001,
            sell_min: 5.0,
            buy_min: 0.0,
            ..CostParams::default()
        })
        .unwrap();
        let r = cost.sell_units(&[10.0], &[-10.0], 0.0);
        assert!((r.fee - 5.0).abs() < 1e-10);
        assert!((r.cash_gained - 95.0).abs() < 1e-10);
    }

    #[test]
    fn sale_smaller_than_minimum_fee_is_skipped() {
        let cost = Cost::new(CostParams {
            sell_rate: 0.001,
            sell_min: 50.0,
            buy_min: 0.0,
            ..CostParams::default()
        })
        .unwrap();
        // 2 units at 10 would pay a 50 fee on 20 of proceeds.
        let r = cost.sell_units(&[10.0, 10.0], &[-2.0, -10.0], 0.0);
        assert_eq!(r.units, vec![0.0, -10.0]);
        assert!((r.fee - 50.0).abs() < 1e-10);
        assert!((r.cash_gained - 50.0).abs() < 1e-10);
        assert!(r.cash_gained >= 0.0);
    }

    #[test]
    fn covering_pays_buy_side_fees() {
        let cost = Cost::new(CostParams {
            buy_rate: 0.01,
            buy_min: 5.0,
            ..CostParams::default()
        })
        .unwrap();
        let r = cost.cover_units(&[10.0, 10.0], &[100.0, 2.0], 0.0);
        assert_eq!(r.units, vec![100.0, 2.0]);
        // 1% of 1000, then the 5 minimum on 20.
        assert!((r.fee - 15.0).abs() < 1e-10);
        assert!((r.cash_spent - 1035.0).abs() < 1e-10);
        let lots = cost.cover_units(&[10.0], &[250.0], 100.0);
        assert_eq!(lots.units, vec![200.0]);
    }

    #[test]
    fn purchase_result_ignores_non_positive_signals() {
        let cost = Cost::frictionless();
        let r = cost.purchase_result(&[10.0, 10.0], &[0.5, -0.5], &[100.0, 100.0], 0.0);
        assert_eq!(r.units, vec![10.0, 0.0]);
    }

    #[test]
    fn lot_rounding() {
        assert_eq!(round_to_lot(249.0, 100.0), 200.0);
        assert!((round_to_lot(0.3, 0.1) - 0.3).abs() < 1e-12);
        assert_eq!(round_to_lot(3.7, 0.0), 3.7);
    }
}
