//! Simulator configuration and execution cost models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for the backtest simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Starting account balance.
    pub initial_capital: Decimal,
    /// Slippage model applied to every fill.
    pub slippage_model: SlippageModel,
    /// Fee model applied to every fill.
    pub fee_model: FeeModel,
    /// Fraction of equity committed per position (1.0 = all of it).
    pub position_size_pct: Decimal,
    /// Smallest notional an entry may have.
    pub min_position_size: Decimal,
    /// Close whatever is open at the last bar's close.
    pub close_at_end: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::new(10000, 0),
            slippage_model: SlippageModel::Fixed(Decimal::new(5, 4)), // 0.05%
            fee_model: FeeModel::Fixed(Decimal::new(1, 3)),           // 0.1%
            position_size_pct: Decimal::ONE,
            min_position_size: Decimal::new(10, 0),
            close_at_end: true,
        }
    }
}

/// Slippage model for simulating execution impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageModel {
    /// No slippage.
    None,
    /// Fixed fraction of the price.
    Fixed(Decimal),
    /// Grows with order size.
    VolumeBased {
        base_pct: Decimal,
        /// Added fraction per unit of quantity.
        size_impact: Decimal,
    },
    /// Cheaper during active hours (09:00-17:00 UTC).
    TimeAdjusted {
        base_pct: Decimal,
        prime_time_multiplier: Decimal,
        off_hours_multiplier: Decimal,
    },
}

impl SlippageModel {
    /// Per-unit price impact of filling `quantity` at `price` during UTC `hour`.
    pub fn calculate(&self, price: Decimal, quantity: Decimal, hour: u32) -> Decimal {
        match self {
            SlippageModel::None => Decimal::ZERO,
            SlippageModel::Fixed(pct) => price * pct,
            SlippageModel::VolumeBased { base_pct, size_impact } => {
                price * (*base_pct + quantity * size_impact)
            }
            SlippageModel::TimeAdjusted {
                base_pct,
                prime_time_multiplier,
                off_hours_multiplier,
            } => {
                let time_mult = if (9..=17).contains(&hour) {
                    *prime_time_multiplier
                } else {
                    *off_hours_multiplier
                };
                price * *base_pct * time_mult
            }
        }
    }
}

/// Fee model for simulating trading costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeModel {
    /// Fixed fraction of traded value.
    Fixed(Decimal),
    /// Maker rate for resting take-profit exits, taker rate for market fills.
    MakerTaker {
        maker_fee: Decimal,
        taker_fee: Decimal,
    },
    /// Fee fraction chosen by cumulative traded value.
    VolumeTiered {
        /// `(volume_threshold, fee_pct)` pairs in ascending threshold order.
        tiers: Vec<(Decimal, Decimal)>,
        default_fee: Decimal,
    },
}

impl Default for FeeModel {
    fn default() -> Self {
        FeeModel::Fixed(Decimal::new(1, 3))
    }
}

impl FeeModel {
    pub fn calculate(&self, value: Decimal, is_maker: bool, cumulative_volume: Decimal) -> Decimal {
        match self {
            FeeModel::Fixed(pct) => value * pct,
            FeeModel::MakerTaker { maker_fee, taker_fee } => {
                let fee_pct = if is_maker { *maker_fee } else { *taker_fee };
                value * fee_pct
            }
            FeeModel::VolumeTiered { tiers, default_fee } => {
                let fee_pct = tiers
                    .iter()
                    .filter(|(threshold, _)| cumulative_volume >= *threshold)
                    .map(|(_, fee)| *fee)
                    .last()
                    .unwrap_or(*default_fee);
                value * fee_pct
            }
        }
    }
}
