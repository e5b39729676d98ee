//! Read-only account views: realized P&L per symbol, trades grouped by
//! local day, and open position marks.

use super::{Account, Side, TradeRecord};
use crate::quotes::PriceLookup;
use chrono::NaiveDate;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Realized profit summed per symbol. Opening records carry no profit.
pub fn symbol_pnl(trades: &[TradeRecord]) -> BTreeMap<String, Decimal> {
    let mut totals = BTreeMap::new();
    for trade in trades {
        if let Some(profit) = trade.profit {
            *totals.entry(trade.symbol.clone()).or_insert(Decimal::ZERO) += profit;
        }
    }
    totals
}

/// Trades bucketed by local calendar day, newest day first
pub fn trades_by_date(trades: &[TradeRecord], tz: Tz) -> Vec<(NaiveDate, Vec<&TradeRecord>)> {
    let mut days: BTreeMap<NaiveDate, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in trades {
        let day = trade.timestamp.with_timezone(&tz).date_naive();
        days.entry(day).or_default().push(trade);
    }
    days.into_iter().rev().collect()
}

/// Mark-to-market view of one open position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionStat {
    pub symbol: String,
    pub id: Uuid,
    pub side: Side,
    pub volume: Decimal,
    pub entry_price: Decimal,
    /// None when no quote is known
    pub current_price: Option<Decimal>,
    pub leverage: u32,
    pub margin_used: Decimal,
    pub position_size: Decimal,
    pub unrealized_pnl: Option<Decimal>,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
}

pub fn position_stats(account: &Account, prices: &dyn PriceLookup) -> Vec<PositionStat> {
    account
        .iter_positions()
        .map(|(symbol, p)| {
            let current_price = prices.price(symbol);
            PositionStat {
                symbol: symbol.to_string(),
                id: p.id,
                side: p.side,
                volume: p.volume,
                entry_price: p.entry_price,
                current_price,
                leverage: p.leverage,
                margin_used: p.margin_used,
                position_size: p.position_size(),
                unrealized_pnl: current_price.map(|price| p.unrealized_pnl(price)),
                stop_loss_price: p.stop_loss_price,
                take_profit_price: p.take_profit_price,
            }
        })
        .collect()
}
