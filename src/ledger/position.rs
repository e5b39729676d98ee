//! Position arithmetic on a single account
//!
//! Every operation validates before it mutates, so an `Err` always leaves the
//! account exactly as it was.

use super::types::{Account, ClosedSummary, LedgerError, OpenRequest, Position, Side, TradeRecord};
use crate::quotes::PriceLookup;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Decimal places kept on position volume
pub const VOLUME_DP: u32 = 6;

/// Stop-loss and take-profit prices for a fresh position.
///
/// Both are fixed at open and never trail the market.
pub fn exit_thresholds(
    side: Side,
    entry: Decimal,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
) -> (Decimal, Decimal) {
    let sl = stop_loss_pct / dec!(100);
    let tp = take_profit_pct / dec!(100);
    match side {
        Side::Long => (entry * (Decimal::ONE - sl), entry * (Decimal::ONE + tp)),
        Side::Short => (entry * (Decimal::ONE + sl), entry * (Decimal::ONE - tp)),
    }
}

impl Account {
    /// Create an empty account holding `balance` in cash
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            positions: BTreeMap::new(),
            trade_log: vec![],
        }
    }

    /// Number of open positions on `symbol`
    pub fn open_count(&self, symbol: &str) -> usize {
        self.positions.get(symbol).map_or(0, Vec::len)
    }

    /// Total number of open positions
    pub fn total_open(&self) -> usize {
        self.positions.values().map(Vec::len).sum()
    }

    /// Symbols with at least one open position
    pub fn symbols(&self) -> Vec<String> {
        self.positions
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// Iterate over `(symbol, position)` pairs
    pub fn iter_positions(&self) -> impl Iterator<Item = (&str, &Position)> {
        self.positions
            .iter()
            .flat_map(|(symbol, list)| list.iter().map(move |p| (symbol.as_str(), p)))
    }

    /// Margin currently committed to open positions
    pub fn margin_in_use(&self) -> Decimal {
        self.iter_positions().map(|(_, p)| p.margin_used).sum()
    }

    /// Unrealized P&L at current quotes; unquoted symbols contribute zero
    pub fn unrealized_pnl(&self, prices: &dyn PriceLookup) -> Decimal {
        self.iter_positions()
            .filter_map(|(symbol, p)| prices.price(symbol).map(|price| p.unrealized_pnl(price)))
            .sum()
    }

    /// Balance plus committed margin plus unrealized P&L
    pub fn equity(&self, prices: &dyn PriceLookup) -> Decimal {
        self.balance + self.margin_in_use() + self.unrealized_pnl(prices)
    }

    /// Open a leveraged position sized from the current balance
    pub fn open_position(
        &mut self,
        req: &OpenRequest,
        now: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        if req.signal_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(format!(
                "signal price must be positive, got {}",
                req.signal_price
            )));
        }
        if req.leverage == 0 {
            return Err(LedgerError::InvalidInput("leverage must be at least 1".into()));
        }

        let margin_used = self.balance * req.margin_fraction;
        if margin_used <= Decimal::ZERO || self.balance < margin_used {
            return Err(LedgerError::InsufficientBalance {
                needed: margin_used,
                available: self.balance,
            });
        }

        if self.open_count(&req.symbol) >= req.max_positions_per_symbol {
            return Err(LedgerError::PositionLimitReached {
                symbol: req.symbol.clone(),
                max: req.max_positions_per_symbol,
            });
        }

        let leverage = Decimal::from(req.leverage);
        let volume = (margin_used * leverage / req.signal_price).round_dp(VOLUME_DP);
        if volume <= Decimal::ZERO {
            return Err(LedgerError::InvalidVolume(volume));
        }

        let (stop_loss_price, take_profit_price) = exit_thresholds(
            req.side,
            req.signal_price,
            req.stop_loss_pct,
            req.take_profit_pct,
        );

        let position = Position {
            id: Uuid::new_v4(),
            side: req.side,
            volume,
            entry_price: req.signal_price,
            leverage: req.leverage,
            margin_used,
            stop_loss_pct: req.stop_loss_pct,
            take_profit_pct: req.take_profit_pct,
            stop_loss_price,
            take_profit_price,
            opened_at: now,
        };

        self.balance -= margin_used;
        self.positions
            .entry(req.symbol.clone())
            .or_default()
            .push(position.clone());
        self.trade_log.push(TradeRecord {
            timestamp: now,
            action: req.side.open_action(),
            symbol: req.symbol.clone(),
            reason: req.reason.clone(),
            price: req.signal_price,
            amount: volume,
            profit: None,
            balance_after: self.balance,
            leverage: req.leverage,
            avg_entry: None,
            pl_pct: None,
        });

        Ok(position)
    }

    /// Close every `side` position on `symbol` as one batch
    pub fn close_positions(
        &mut self,
        symbol: &str,
        side: Side,
        exit_price: Decimal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ClosedSummary, LedgerError> {
        check_exit_price(exit_price)?;

        let held = self.positions.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        if !held.iter().any(|p| p.side == side) {
            return Err(LedgerError::NoMatchingPositions {
                symbol: symbol.to_string(),
                side,
            });
        }

        let (closing, keep): (Vec<Position>, Vec<Position>) =
            held.iter().cloned().partition(|p| p.side == side);
        self.replace_positions(symbol, keep);
        Ok(self.settle(symbol, side, &closing, exit_price, reason, now))
    }

    /// Close a single position by id
    pub fn close_position(
        &mut self,
        symbol: &str,
        position_id: Uuid,
        exit_price: Decimal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ClosedSummary, LedgerError> {
        check_exit_price(exit_price)?;

        let held = self.positions.get(symbol).map(Vec::as_slice).unwrap_or(&[]);
        let Some(position) = held.iter().find(|p| p.id == position_id).cloned() else {
            return Err(LedgerError::PositionNotFound(position_id));
        };

        let keep = held.iter().filter(|p| p.id != position_id).cloned().collect();
        self.replace_positions(symbol, keep);
        Ok(self.settle(
            symbol,
            position.side,
            std::slice::from_ref(&position),
            exit_price,
            reason,
            now,
        ))
    }

    fn replace_positions(&mut self, symbol: &str, keep: Vec<Position>) {
        if keep.is_empty() {
            self.positions.remove(symbol);
        } else {
            self.positions.insert(symbol.to_string(), keep);
        }
    }

    /// Realize P&L for already-removed positions and log one record.
    ///
    /// Profit is realized on volume only; leverage already sized the volume
    /// at open and is not applied again here.
    fn settle(
        &mut self,
        symbol: &str,
        side: Side,
        closing: &[Position],
        exit_price: Decimal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ClosedSummary {
        let total_volume: Decimal = closing.iter().map(|p| p.volume).sum();
        let total_margin: Decimal = closing.iter().map(|p| p.margin_used).sum();
        let weighted: Decimal = closing.iter().map(|p| p.entry_price * p.volume).sum();
        let avg_entry = weighted.checked_div(total_volume).unwrap_or(Decimal::ZERO);
        // Equal to side.pnl(avg_entry, exit, total_volume) without the division error
        let profit: Decimal = closing
            .iter()
            .map(|p| side.pnl(p.entry_price, exit_price, p.volume))
            .sum();
        let pl_pct = side
            .pnl(avg_entry, exit_price, Decimal::ONE)
            .checked_div(avg_entry)
            .map(|r| (r * dec!(100)).round_dp(4))
            .unwrap_or(Decimal::ZERO);
        let leverage = closing.iter().map(|p| p.leverage).max().unwrap_or(1);

        self.balance += total_margin + profit;
        self.trade_log.push(TradeRecord {
            timestamp: now,
            action: side.close_action(),
            symbol: symbol.to_string(),
            reason: reason.to_string(),
            price: exit_price,
            amount: total_volume,
            profit: Some(profit),
            balance_after: self.balance,
            leverage,
            avg_entry: Some(avg_entry),
            pl_pct: Some(pl_pct),
        });

        ClosedSummary {
            symbol: symbol.to_string(),
            side,
            positions: closing.len(),
            total_volume,
            total_margin,
            avg_entry,
            exit_price,
            profit,
            pl_pct,
            balance_after: self.balance,
        }
    }
}

fn check_exit_price(exit_price: Decimal) -> Result<(), LedgerError> {
    if exit_price <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput(format!(
            "exit price must be positive, got {exit_price}"
        )));
    }
    Ok(())
}
