//! Per-position stop-loss and take-profit triggers

use crate::ledger::{Account, Position, Side};
use crate::quotes::PriceLookup;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Which threshold fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitKind {
    StopLoss,
    TakeProfit,
}

/// A fired threshold. The position closes at `threshold`, not at the quote.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitTrigger {
    pub kind: ExitKind,
    pub threshold: Decimal,
    pub pct: Decimal,
}

impl ExitTrigger {
    /// Reason written to the trade log
    pub fn reason(&self) -> String {
        match self.kind {
            ExitKind::StopLoss => format!("Stop loss hit ({}%)", self.pct.normalize()),
            ExitKind::TakeProfit => format!("Take profit hit ({}%)", self.pct.normalize()),
        }
    }
}

/// Exit due on one open position
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExit {
    pub symbol: String,
    pub position_id: Uuid,
    pub trigger: ExitTrigger,
}

/// Check a position against `price`. Stop-loss wins when both cross.
pub fn check_exit(position: &Position, price: Decimal) -> Option<ExitTrigger> {
    let (stop_hit, target_hit) = match position.side {
        Side::Long => (
            price <= position.stop_loss_price,
            price >= position.take_profit_price,
        ),
        Side::Short => (
            price >= position.stop_loss_price,
            price <= position.take_profit_price,
        ),
    };

    if stop_hit {
        Some(ExitTrigger {
            kind: ExitKind::StopLoss,
            threshold: position.stop_loss_price,
            pct: position.stop_loss_pct,
        })
    } else if target_hit {
        Some(ExitTrigger {
            kind: ExitKind::TakeProfit,
            threshold: position.take_profit_price,
            pct: position.take_profit_pct,
        })
    } else {
        None
    }
}

/// Every exit due on the account. Symbols without a price are skipped.
pub fn scan_exits(account: &Account, prices: &dyn PriceLookup) -> Vec<PendingExit> {
    let mut due = Vec::new();
    for (symbol, held) in &account.positions {
        let Some(price) = prices.price(symbol) else {
            continue;
        };
        for position in held {
            if let Some(trigger) = check_exit(position, price) {
                due.push(PendingExit {
                    symbol: symbol.clone(),
                    position_id: position.id,
                    trigger,
                });
            }
        }
    }
    due
}
