//! Daily drawdown kill switch
//!
//! Equity is measured against the first fresh reading of the local day. A
//! breach must persist for the debounce period before the account is
//! liquidated. Once every position is closed the switch latches until the
//! next day or a manual reset with the current token.

use crate::ledger::LedgerError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use uuid::Uuid;

/// Where an account is in the kill switch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum KillSwitchPhase {
    /// Drawdown below threshold
    Normal,
    /// Drawdown at or past threshold, waiting out the debounce
    Breaching { since: DateTime<Utc> },
    /// Fired but some positions could not be closed yet
    Liquidating,
    /// Fired and fully liquidated; opens are blocked
    Tripped,
}

/// Point-in-time kill switch view for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillSwitchStatus {
    #[serde(flatten)]
    pub phase: KillSwitchPhase,
    pub starting_equity: Option<Decimal>,
    pub equity: Decimal,
    pub drawdown_pct: Option<Decimal>,
    /// Seconds until a running breach fires
    pub seconds_remaining: Option<i64>,
}

/// Result of feeding one equity reading to the kill switch
#[derive(Debug, Clone, PartialEq)]
pub enum KillSwitchDecision {
    /// Nothing to do
    Hold,
    /// First fresh reading of the day became the baseline
    Baseline(Decimal),
    /// Drawdown just crossed the threshold
    BreachStarted { drawdown_pct: Decimal },
    /// Still breaching, debounce not yet elapsed
    Breaching {
        drawdown_pct: Decimal,
        elapsed: Duration,
    },
    /// Drawdown fell back under the threshold before firing
    Recovered { drawdown_pct: Decimal },
    /// Liquidate everything now
    Fire { drawdown_pct: Option<Decimal> },
}

/// Per-account kill switch state, held in memory for the process lifetime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskState {
    /// Local calendar day the state belongs to
    pub day_key: Option<NaiveDate>,
    /// Equity baseline for the day
    pub starting_equity: Option<Decimal>,
    /// When the current breach began
    pub breach_started_at: Option<DateTime<Utc>>,
    /// Latched after a completed liquidation
    pub kill_switch_active: bool,
    /// Fired, waiting for the remaining positions to close
    pub liquidation_pending: bool,
    /// Single-use token required for a manual reset
    pub reset_token: Uuid,
}

impl Default for RiskState {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskState {
    /// Fresh state with a new reset token
    pub fn new() -> Self {
        Self {
            day_key: None,
            starting_equity: None,
            breach_started_at: None,
            kill_switch_active: false,
            liquidation_pending: false,
            reset_token: Uuid::new_v4(),
        }
    }

    pub fn phase(&self) -> KillSwitchPhase {
        if self.kill_switch_active {
            KillSwitchPhase::Tripped
        } else if self.liquidation_pending {
            KillSwitchPhase::Liquidating
        } else if let Some(since) = self.breach_started_at {
            KillSwitchPhase::Breaching { since }
        } else {
            KillSwitchPhase::Normal
        }
    }

    /// Status at `equity`, with the debounce countdown when breaching
    pub fn status(&self, equity: Decimal, now: DateTime<Utc>, debounce: Duration) -> KillSwitchStatus {
        let phase = self.phase();
        let seconds_remaining = match phase {
            KillSwitchPhase::Breaching { since } => {
                Some((since + debounce - now).num_seconds().max(0))
            }
            _ => None,
        };
        KillSwitchStatus {
            phase,
            starting_equity: self.starting_equity,
            equity,
            drawdown_pct: self.drawdown_pct(equity).map(|d| d.round_dp(4)),
            seconds_remaining,
        }
    }

    /// Opening positions is blocked
    pub fn trading_halted(&self) -> bool {
        self.kill_switch_active || self.liquidation_pending
    }

    /// Start a new local day if `today` differs. Returns true when the day
    /// changed. A latched kill switch is released and its token rotated; a
    /// liquidation still in progress carries over.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        if self.day_key == Some(today) {
            return false;
        }
        self.day_key = Some(today);
        self.starting_equity = None;
        self.breach_started_at = None;
        if self.kill_switch_active {
            self.kill_switch_active = false;
            self.reset_token = Uuid::new_v4();
        }
        true
    }

    /// Drawdown from the day's baseline, in percent
    pub fn drawdown_pct(&self, equity: Decimal) -> Option<Decimal> {
        let start = self.starting_equity.filter(|s| *s > Decimal::ZERO)?;
        Some((start - equity) / start * dec!(100))
    }

    /// Feed a fresh equity reading
    pub fn observe(
        &mut self,
        equity: Decimal,
        now: DateTime<Utc>,
        threshold_pct: Decimal,
        debounce: Duration,
    ) -> KillSwitchDecision {
        if self.kill_switch_active {
            return KillSwitchDecision::Hold;
        }
        if self.liquidation_pending {
            return KillSwitchDecision::Fire {
                drawdown_pct: self.drawdown_pct(equity),
            };
        }
        if self.starting_equity.is_none() {
            self.starting_equity = Some(equity);
            return KillSwitchDecision::Baseline(equity);
        }
        let Some(drawdown_pct) = self.drawdown_pct(equity) else {
            return KillSwitchDecision::Hold;
        };

        if drawdown_pct >= threshold_pct {
            let since = *self.breach_started_at.get_or_insert(now);
            let elapsed = now - since;
            if elapsed >= debounce {
                self.liquidation_pending = true;
                KillSwitchDecision::Fire {
                    drawdown_pct: Some(drawdown_pct),
                }
            } else if since == now {
                KillSwitchDecision::BreachStarted { drawdown_pct }
            } else {
                KillSwitchDecision::Breaching {
                    drawdown_pct,
                    elapsed,
                }
            }
        } else if self.breach_started_at.take().is_some() {
            KillSwitchDecision::Recovered { drawdown_pct }
        } else {
            KillSwitchDecision::Hold
        }
    }

    /// Liquidation finished; latch the switch
    pub fn mark_tripped(&mut self) {
        self.kill_switch_active = true;
        self.liquidation_pending = false;
        self.breach_started_at = None;
    }

    /// Clear the switch with the current token and rotate it. Refused while
    /// a liquidation is in progress; the token stays valid.
    pub fn manual_reset(&mut self, token: Uuid) -> Result<Uuid, LedgerError> {
        if token != self.reset_token {
            return Err(LedgerError::InvalidResetToken);
        }
        if self.liquidation_pending {
            return Err(LedgerError::LiquidationPending);
        }
        self.kill_switch_active = false;
        self.breach_started_at = None;
        self.starting_equity = None;
        self.reset_token = Uuid::new_v4();
        Ok(self.reset_token)
    }
}
