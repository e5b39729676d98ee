//! Risk module
//!
//! Stop-loss and take-profit exits, the daily drawdown kill switch, and the
//! controller loop that enforces both.

mod controller;
mod exits;
mod kill_switch;

pub use controller::{RiskController, RiskControllerConfig, TickReport, KILL_SWITCH_REASON};
pub use exits::{check_exit, scan_exits, ExitKind, ExitTrigger, PendingExit};
pub use kill_switch::{KillSwitchDecision, KillSwitchPhase, KillSwitchStatus, RiskState};
