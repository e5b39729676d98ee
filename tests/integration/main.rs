//! Integration tests

mod common;
mod e2e_test;
mod gateway_test;
mod ledger_test;
mod risk_test;
