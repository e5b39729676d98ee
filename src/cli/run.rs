//! Run command implementation

use crate::config::Config;
use crate::gateway::{GatewayCommand, SignalGateway};
use crate::ledger::Ledger;
use crate::quotes::{CoinexClient, CoinexConfig, QuoteCache};
use crate::risk::{RiskController, RiskControllerConfig};
use crate::store::JsonFileStore;
use anyhow::Context;
use chrono::Utc;
use clap::Args;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Do not fetch quotes; prices come only from signals
    #[arg(long)]
    pub offline: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = JsonFileStore::open(&config.store.data_dir).await?;
        let ledger = Arc::new(
            Ledger::from_config(Arc::new(store), config)
                .await
                .context("Failed to load accounts")?,
        );
        for id in ledger.account_ids() {
            let token = ledger.reset_token(id).await?;
            tracing::info!(account = %id, reset_token = %token, "Account ready");
        }

        let quotes = Arc::new(QuoteCache::new());
        let mut controller = RiskController::new(
            Arc::clone(&ledger),
            Arc::clone(&quotes),
            RiskControllerConfig::from_config(config)?,
        );
        if !self.offline {
            let client = CoinexClient::with_config(CoinexConfig {
                base_url: config.quotes.base_url.clone(),
                timeout: Duration::from_millis(config.quotes.timeout_ms),
            })?;
            controller = controller.with_source(Arc::new(client));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controller_handle = Arc::new(controller).run(shutdown_rx);

        let gateway = SignalGateway::new(Arc::clone(&ledger), quotes, config.timezone()?)?;
        tracing::info!("Reading signals from stdin");
        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Interrupted");
        };
        let served = serve(
            &gateway,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            interrupted,
        )
        .await;

        // Receiver may already be gone if the controller exited early
        let _ = shutdown_tx.send(true);
        controller_handle.await.context("Risk controller task failed")?;
        served?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

/// Answer gateway lines from `input` until `shutdown` completes. Closed
/// input stops reading but the risk controller keeps running.
async fn serve<R, W>(
    gateway: &SignalGateway,
    input: R,
    mut out: W,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut input_open = true;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => {
                        let reply = handle_line(gateway, &line).await;
                        out.write_all(format!("{reply}\n").as_bytes()).await?;
                        out.flush().await?;
                    }
                    None => {
                        tracing::info!("Signal input closed, risk controller runs until interrupted");
                        input_open = false;
                    }
                }
            }
            _ = &mut shutdown => return Ok(()),
        }
    }
}

/// Process one input line; the returned JSON is written to stdout
async fn handle_line(gateway: &SignalGateway, line: &str) -> serde_json::Value {
    let command: GatewayCommand = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed gateway input");
            return json!({ "status": "error", "error": format!("malformed input: {e}") });
        }
    };

    match gateway.dispatch(command, Utc::now()).await {
        Ok(outcome) => serde_json::to_value(&outcome)
            .unwrap_or_else(|e| json!({ "status": "error", "error": e.to_string() })),
        Err(e) => {
            tracing::warn!(error = %e, "Signal rejected");
            json!({ "status": "error", "error": e.to_string() })
        }
    }
}
