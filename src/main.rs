use clap::Parser;
use margin_ledger::cli::{Cli, Commands};
use margin_ledger::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {:#}", cli.config, e);
            eprintln!("Using default configuration");
            Config::from_toml(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    let _telemetry = margin_ledger::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(accounts = config.accounts.len(), "Starting ledger");
            args.execute(&config).await?;
        }
        Commands::Status(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Ledger: start balance {}, timezone {}",
                config.ledger.starting_balance, config.ledger.timezone
            );
            println!(
                "  Risk: check every {}s, debounce {}s, max quote age {}s",
                config.risk.check_interval_secs,
                config.risk.kill_switch_debounce_secs,
                config.risk.max_price_age_secs
            );
            println!(
                "  Quotes: {} (timeout {}ms) watching {:?}",
                config.quotes.base_url, config.quotes.timeout_ms, config.quotes.symbols
            );
            println!("  Store: {}", config.store.data_dir.display());
            for account in &config.accounts {
                let s = account.settings(&config.defaults);
                println!(
                    "  Account {} ({}): x{} SL {}% TP {}% kill {}% margin {} max {}/symbol hours {:?}",
                    account.id,
                    account.display_name(),
                    s.leverage,
                    s.stop_loss_pct,
                    s.take_profit_pct,
                    s.kill_switch_pct,
                    s.margin_fraction,
                    s.max_positions_per_symbol,
                    s.buy_hours
                );
            }
        }
    }

    Ok(())
}
