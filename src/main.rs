use clap::Parser;
use lotgate::cli::{Cli, Commands};
use lotgate::config::Config;
use lotgate::journal::ExecutionJournal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::from_toml(include_str!("../config.toml.example")).expect("Invalid default config")
    });

    // Initialize telemetry
    lotgate::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting live trading cycle");
            args.execute(&config).await?;
        }
        Commands::Status => {
            let journal =
                ExecutionJournal::new(&config.journal.path, config.journal.flush_threshold);
            let tail = journal.read_tail(20);
            if tail.is_empty() {
                println!("No journal entries at {}", config.journal.path.display());
            } else {
                for event in tail {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Data dir: {}", config.engine.data_dir.display());
            println!("  Initial capital: {}", config.engine.initial_capital);
            println!("  Execution: {:?}", config.execution.mode);
            println!(
                "  Risk: per-trade {}%, stop {}%, exposure cap {}%",
                config.risk.per_trade_risk_pct * rust_decimal_macros::dec!(100),
                config.risk.stop_loss_pct * rust_decimal_macros::dec!(100),
                config.risk.effective_exposure_cap() * rust_decimal_macros::dec!(100)
            );
            for (name, spec) in &config.strategies {
                println!("  Strategy {}: {:?}", name, spec.symbols);
            }
        }
    }

    Ok(())
}
