//! Run command implementation

use crate::config::Config;
use crate::engine::Engine;
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut engine = Engine::from_config(config)?;
        engine.start();

        if self.once {
            engine.run_once().await;
            engine.stop();
            return Ok(());
        }

        let mut ticker = tokio::time::interval(engine.tick_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    engine.run_once().await;
                }
                result = tokio::signal::ctrl_c() => {
                    result?;
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }
        engine.stop();
        Ok(())
    }
}
