mod cli;
mod config;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use config::load_config;
use libinitializer::with_xline::run_initializer_with_xline;
use log::{error, info};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Start {
            config,
            initializer_name,
            annotation,
            configmap,
            namespace,
        } => {
            let cfg = load_config(config.to_str().context("config path is not valid utf-8")?)?;
            let mut settings = cfg.initializer;
            if let Some(name) = initializer_name {
                settings.initializer_name = name.clone();
            }
            if let Some(annotation) = annotation {
                settings.annotation = annotation.clone();
            }
            if let Some(configmap) = configmap {
                settings.configmap_name = configmap.clone();
            }
            if let Some(namespace) = namespace {
                settings.configmap_namespace = namespace.clone();
            }
            let endpoints: Vec<&str> = cfg
                .xline_config
                .endpoints
                .iter()
                .map(|s| s.as_str())
                .collect();

            info!(
                "[pvinit] starting, initializer name {}",
                settings.initializer_name
            );
            let cancel = CancellationToken::new();
            let mut controller = {
                let cancel = cancel.clone();
                let endpoints: Vec<String> =
                    endpoints.iter().map(|s| s.to_string()).collect();
                tokio::spawn(async move {
                    let endpoints: Vec<&str> = endpoints.iter().map(|s| s.as_str()).collect();
                    run_initializer_with_xline(&endpoints, settings, cancel).await
                })
            };

            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for shutdown signal")?;
                    info!("[pvinit] shutdown signal received");
                    cancel.cancel();
                    controller
                        .await
                        .context("controller task failed")??;
                }
                // a controller that stops on its own (sync timeout,
                // store failure) is fatal
                result = &mut controller => {
                    match result.context("controller task failed")? {
                        Ok(()) => error!("controller stopped unexpectedly"),
                        Err(e) => {
                            error!("controller failed: {e:?}");
                            return Err(e);
                        }
                    }
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
