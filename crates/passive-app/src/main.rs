//! Passive Scanner - records unique requests seen by an intercepting proxy.
//!
//! Runs the proxy until the maximum run time elapses or the operator
//! interrupts it, then writes the captured requests to the run log.

use clap::Parser;
use passive_app::logging::init_logging;
use passive_app::{generate_ca, Args, BuildInfo, RunController};
use passive_core::settings::executable_dir;

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let build = BuildInfo::current();

    if args.version {
        print!("{}", build.banner());
        return Ok(());
    }

    let base_dir = executable_dir()?;

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(args.effective_log_level(), Some(&base_dir));

    tracing::info!("Starting passivescanner {} ({})", build.version, build.build_time);
    tracing::debug!("Args: {:?}", args);

    if args.generate_ca {
        let (cert, key) = generate_ca(args.ca_outputdir.as_deref())?;
        tracing::info!("Generated CA certificate {:?} and key {:?}", cert, key);
        return Ok(());
    }

    let settings = args.run_settings(&base_dir)?;
    let mut controller = RunController::new(settings);
    let outcome = controller.run(shutdown_signal()).await;

    if outcome.is_termination() {
        tracing::info!("Run finished: {}", outcome);
        Ok(())
    } else {
        tracing::error!("Run failed: {}", outcome);
        Err(outcome.into())
    }
}
