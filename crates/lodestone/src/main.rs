//! Main application entry point for the Lodestone server
//!
//! Parses the command line, sets up logging, launches the server and then
//! waits for a termination signal or a `stop` from the console.

mod cli;
mod commands;
mod logging;
mod signals;

use cli::CliAction;
use commands::Flow;
use game_server::{GameServer, ServerError};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Prints the startup failure and tears down whatever did come up.
async fn abort_startup(server: &GameServer, e: &ServerError) -> ExitCode {
    for line in e.diagnosis() {
        error!("{line}");
    }
    server.shutdown().await;
    server.wait_for_network_closed().await;
    server.disarm_watchdog();
    exit_code(e.exit_code())
}

enum Event {
    Signal(std::io::Result<&'static str>),
    Line(Option<String>),
}

/// Runs until a signal arrives or the console says `stop`.
async fn serve(server: &Arc<GameServer>) {
    let mut lines = server.console().take_receiver();
    let terminate = signals::wait_for_termination();
    tokio::pin!(terminate);

    loop {
        let next_line = async {
            match lines.as_mut() {
                Some(rx) => rx.recv().await,
                None => std::future::pending().await,
            }
        };

        let event = tokio::select! {
            signal = &mut terminate => Event::Signal(signal),
            line = next_line => Event::Line(line),
        };

        match event {
            Event::Signal(Err(e)) => {
                error!("Failed to listen for termination signals: {e}");
                return;
            }
            Event::Signal(Ok(_)) => return,
            Event::Line(Some(line)) => {
                if commands::dispatch(server, &line).await == Flow::Stop {
                    return;
                }
            }
            // console stopped; keep waiting for a signal
            Event::Line(None) => lines = None,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let source = match cli::parse_args(&args, &mut std::io::stderr()) {
        Ok(CliAction::Run(source)) => source,
        Ok(CliAction::Help(text)) => {
            println!("{text}");
            return ExitCode::SUCCESS;
        }
        Ok(CliAction::Version(version)) => {
            println!("{version}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    // loaded once up front for the logging settings; start loads it again
    let config = match source.load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error during server startup: {e}");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = logging::setup_logging(&config) {
        eprintln!("❌ Failed to set up logging: {e:#}");
        return ExitCode::from(1);
    }

    info!("🌟 Lodestone {} starting", env!("CARGO_PKG_VERSION"));
    info!("📂 Config: {}", source.config_path().display());

    let server = GameServer::builder(source).build();
    if let Err(e) = server.launch().await {
        return abort_startup(&server, &e).await;
    }
    info!("🛑 Press Ctrl+C or type \"stop\" to shut down");

    serve(&server).await;

    server.shutdown().await;
    server.wait_for_network_closed().await;
    server.disarm_watchdog();
    info!("👋 Shutdown complete");
    ExitCode::SUCCESS
}
