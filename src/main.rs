//! Gauntlet CLI
//!
//! Dispatches harness commands against the project in the current
//! working directory.

use gauntlet::{GateCommand, Harness};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let Some(command) = args.get(1).and_then(|name| GateCommand::parse(name)) else {
        eprintln!("Usage: {} <command> [args...]", args[0]);
        eprintln!("\nCommands: {}", GateCommand::names());
        std::process::exit(1);
    };

    let root = match std::env::current_dir() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error > cannot determine project root: {}", e);
            std::process::exit(1);
        }
    };

    let harness = match Harness::new(root) {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("Error > {}", e);
            std::process::exit(1);
        }
    };

    // The interactive shell handles interrupts per command and must
    // outlive them; batch commands are interrupted at top level, where
    // the interrupt is reported, never retried, and running children
    // are left to the OS.
    let outcome = if command == GateCommand::Shell {
        harness.run(command, &args[2..]).await
    } else {
        tokio::select! {
            result = harness.run(command, &args[2..]) => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted");
                std::process::exit(130);
            }
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error > {}", e);
        std::process::exit(1);
    }
}
