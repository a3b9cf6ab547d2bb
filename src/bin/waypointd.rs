//! Binary entry point: loads configuration, installs the `tracing`
//! subscriber, and runs the worker pool until interrupted.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::error;
use tracing_subscriber::EnvFilter;

use waypoint::config::ServerConfig;
use waypoint::hooks::{EchoAction, PluginRegistry};
use waypoint::server::Server;

fn load_config() -> ServerConfig {
    let path: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);
    match path {
        Some(path) => ServerConfig::from_file(&path).unwrap_or_else(|err| {
            eprintln!("failed to load {}: {err}", path.display());
            std::process::exit(1);
        }),
        None => ServerConfig::default(),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config();
    // No SIGINT/SIGTERM handling: a plain Ctrl+C kills the process outright,
    // same as the teacher's own examples. `running` exists for worker
    // threads and tests to shut a `Server` down from in-process code.
    let running = Arc::new(AtomicBool::new(true));

    let server = Server::new(config, Arc::new(EchoAction), PluginRegistry::new());
    if let Err(err) = server.run(running) {
        error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}
