//! spirit-box - Entry Point
//!
//! Bring-up agent for embedded appliances. Reads its settings, then runs the
//! unit monitor, the script scheduler, the network bootstrap, the status API
//! and the terminal dashboard until one of them asks to quit.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use spirit_box::app::options::AppOptions;
use spirit_box::app::run::run;
use spirit_box::filesys::file::File;
use spirit_box::journal::EventJournal;
use spirit_box::logs::{init_logging, LogOptions};
use spirit_box::monitor::unit::DesiredMode;
use spirit_box::storage::layout::StorageLayout;
use spirit_box::storage::settings::Settings;
use spirit_box::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(PathBuf::from(path)),
        None => StorageLayout::default().settings_file(),
    };
    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut options = AppOptions::from_settings(&settings);
    if cli_args.contains_key("no-dashboard") {
        options.enable_dashboard = false;
    }
    if cli_args.contains_key("no-bootstrap") {
        options.enable_bootstrap = false;
    }
    if let Some(units) = cli_args.get("unit") {
        for name in units.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            options.watch(name, DesiredMode::Normal);
        }
    }

    // Initialize logging
    let journal = EventJournal::default();
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        stdout: !options.enable_dashboard,
        log_dir: options.storage.logs_dir().path().to_path_buf(),
        json_format: settings.json_logs,
    };
    let _log_guard = match init_logging(log_options, journal.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    info!("Running spirit-box {} with options: {:?}", version.version, options);
    match run(options, journal, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("spirit-box failed: {e}");
            eprintln!("spirit-box failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
