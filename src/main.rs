mod app;
mod classifier;
mod config;
mod cycle;
mod dbus;
mod models;
mod prompt;
mod scan;
mod store;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use eframe::egui;

use app::WifiIdentifierApp;
use config::Config;
use cycle::ScanCycle;
use dbus::IwdDbus;
use scan::ScanWorker;
use store::Store;

fn main() -> ExitCode {
    let config = Config::parse();
    setup_tracing(config.verbose);

    let store = match Store::open(config.data_dir()) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, "failed to load network store");
            eprintln!("failed to load network store: {err}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        dir = %store.dir().display(),
        known = store.known().len(),
        ignored_ssids = store.ignored().ssids.len(),
        ignored_bssids = store.ignored().bssids.len(),
        "network store loaded"
    );

    let source = match IwdDbus::new() {
        Ok(source) => source,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to iwd");
            eprintln!("failed to connect to iwd D-Bus: {err}");
            return ExitCode::FAILURE;
        }
    };

    let worker = ScanWorker::new(Arc::new(source), config.interface.clone(), config.timings());
    let mut cycle = ScanCycle::new(config.refresh_interval());
    if config.auto_refresh {
        cycle.set_auto_refresh(true, std::time::Instant::now());
    }
    let app = WifiIdentifierApp::new(store, worker, cycle);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Smart WiFi Identifier")
            .with_inner_size([460.0, 580.0]),
        ..Default::default()
    };
    let run = eframe::run_native(
        "wifi-identifier",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Ok(Box::new(app))
        }),
    );

    if let Err(err) = run {
        tracing::error!(error = %err, "GUI exited with an error");
        eprintln!("failed to start GUI: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("wifi_identifier=debug,info")
        } else {
            EnvFilter::new("wifi_identifier=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
