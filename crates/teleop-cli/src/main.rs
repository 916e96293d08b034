//! `teleop` – interactive proxy for teleoperation input devices.
//!
//! This binary:
//!
//! 1. Loads `~/.teleop/config.toml`, writing the defaults on first run.
//! 2. Starts one [`ProxyDevice`] per configured arm on an in-process bus.
//! 3. Publishes the status heartbeat for every arm in the background.
//! 4. Drops the user into an interactive shell that stands in for the device
//!    driver.
//! 5. Intercepts **Ctrl-C** to publish a zero twist on every arm and exit.

mod config;
mod shell;
mod telemetry;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use teleop_middleware::EventBus;
use teleop_proxy::ProxyDevice;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::shell::{Shell, SharedProxies};

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("teleop");

    print_banner();

    let cfg = load_or_create_config();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };
    let _enter = runtime.enter();

    let bus = EventBus::new(cfg.bus_capacity).unwrap_or_else(|e| {
        warn!(error = %e, "invalid bus capacity, using default");
        EventBus::default()
    });

    let mut started = Vec::new();
    for arm in &cfg.arms {
        match ProxyDevice::new(arm, Arc::new(bus.clone())) {
            Ok(proxy) => started.push(Arc::new(proxy.with_gripper_mapping(cfg.gripper_mapping()))),
            Err(e) => error!(arm = %arm, error = %e, "failed to start proxy"),
        }
    }
    let proxies: SharedProxies = Arc::new(Mutex::new(started));

    // ── Status heartbeat ──────────────────────────────────────────────────
    if let Some(period) = cfg.status_period() {
        runtime.spawn(heartbeat(Arc::clone(&proxies), period));
        info!(period_ms = period.as_millis() as u64, "status heartbeat running");
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    let proxies_for_ctrlc = Arc::clone(&proxies);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping device motion …".yellow().bold());
        for proxy in shell::lock(&proxies_for_ctrlc).iter() {
            if let Err(e) = proxy.set_twist(0.0, 0.0, 0.0, 0.0, 0.0, 0.0) {
                warn!(arm = %proxy.arm(), error = %e, "failed to publish zero twist");
            }
        }
        println!("{}", "  ✓ Zero twist published. Press Enter to exit.".green());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let mut shell = match Shell::new(runtime.handle().clone(), bus, proxies, cfg, shutdown) {
        Ok(shell) => shell,
        Err(e) => {
            println!("{}: {}", "Startup error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
    shell.run();
    ExitCode::SUCCESS
}

async fn heartbeat(proxies: SharedProxies, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let snapshot: Vec<Arc<ProxyDevice>> = shell::lock(&proxies).clone();
        for proxy in snapshot {
            if let Err(e) = proxy.publish_status() {
                warn!(arm = %proxy.arm(), error = %e, "status publish failed");
            }
        }
    }
}

fn load_or_create_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn print_banner() {
    println!();
    println!("  {} {}", "teleop".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Teleoperation device proxy");
    println!();
}
