//! `fllnav-cli` – operator console for autonomous navigation.
//!
//! This binary:
//!
//! 1. Loads `~/.fllnav/config.toml`, running a **First-Run Wizard** that
//!    writes the defaults when the file is absent.
//! 2. Builds a simulated robot from the configured start pose and sensors
//!    and hands it to a [`Runner`].
//! 3. Drops the operator into an **interactive REPL** that accepts JSON
//!    command messages and slash-commands.
//! 4. Wires **Ctrl-C** to the runner's cancel flag: a running operation is
//!    aborted (drive stopped), and at the prompt the CLI exits.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use fllnav_hal::sim::SimRobot;
use fllnav_runtime::{Runner, init_tracing};
use fllnav_types::Pose;

fn main() {
    let _guard = init_tracing("fllnav");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Robot ─────────────────────────────────────────────────────────────
    let start = Pose::from(cfg.start);
    let mut builder = SimRobot::builder()
        .at(start)
        .with_sensor_offset(cfg.nav.localization.sensor_offset);
    if cfg.sensors.heading_sensor {
        builder = builder.with_heading_sensor();
    }
    if cfg.sensors.landmark_sensor {
        builder = builder.with_landmark_sensor(cfg.nav.field.landmark_map());
    }
    if cfg.sensors.distance_sensor {
        builder = builder.with_distance_sensor(cfg.nav.field.bounds());
    }
    let (hardware, _sim) = builder.build();

    let mut runner = match Runner::new(cfg.nav.clone(), hardware, start) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("{} {}", "Failed to start runner:".red().bold(), e);
            std::process::exit(1);
        }
    };
    runner.set_status_sink(|status| {
        println!(
            "  {}",
            format!(
                "· ({:.0}, {:.0}, {:.0}°) confidence {:.2}",
                status.position.x, status.position.y, status.position.heading, status.confidence
            )
            .dimmed()
        );
    });

    println!(
        "  Simulated robot at ({}, {}, {}°) – heading sensor {}, landmark sensor {}, distance sensor {}",
        start.x,
        start.y,
        start.heading,
        on_off(cfg.sensors.heading_sensor),
        on_off(cfg.sensors.landmark_sensor),
        on_off(cfg.sensors.distance_sensor)
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let busy = Arc::new(AtomicBool::new(false));
    let cancel = runner.cancel_handle();
    {
        let shutdown = shutdown.clone();
        let busy = busy.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            if busy.load(Ordering::SeqCst) {
                println!("{}", "⚠  Ctrl-C received – cancelling the active operation …".yellow().bold());
                cancel.store(true, Ordering::SeqCst);
            } else {
                println!("{}", "⚠  Ctrl-C received – press Enter to exit.".yellow().bold());
                shutdown.store(true, Ordering::SeqCst);
            }
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler; operations cannot be cancelled");
        }
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&mut runner, shutdown, busy);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       fllnav First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the robot.\n");

    let mut cfg = config::Config::default();

    cfg.start.x = prompt_f64("  Start X (mm)", cfg.start.x);
    cfg.start.y = prompt_f64("  Start Y (mm)", cfg.start.y);
    cfg.start.heading = prompt_f64("  Start heading (deg)", cfg.start.heading);

    let answer = prompt_line("  Attach a heading sensor? [Y/n]: ", "y");
    cfg.sensors.heading_sensor = !answer.eq_ignore_ascii_case("n");
    let answer = prompt_line("  Attach a landmark (colour) sensor? [Y/n]: ", "y");
    cfg.sensors.landmark_sensor = !answer.eq_ignore_ascii_case("n");
    let answer = prompt_line("  Attach a distance (ultrasonic) sensor? [Y/n]: ", "y");
    cfg.sensors.distance_sensor = !answer.eq_ignore_ascii_case("n");

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ______ __    __                "#.bold().cyan());
    println!("{}", r#"   / __/ // /   / /  ___  ___ __ __"#.bold().cyan());
    println!("{}", r#"  / _// // /__ / /__/ _ \/ _ `/ |/ /"#.bold().cyan());
    println!("{}", r#" /_/ /_//____//____/_//_/\_,_/|___/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "fllnav".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Autonomous field navigation");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn on_off(enabled: bool) -> colored::ColoredString {
    if enabled { "on".green() } else { "off".yellow() }
}

fn prompt_f64(label: &str, default: f64) -> f64 {
    let raw = prompt_line(&format!("{label} [{default}]: "), &default.to_string());
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            println!("  {} '{}' is not a number, keeping {}", "Warning:".yellow(), raw, default);
            default
        }
    }
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
