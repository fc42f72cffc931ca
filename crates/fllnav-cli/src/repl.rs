//! REPL – operator console for the navigation runner.
//!
//! A line starting with `{` is a JSON command message, e.g.
//! `{"action":"navigate","x":600,"y":300}`.  Other input is a slash-command:
//!   /help                 – show this list
//!   /status               – current pose estimate, confidence and mode
//!   /goto X Y [HEADING]   – navigate with path planning
//!   /reset X Y [HEADING]  – reset the position estimate
//!   /calibrate [COLOUR]   – calibrate on the landmark under the sensor
//!   /obstacles            – list the planner obstacles
//!   /schema               – print the JSON schema of command messages
//!   /stop                 – stop the drive base
//!   /quit | /exit         – exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fllnav_runtime::Runner;
use fllnav_types::{Command, CommandReply, LandmarkReading, NavOutcome};

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Empty,
    /// A command message for the runner.
    Command(Command),
    Help,
    Status,
    Obstacles,
    Schema,
    Quit,
}

/// Parse one console line.
pub fn parse_line(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    if line.starts_with('{') {
        return Command::from_json(line).map(Input::Command).map_err(|e| e.to_string());
    }

    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();
    match head {
        "/help" => Ok(Input::Help),
        "/status" => Ok(Input::Status),
        "/obstacles" => Ok(Input::Obstacles),
        "/schema" => Ok(Input::Schema),
        "/quit" | "/exit" => Ok(Input::Quit),
        "/stop" => Ok(Input::Command(Command::Stop)),
        "/goto" => {
            let (x, y, heading) = parse_pose_args(&args)?;
            Ok(Input::Command(Command::Navigate {
                x,
                y,
                heading,
                use_path_planning: true,
            }))
        }
        "/reset" => {
            let (x, y, heading) = parse_pose_args(&args)?;
            Ok(Input::Command(Command::ResetPosition {
                x,
                y,
                heading: heading.unwrap_or(0.0),
            }))
        }
        "/calibrate" => {
            let expected_landmark = match args.first() {
                Some(word) => serde_json::from_value::<LandmarkReading>(serde_json::Value::String(word.to_lowercase()))
                    .map_err(|_| format!("unknown landmark colour '{word}'"))?,
                None => LandmarkReading::Black,
            };
            Ok(Input::Command(Command::Calibrate { expected_landmark }))
        }
        other => Err(format!("unknown command '{other}'")),
    }
}

fn parse_pose_args(args: &[&str]) -> Result<(f64, f64, Option<f64>), String> {
    if !(2..=3).contains(&args.len()) {
        return Err("expected X Y [HEADING]".to_string());
    }
    let number = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("'{s}' is not a number"))
    };
    let heading = args.get(2).copied().map(number).transpose()?;
    Ok((number(args[0])?, number(args[1])?, heading))
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits.  `busy` is
/// raised while a command runs so that Ctrl-C cancels it instead of exiting.
pub fn run(runner: &mut Runner, shutdown: Arc<AtomicBool>, busy: Arc<AtomicBool>) {
    let cancel = runner.cancel_handle();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "fllnav>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match parse_line(&line) {
            Ok(Input::Empty) => {}
            Ok(Input::Help) => cmd_help(),
            Ok(Input::Status) => cmd_status(runner),
            Ok(Input::Obstacles) => cmd_obstacles(runner),
            Ok(Input::Schema) => cmd_schema(),
            Ok(Input::Quit) => {
                runner.stop();
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(Input::Command(command)) => {
                // A stale cancel from a previous command must not abort this one.
                cancel.store(false, Ordering::SeqCst);
                busy.store(true, Ordering::SeqCst);
                let result = runner.handle(command);
                busy.store(false, Ordering::SeqCst);
                match result {
                    Ok(reply) => print_reply(&reply),
                    Err(e) => println!("{} {}", "Error:".red().bold(), e),
                }
            }
            Err(e) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Invalid input:".red(),
                    e.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "fllnav Commands".bold().underline());
    println!("  {}              – JSON command message", "{\"action\":…}".bold().cyan());
    println!("  {}                 – pose estimate and mode", "/status".bold().cyan());
    println!("  {}     – navigate with path planning", "/goto X Y [H]".bold().cyan());
    println!("  {}    – reset the position estimate", "/reset X Y [H]".bold().cyan());
    println!("  {}   – calibrate on a landmark", "/calibrate [COL]".bold().cyan());
    println!("  {}              – list planner obstacles", "/obstacles".bold().cyan());
    println!("  {}                 – command message JSON schema", "/schema".bold().cyan());
    println!("  {}                   – stop the drive base", "/stop".bold().cyan());
    println!("  {}            – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(runner: &Runner) {
    let status = runner.status();
    let pose = status.position;
    println!("{}", "Status".bold().underline());
    println!(
        "  Pose       : x={} y={} heading={}°",
        format!("{:.1}", pose.x).yellow(),
        format!("{:.1}", pose.y).yellow(),
        format!("{:.1}", pose.heading).yellow()
    );
    println!("  Confidence : {}", format!("{:.2}", status.confidence).yellow());
    println!("  Mode       : {}", format!("{:?}", status.mode).to_lowercase().bold());
    if let Some(outcome) = &runner.state().last_outcome {
        println!("  Last result: {}", outcome_label(outcome));
    }
    let stats = runner.planner().stats();
    println!(
        "  Planner    : {} search(es), {} node(s) expanded last",
        stats.searches, stats.last_expanded
    );
}

fn cmd_obstacles(runner: &Runner) {
    let obstacles = runner.planner().obstacles();
    println!("{}", "Obstacles".bold().underline());
    if obstacles.is_empty() {
        println!("  {}", "none".dimmed());
        return;
    }
    for (i, o) in obstacles.iter().enumerate() {
        println!(
            "  [{}] x={} y={} {}×{}",
            i.to_string().bold(),
            o.x,
            o.y,
            o.width,
            o.height
        );
    }
}

fn cmd_schema() {
    let schema = schemars::schema_for!(Command);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{json}"),
        Err(e) => println!("{}: {}", "Schema error".red(), e),
    }
}

fn outcome_label(outcome: &NavOutcome) -> String {
    match outcome {
        NavOutcome::Completed => "completed".green().to_string(),
        NavOutcome::Aborted => "aborted".yellow().to_string(),
        NavOutcome::Failed { reason } => format!("{} ({})", "failed".red(), reason),
    }
}

fn print_reply(reply: &CommandReply) {
    match reply {
        CommandReply::Navigation { outcome } => println!("  Navigation {}", outcome_label(outcome)),
        CommandReply::Calibrated { matched: true } => println!("  {} Calibrated", "✓".green().bold()),
        CommandReply::Calibrated { matched: false } => {
            println!("  {}", "Expected landmark not under the sensor".yellow())
        }
        CommandReply::PositionReset { position } => println!(
            "  {} Position reset to ({:.1}, {:.1}, {:.1}°)",
            "✓".green().bold(),
            position.x,
            position.y,
            position.heading
        ),
        CommandReply::ObstacleAdded { index } => println!("  {} Obstacle #{} added", "✓".green().bold(), index),
        CommandReply::ObstacleRemoved { remaining } => {
            println!("  {} Obstacle removed, {} left", "✓".green().bold(), remaining)
        }
        CommandReply::ObstaclesCleared => println!("  {} Obstacles cleared", "✓".green().bold()),
        CommandReply::Stopped => println!("  {}", "Stopped".yellow()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_line("   \n"), Ok(Input::Empty));
    }

    #[test]
    fn json_lines_become_commands() {
        let input = parse_line(r#"{"action":"clearObstacles"}"#).unwrap();
        assert_eq!(input, Input::Command(Command::ClearObstacles));
        assert!(parse_line(r#"{"action":"fly"}"#).is_err());
    }

    #[test]
    fn goto_parses_optional_heading() {
        assert_eq!(
            parse_line("/goto 600 300").unwrap(),
            Input::Command(Command::Navigate {
                x: 600.0,
                y: 300.0,
                heading: None,
                use_path_planning: true,
            })
        );
        assert_eq!(
            parse_line("/goto 600 300 90").unwrap(),
            Input::Command(Command::Navigate {
                x: 600.0,
                y: 300.0,
                heading: Some(90.0),
                use_path_planning: true,
            })
        );
        assert!(parse_line("/goto 600").is_err());
        assert!(parse_line("/goto 600 north").is_err());
        assert!(parse_line("/goto 600 NaN").is_err());
    }

    #[test]
    fn reset_defaults_heading_to_zero() {
        assert_eq!(
            parse_line("/reset 100 200").unwrap(),
            Input::Command(Command::ResetPosition {
                x: 100.0,
                y: 200.0,
                heading: 0.0,
            })
        );
    }

    #[test]
    fn calibrate_accepts_colour_names() {
        assert_eq!(
            parse_line("/calibrate").unwrap(),
            Input::Command(Command::Calibrate {
                expected_landmark: LandmarkReading::Black
            })
        );
        assert_eq!(
            parse_line("/calibrate Blue").unwrap(),
            Input::Command(Command::Calibrate {
                expected_landmark: LandmarkReading::Blue
            })
        );
        assert!(parse_line("/calibrate purple").is_err());
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_line("/help").unwrap(), Input::Help);
        assert_eq!(parse_line("/exit").unwrap(), Input::Quit);
        assert_eq!(parse_line("/stop").unwrap(), Input::Command(Command::Stop));
        assert!(parse_line("/dance").is_err());
    }
}
