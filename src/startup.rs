// Startup module - displays banner and server status
//
// Shown once before the server starts accepting pings, so the operator can
// confirm delay and auth at a glance on race morning.

use crate::config::{Config, VERSION};
use crate::race::RacePhase;
use chrono::Utc;

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// One line of the status block
pub struct StatusLine {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

/// Print the startup banner and status block
pub fn print_startup(config: &Config) {
    use colors::*;

    // Banner
    println!();
    println!("  {BOLD}{CYAN}racetrack{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}{}{RESET}", config.race.name);
    println!();

    // Config file status
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    for line in status_lines(config) {
        print_status_line(&line);
    }
    println!();

    println!(
        "  {MAGENTA}▸{RESET} Listening on {BOLD}{}{RESET}",
        config.bind_addr
    );
    if config.broadcast.delay_minutes == 0 {
        println!("  {YELLOW}▸{RESET} {YELLOW}Broadcasting live{RESET} {DIM}(no delay){RESET}");
    }
    println!();
}

/// Status of the pieces an operator cares about
fn status_lines(config: &Config) -> Vec<StatusLine> {
    let phase = match RacePhase::at(config.race.start, Utc::now()) {
        RacePhase::InTraining => "in training",
        RacePhase::RaceDay => "race day",
        RacePhase::Finished => "finished",
    };

    vec![
        StatusLine {
            name: "store",
            ok: true,
            detail: config.db_path.display().to_string(),
        },
        StatusLine {
            name: "auth",
            ok: config.ping_secret.is_some(),
            detail: if config.ping_secret.is_some() {
                "bearer secret set".to_string()
            } else {
                "RACE_PING_SECRET unset, pings rejected".to_string()
            },
        },
        StatusLine {
            name: "delay",
            ok: true,
            detail: format!("{} min", config.broadcast.delay_minutes),
        },
        StatusLine {
            name: "poll",
            ok: true,
            detail: format!("every {}s", config.broadcast.poll_interval().as_secs()),
        },
        StatusLine {
            name: "race",
            ok: true,
            detail: format!(
                "{} km, {} checkpoints, {}",
                config.race.distance_km,
                config.race.checkpoints.len(),
                phase
            ),
        },
    ]
}

fn print_status_line(line: &StatusLine) {
    use colors::*;

    let (icon, style) = if line.ok {
        (format!("{GREEN}✓{RESET}"), "")
    } else {
        (format!("{YELLOW}!{RESET}"), YELLOW)
    };

    println!(
        "    {icon} {style}{:<8}{RESET} {DIM}{}{RESET}",
        line.name, line.detail
    );
}
