//! # Control UI
//!
//! Runs as its own process alongside the Session Engine, sharing
//! nothing but the 11-cell control vector mapped over `/dev/shm`
//! (spec §4.6). The engine never calls into this process and this
//! process never calls into the engine; every interaction is a read or
//! write of one indexed cell.

use clap::Parser;
use mesoscope_shm::control_vector::{
    ControlVector, IDX_CLOSE_VALVE, IDX_DURATION_MODIFIER, IDX_EXIT_SIGNAL, IDX_GUIDANCE_ENABLED,
    IDX_OPEN_VALVE, IDX_PAUSE_STATE, IDX_REWARD_SIGNAL, IDX_REWARD_VOLUME, IDX_SHOW_REWARD,
    IDX_SPEED_MODIFIER, IDX_TERMINATION,
};
use std::io::Write as _;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mesoscope_ui")]
#[command(author = "Sun Lab")]
#[command(version)]
#[command(about = "Terminal control surface for a running Mesoscope-VR session")]
struct Args {
    /// Path to the session's `control_vector.shm` segment, created by
    /// the engine under `<raw_data>/control_vector.shm`.
    #[arg(short, long)]
    control_vector: String,
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let args = Args::parse();

    // The engine creates the segment during startup (§4.8 step 9, after
    // `ControlVector::create`); this process may be spawned slightly
    // before that happens, so retry rather than fail outright.
    let mut attempts = 0;
    let control = loop {
        match ControlVector::attach(&args.control_vector) {
            Ok(cv) => break cv,
            Err(e) if attempts < 50 => {
                attempts += 1;
                if attempts == 1 {
                    info!("waiting for control vector at {}: {e}", args.control_vector);
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            Err(e) => {
                error!("failed to attach to control vector at {}: {e}", args.control_vector);
                std::process::exit(1);
            }
        }
    };

    info!("Control UI attached to {}", args.control_vector);
    print_help();

    let mut line = String::new();
    loop {
        if control.get(IDX_TERMINATION).unwrap_or(1) != 0 {
            info!("engine signaled termination; exiting");
            break;
        }

        print!("mesoscope> ");
        let _ = std::io::stdout().flush();
        line.clear();
        if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            // stdin closed (e.g. non-interactive launch); idle instead
            // of busy-looping until the engine tears the segment down.
            std::thread::sleep(std::time::Duration::from_millis(200));
            continue;
        }

        if let Err(e) = dispatch(line.trim(), &control) {
            error!("{e}");
        }
    }
}

fn dispatch(command: &str, control: &ControlVector) -> Result<(), mesoscope_shm::ShmError> {
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or("") {
        "" => Ok(()),
        "help" | "h" => {
            print_help();
            Ok(())
        }
        "status" => {
            println!(
                "paused={} guidance={} show_reward={}",
                control.get(IDX_PAUSE_STATE)?,
                control.get(IDX_GUIDANCE_ENABLED)?,
                control.get(IDX_SHOW_REWARD)?,
            );
            Ok(())
        }
        "pause" => control.set(IDX_PAUSE_STATE, 1),
        "resume" => control.set(IDX_PAUSE_STATE, 0),
        "guidance" => match parts.next() {
            Some("on") => control.set(IDX_GUIDANCE_ENABLED, 1),
            Some("off") => control.set(IDX_GUIDANCE_ENABLED, 0),
            _ => {
                println!("usage: guidance <on|off>");
                Ok(())
            }
        },
        "show-reward" => match parts.next() {
            Some("on") => control.set(IDX_SHOW_REWARD, 1),
            Some("off") => control.set(IDX_SHOW_REWARD, 0),
            _ => {
                println!("usage: show-reward <on|off>");
                Ok(())
            }
        },
        "speed" => match parts.next().and_then(|v| v.parse::<i64>().ok()) {
            Some(v) => control.set(IDX_SPEED_MODIFIER, v),
            None => {
                println!("usage: speed <integer, x0.01 cm/s>");
                Ok(())
            }
        },
        "duration" => match parts.next().and_then(|v| v.parse::<i64>().ok()) {
            Some(v) => control.set(IDX_DURATION_MODIFIER, v),
            None => {
                println!("usage: duration <integer, x10 ms>");
                Ok(())
            }
        },
        "reward" => match parts.next().and_then(|v| v.parse::<i64>().ok()) {
            Some(volume_ul) => {
                control.set(IDX_REWARD_VOLUME, volume_ul)?;
                control.set(IDX_REWARD_SIGNAL, 1)
            }
            None => {
                println!("usage: reward <volume_ul>");
                Ok(())
            }
        },
        "valve" => match parts.next() {
            Some("open") => control.set(IDX_OPEN_VALVE, 1),
            Some("close") => control.set(IDX_CLOSE_VALVE, 1),
            _ => {
                println!("usage: valve <open|close>");
                Ok(())
            }
        },
        "exit" | "quit" => control.set(IDX_EXIT_SIGNAL, 1),
        other => {
            println!("unrecognized command: {other} (try 'help')");
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        "commands: status | pause | resume | guidance <on|off> | show-reward <on|off> \
         | speed <delta> | duration <delta> | reward <volume_ul> | valve <open|close> | exit"
    );
}
