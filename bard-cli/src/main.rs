mod sim;

use std::fs::File;
use std::path::PathBuf;

use bard_core::midi::MidiInputService;

const USAGE: &str = "\
usage: bard [--verbose] <command>

commands:
  --list-devices                 list MIDI input devices
  --play <melody.json> [--listeners N] [--loop] [--seconds S]
                                 play a melody in a simulated world
  --live [--device N] [--seconds S]
                                 perform live from a MIDI device";

fn init_logging(verbose: bool) -> std::io::Result<()> {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bard")
        .join("bard.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path)
        .or_else(|_| File::create(std::env::temp_dir().join("bard.log")))?;

    WriteLogger::init(log_level, Config::default(), log_file)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    log::info!("bard starting (log level: {:?})", log_level);
    Ok(())
}

fn flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose)?;

    let seconds: Option<u64> = flag_value(&args, "--seconds");

    if args.iter().any(|a| a == "--list-devices") {
        return list_devices();
    }

    if let Some(path) = flag_value::<PathBuf>(&args, "--play") {
        let options = sim::PlaybackOptions {
            listeners: flag_value(&args, "--listeners").unwrap_or(2).max(1),
            looping: args.iter().any(|a| a == "--loop"),
            seconds,
        };
        return sim::run_playback(&path, options);
    }

    if args.iter().any(|a| a == "--live") {
        return sim::run_live(flag_value(&args, "--device"), seconds.unwrap_or(60));
    }

    eprintln!("{}", USAGE);
    std::process::exit(2);
}

fn list_devices() -> std::io::Result<()> {
    match MidiInputService::enumerate_devices() {
        Ok(devices) if devices.is_empty() => println!("no MIDI input devices"),
        Ok(devices) => {
            for device in devices {
                println!("{:>3}  {}", device.index, device.name);
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
