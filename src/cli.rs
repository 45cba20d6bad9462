use anyhow::{Context, Result, anyhow};
use pico_args::Arguments;
use slidectl::scripted::ScriptedFsm;
use slidectl::simulate::{self, SyntheticSlider};
use slidectl::{SliderEvent, SliderSensor};
use std::{
    cell::Cell,
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::actions::{EventSink, SinkMode};
use crate::logging;
use crate::pipeline::{self, RunOptions, Source};
use crate::profile::{self, Profile, ProfileStore};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();
    logging::init(pargs.contains(["-v", "--verbose"]));

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }
    if pargs.contains(["-h", "--help"]) {
        print_help();
        return Ok(());
    }

    // Global: explicit profile file instead of the store
    let config: Option<PathBuf> = pargs.opt_value_from_str("--config")?;
    let sink_mode = if pargs.contains("--log-events") {
        SinkMode::Log
    } else {
        SinkMode::Json
    };

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("list") => {
            let store = ProfileStore::open()?;
            for name in store.list_profiles() {
                let mark = if name == store.active_name { '*' } else { ' ' };
                println!("{mark} {name}");
            }
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: slidectl use <profile_name>"))?;
            let mut store = ProfileStore::open()?;
            store.set_active(&name)?;
            println!("ok: active profile is now {}", store.active_name);
            Ok(())
        }

        Some("check") => {
            let (profile, path) = load_profile(config)?;
            let summary = check_summary(&profile, &path);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }

        Some("replay") => {
            let trace: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: slidectl replay <trace.jsonl>"))?;
            let (profile, _) = load_profile(config)?;
            let file = File::open(&trace)
                .with_context(|| format!("failed to open {}", trace.display()))?;
            let frames = crate::trace::parse_frames(BufReader::new(file))?;

            let mut sink = EventSink::stdout(sink_mode);
            let mut failed = None;
            crate::trace::replay(&profile.slider, &frames, |tick, e| {
                if failed.is_none() {
                    failed = sink.emit(tick, e).err();
                }
            })?;
            if let Some(e) = failed {
                return Err(e);
            }
            sink.flush()?;
            log::info!("replayed {} frames", frames.len());
            Ok(())
        }

        Some("simulate") => {
            let from: u32 = pargs.opt_value_from_str("--from")?.unwrap_or(0);
            let to: Option<u32> = pargs.opt_value_from_str("--to")?;
            let ticks: usize = pargs.opt_value_from_str("--ticks")?.unwrap_or(50);
            let hold: Option<u32> = pargs.opt_value_from_str("--hold")?;
            let (profile, _) = load_profile(config)?;
            let to = to.unwrap_or(profile.slider.position_range);
            let hold = hold.unwrap_or(profile.slider.filter_reset_times + 1);
            simulate_ramp(&profile, from, to, ticks, hold, sink_mode)
        }

        Some("run") => {
            let poll: Option<PathBuf> = pargs.opt_value_from_str("--poll")?;
            let interval: Option<u64> = pargs.opt_value_from_str("--interval-ms")?;
            let watch = pargs.contains("--watch");
            let (profile, profile_path) = load_profile(config)?;
            let opts = RunOptions {
                source: poll.map_or(Source::Stdin, Source::Poll),
                interval: interval.map(Duration::from_millis),
                watch,
                profile_path,
                sink_mode,
            };
            pipeline::run(profile, opts)
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// `--config PATH` if given, otherwise the store's active profile.
fn load_profile(config: Option<PathBuf>) -> Result<(Profile, PathBuf)> {
    match config {
        Some(path) => Ok((profile::load_file(&path)?, path)),
        None => {
            let store = ProfileStore::open()?;
            let path = store.active_path();
            Ok((store.profile, path))
        }
    }
}

fn check_summary(profile: &Profile, path: &Path) -> serde_json::Value {
    let s = &profile.slider;
    serde_json::json!({
        "ok": true,
        "path": path,
        "name": profile.display_name("unnamed"),
        "description": profile.meta.description,
        "channels": s.channel_ids,
        "thresholds": s.thresholds,
        "gold_values": s.gold_values,
        "position_range": s.position_range,
        "frequencies": s.fsm.frequencies,
        "interval_ms": profile.run.interval_ms,
    })
}

/// Slides a synthetic finger from `from` to `to`, then lifts it for `hold`
/// ticks, printing every event.
fn simulate_ramp(
    profile: &Profile,
    from: u32,
    to: u32,
    ticks: usize,
    hold: u32,
    mode: SinkMode,
) -> Result<()> {
    let slider = SyntheticSlider::new(&profile.slider, profile.run.synthetic_base)?;
    let mut sink = EventSink::stdout(mode);
    let tick = Cell::new(0u64);
    let mut failed = None;
    {
        let handler = |e: SliderEvent| {
            if failed.is_none() {
                failed = sink.emit(tick.get(), e).err();
            }
        };
        let mut sensor =
            SliderSensor::create(&profile.slider, ScriptedFsm::new(slider.base()), handler)?;
        let path = simulate::ramp(from, to, ticks)
            .map(Some)
            .chain((0..hold).map(|_| None));
        for (i, position) in path.enumerate() {
            tick.set(i as u64);
            slider.apply(sensor.fsm_mut(), position)?;
            sensor.handle_events()?;
        }
        sensor.delete()?;
    }
    if let Some(e) = failed {
        return Err(e);
    }
    sink.flush()
}

fn print_help() {
    println!(
        r#"slidectl - capacitive touch slider gesture engine

USAGE:
  slidectl [-v] [--config FILE] [--log-events] <command>

COMMANDS:
  slidectl help [command]              Show general or command-specific help
  slidectl list                        List profiles
  slidectl use <name>                  Switch active profile
  slidectl check                       Validate the profile and print a summary
  slidectl replay <trace.jsonl>        Run a recorded trace through the engine
  slidectl simulate [--from P] [--to P] [--ticks N] [--hold N]
                                       Slide a synthetic finger along the slider
  slidectl run [--poll FILE] [--interval-ms N] [--watch]
                                       Live loop over raw counts

TIPS:
  - Profiles: ~/.config/slidectl/profiles
  - Active profile pointer: ~/.config/slidectl/active
  - Events are printed as JSON lines; --log-events sends them to the log
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "list" => println!("usage: slidectl list\nLists available profiles; marks active with '*'."),
        "use" => println!("usage: slidectl use <name>\nSwitches the active profile to <name>."),
        "check" => println!(
            "usage: slidectl [--config FILE] check\nLoads and validates a profile, then prints it as JSON."
        ),
        "replay" => println!(
            "usage: slidectl replay <trace.jsonl>\nEach line is {{\"smoothed\":[..],\"active\":[..]}} for one tick.\nThe trace should start untouched so benchmarks can be sampled."
        ),
        "simulate" => println!(
            "usage: slidectl simulate [--from P] [--to P] [--ticks N] [--hold N]\nRamps a finger from P to P over N ticks, then releases for N ticks."
        ),
        "run" => println!(
            "usage: slidectl run [--poll FILE] [--interval-ms N] [--watch]\nReads one line of raw counts per sample set from stdin, or re-reads FILE\nevery tick with --poll. --watch recreates the slider when the profile changes.\nStops on SIGINT/SIGTERM or end of input."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}
