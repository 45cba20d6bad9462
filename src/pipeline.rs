use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use slidectl::input::sampler_error;
use slidectl::{
    ChannelFsm, MAX_FREQUENCIES, PushSampler, RawChannelSampler, RawSample,
    SampleFeeder, SliderError, SliderEvent, SliderEventHandler, SliderSensor, SoftwareFsm,
};
use std::{
    cell::Cell,
    fs,
    io::{self, BufRead},
    path::{Path, PathBuf},
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
    },
    thread,
    time::{Duration, Instant},
};

use crate::actions::{EventSink, SinkMode};
use crate::profile::{self, Profile};

pub enum Source {
    /// One line of whitespace-separated raw counts per sample set.
    Stdin,
    /// A file re-read every tick, same format.
    Poll(PathBuf),
}

pub struct RunOptions {
    pub source: Source,
    /// Overrides the profile's `run.interval_ms`.
    pub interval: Option<Duration>,
    pub watch: bool,
    pub profile_path: PathBuf,
    pub sink_mode: SinkMode,
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Stopped,
    Reload,
}

type ChannelIds = Arc<RwLock<Vec<u32>>>;

pub fn run(profile: Profile, opts: RunOptions) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let signals = install_signal_handler(stop.clone())?;
    let watch = if opts.watch {
        Some(watch_profile(&opts.profile_path)?)
    } else {
        None
    };
    let ids: ChannelIds = Arc::new(RwLock::new(profile.slider.channel_ids.clone()));
    let mut sink = EventSink::stdout(opts.sink_mode);
    let ctl = LoopControl {
        stop: &stop,
        reload: watch.as_ref().map(|(_, rx)| rx),
    };

    let result = match &opts.source {
        Source::Stdin => {
            let (sampler, feeder) = PushSampler::new(profile.run.queue_capacity);
            spawn_stdin_reader(feeder, ids.clone(), stop.clone())?;
            drive(sampler, profile, &opts, &ids, &ctl, &mut sink)
        }
        Source::Poll(path) => {
            let sampler = FileSampler::new(path.clone());
            drive(sampler, profile, &opts, &ids, &ctl, &mut sink)
        }
    };
    signals.close();
    info!("{} events emitted", sink.emitted());
    result
}

struct LoopControl<'a> {
    stop: &'a AtomicBool,
    reload: Option<&'a Receiver<()>>,
}

/// Runs sensors over one FSM until stopped, recreating the sensor whenever
/// the profile changes.
fn drive<S: RawChannelSampler>(
    sampler: S,
    mut profile: Profile,
    opts: &RunOptions,
    ids: &ChannelIds,
    ctl: &LoopControl<'_>,
    sink: &mut EventSink,
) -> Result<()> {
    let mut fsm = SoftwareFsm::new(sampler, profile.slider.fsm.clone());
    let tick = Cell::new(0u64);
    loop {
        let interval = opts
            .interval
            .unwrap_or(Duration::from_millis(profile.run.interval_ms));
        let outcome = {
            let handler = |e: SliderEvent| {
                if let Err(err) = sink.emit(tick.get(), e) {
                    error!("event output failed: {err:#}");
                    ctl.stop.store(true, Ordering::SeqCst);
                }
            };
            let mut sensor = SliderSensor::create(&profile.slider, &mut fsm, handler)?;
            info!(
                "running profile '{}' every {interval:?}",
                profile.display_name("unnamed")
            );
            let outcome = tick_loop(&mut sensor, &tick, interval, ctl)?;
            sensor.delete()?;
            outcome
        };
        sink.flush()?;

        match outcome {
            Outcome::Stopped => return Ok(()),
            Outcome::Reload => match reload(&opts.profile_path, &mut fsm) {
                Ok(next) => {
                    if let Ok(mut ids) = ids.write() {
                        *ids = next.slider.channel_ids.clone();
                    }
                    profile = next;
                    info!("profile reloaded");
                }
                Err(e) => warn!("reload failed, keeping current profile: {e:#}"),
            },
        }
    }
}

/// Loads the changed profile and stages its FSM tunables on `fsm`.
fn reload<S: RawChannelSampler>(path: &Path, fsm: &mut SoftwareFsm<S>) -> Result<Profile> {
    let next = profile::load_file(path)?;
    fsm.set_tuning(next.slider.fsm.clone())?;
    Ok(next)
}

/// Ticks `sensor` every `interval`. A stop request still gets one last tick
/// so queued samples are not lost.
fn tick_loop<F: ChannelFsm, H: SliderEventHandler>(
    sensor: &mut SliderSensor<F, H>,
    tick: &Cell<u64>,
    interval: Duration,
    ctl: &LoopControl<'_>,
) -> Result<Outcome> {
    loop {
        if let Some(rx) = ctl.reload {
            if rx.try_recv().is_ok() {
                while rx.try_recv().is_ok() {}
                return Ok(Outcome::Reload);
            }
        }
        let started = Instant::now();
        match sensor.handle_events() {
            Ok(()) => {}
            Err(SliderError::Sampler(msg)) => warn!("sampler: {msg}"),
            Err(e) => return Err(e).context("slider tick failed"),
        }
        tick.set(tick.get() + 1);

        if ctl.stop.load(Ordering::SeqCst) {
            return Ok(Outcome::Stopped);
        }
        if let Some(rest) = interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
}

fn install_signal_handler(stop: Arc<AtomicBool>) -> Result<signal_hook::iterator::Handle> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("received signal {sig}, stopping");
                stop.store(true, Ordering::SeqCst);
            }
        })?;
    Ok(handle)
}

fn watch_profile(path: &Path) -> Result<(RecommendedWatcher, Receiver<()>)> {
    let (tx, rx) = mpsc::channel();
    let target = path.file_name().map(|n| n.to_os_string());
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(ev) if ev.kind.is_modify() || ev.kind.is_create() => {
            if ev.paths.iter().any(|p| p.file_name() == target.as_deref()) {
                let _ = tx.send(());
            }
        }
        Ok(_) => {}
        Err(e) => warn!("profile watch error: {e}"),
    })?;
    // editors often replace the file, so watch its directory
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("watching {} for changes", path.display());
    Ok((watcher, rx))
}

pub fn parse_counts(line: &str) -> std::result::Result<Vec<u32>, std::num::ParseIntError> {
    line.split_whitespace().map(str::parse).collect()
}

fn spawn_stdin_reader(feeder: SampleFeeder, ids: ChannelIds, stop: Arc<AtomicBool>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-samples".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_counts(&line) {
                    Ok(counts) if counts.is_empty() => {}
                    Ok(counts) => push_counts(&feeder, &ids, &counts),
                    Err(e) => warn!("skipping sample line {line:?}: {e}"),
                }
            }
            info!("input closed, stopping");
            stop.store(true, Ordering::SeqCst);
        })?;
    Ok(())
}

fn push_counts(feeder: &SampleFeeder, ids: &ChannelIds, counts: &[u32]) {
    let Ok(ids) = ids.read() else { return };
    if counts.len() != ids.len() {
        warn!("expected {} counts per line, got {}", ids.len(), counts.len());
        return;
    }
    for (&channel, &value) in ids.iter().zip(counts) {
        if !feeder.push(RawSample {
            channel,
            values: [value; MAX_FREQUENCIES],
        }) {
            debug!("sample for channel {channel} dropped");
        }
    }
}

/// Re-reads a file of raw counts, one per channel in profile order, on
/// every collect. Each tick sees a single snapshot of the file.
struct FileSampler {
    path: PathBuf,
}

impl FileSampler {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RawChannelSampler for FileSampler {
    fn collect(
        &mut self,
        channels: &[u32],
        sink: &mut dyn FnMut(RawSample),
    ) -> slidectl::Result<()> {
        let text = fs::read_to_string(&self.path)
            .map_err(|e| sampler_error(format!("{}: {e}", self.path.display())))?;
        let counts = parse_counts(&text).map_err(sampler_error)?;
        if counts.len() != channels.len() {
            return Err(sampler_error(format!(
                "expected {} counts in {}, got {}",
                channels.len(),
                self.path.display(),
                counts.len()
            )));
        }
        for (&channel, &value) in channels.iter().zip(&counts) {
            sink(RawSample {
                channel,
                values: [value; MAX_FREQUENCIES],
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidectl::SliderConfig;
    use slidectl::scripted::{EventLog, ScriptedFsm};

    fn ids(v: &[u32]) -> ChannelIds {
        Arc::new(RwLock::new(v.to_vec()))
    }

    #[test]
    fn counts_parse_from_whitespace() {
        assert_eq!(parse_counts(" 10 20\t30 "), Ok(vec![10, 20, 30]));
        assert!(parse_counts("10 x").is_err());
        assert_eq!(parse_counts(""), Ok(vec![]));
    }

    #[test]
    fn file_sampler_reads_one_snapshot_per_collect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts");
        fs::write(&path, "100 200 300\n").unwrap();
        let mut sampler = FileSampler::new(path.clone());

        let mut got = Vec::new();
        sampler
            .collect(&[7, 8, 9], &mut |s: RawSample| {
                got.push((s.channel, s.values[0]));
                // a writer replacing the file mid-tick must not leak in
                fs::write(&path, "1 2 3\n").unwrap();
            })
            .unwrap();
        assert_eq!(got, vec![(7, 100), (8, 200), (9, 300)]);

        got.clear();
        sampler
            .collect(&[7, 8, 9], &mut |s: RawSample| got.push((s.channel, s.values[0])))
            .unwrap();
        assert_eq!(got, vec![(7, 1), (8, 2), (9, 3)]);

        assert!(matches!(
            sampler.collect(&[7, 8], &mut |_| {}),
            Err(SliderError::Sampler(_))
        ));
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            sampler.collect(&[7, 8, 9], &mut |_| {}),
            Err(SliderError::Sampler(_))
        ));
    }

    #[test]
    fn reload_stages_only_valid_fsm_tuning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.toml");
        fs::write(&path, "[slider]\nchannel_ids = [1, 2]\nthresholds = [0.02, 0.02]\n[slider.fsm]\nfrequencies = 2\n").unwrap();
        let (sampler, _feeder) = PushSampler::new(4);
        let mut fsm = SoftwareFsm::new(sampler, Default::default());
        let next = reload(&path, &mut fsm).unwrap();
        assert_eq!(next.slider.fsm.frequencies, 2);

        fs::write(&path, "[slider]\nchannel_ids = [1, 2]\nthresholds = [0.02, 0.02]\n[slider.fsm]\nfrequencies = 9\n").unwrap();
        assert!(reload(&path, &mut fsm).is_err());
    }

    #[test]
    fn stdin_lines_become_samples() {
        let (mut sampler, feeder) = PushSampler::new(8);
        sampler.start().unwrap();
        let ids = ids(&[1, 2]);
        push_counts(&feeder, &ids, &[5, 6]);
        push_counts(&feeder, &ids, &[5]);

        let mut got = Vec::new();
        sampler.collect(&[1, 2], &mut |s| got.push(s)).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].channel, 2);
        assert_eq!(got[1].values[0], 6);
    }

    fn sensor() -> SliderSensor<ScriptedFsm, EventLog> {
        let cfg = SliderConfig::new(&[1, 2, 3], &[0.02; 3]);
        SliderSensor::create(&cfg, ScriptedFsm::new(1_000), EventLog::default()).unwrap()
    }

    #[test]
    fn stop_request_gets_one_final_tick() {
        let stop = AtomicBool::new(true);
        let ctl = LoopControl {
            stop: &stop,
            reload: None,
        };
        let tick = Cell::new(0);
        let outcome = tick_loop(&mut sensor(), &tick, Duration::ZERO, &ctl).unwrap();
        assert_eq!(outcome, Outcome::Stopped);
        assert_eq!(tick.get(), 1);
    }

    #[test]
    fn pending_reload_preempts_ticking() {
        let stop = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();
        tx.send(()).unwrap();
        tx.send(()).unwrap();
        let ctl = LoopControl {
            stop: &stop,
            reload: Some(&rx),
        };
        let tick = Cell::new(0);
        let outcome = tick_loop(&mut sensor(), &tick, Duration::ZERO, &ctl).unwrap();
        assert_eq!(outcome, Outcome::Reload);
        assert_eq!(tick.get(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sampler_errors_do_not_end_the_loop() {
        let stop = AtomicBool::new(true);
        let ctl = LoopControl {
            stop: &stop,
            reload: None,
        };
        let mut s = sensor();
        s.fsm_mut().fail_next(SliderError::Sampler("bus".into()));
        let tick = Cell::new(0);
        assert!(tick_loop(&mut s, &tick, Duration::ZERO, &ctl).is_ok());

        s.fsm_mut().fail_next(SliderError::Fsm("stuck".into()));
        assert!(tick_loop(&mut s, &tick, Duration::ZERO, &ctl).is_err());
    }
}
