use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use beat_sync_core::{
    BeatSender, EngineConfig, PlaybackSource, RhythmEngine, RhythmEvent, TimeSignature, WallClock,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Timing errors the simulated player cycles through, in seconds.
const PLAYER_JITTER: [f64; 7] = [0.0, 0.012, -0.03, 0.07, -0.11, 0.2, 0.004];

fn main() -> beat_sync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulation(&args),
        Commands::Config { config } => run_config(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> beat_sync_core::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn run_config(path: Option<&Path>) -> beat_sync_core::Result<()> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Tempo plan for the simulated track.
#[derive(Debug, Clone, Copy)]
struct TrackPlan {
    bpm: f64,
    bars: i64,
    time_signature: TimeSignature,
    tempo_change: Option<(i64, f64)>,
}

impl TrackPlan {
    fn tempo_at_bar(&self, bar: i64) -> f64 {
        match self.tempo_change {
            Some((from_bar, bpm)) if bar >= from_bar => bpm,
            _ => self.bpm,
        }
    }

    /// `(bar, beat_in_bar, tempo, track_time)` for every beat, bars 1-based.
    fn beats(&self) -> Vec<(i64, u32, f64, f64)> {
        let mut time = 0.0;
        let mut beats = Vec::new();
        for bar in 1..=self.bars {
            let tempo = self.tempo_at_bar(bar);
            for beat in 1..=self.time_signature.upper {
                beats.push((bar, beat, tempo, time));
                time += 60.0 / tempo;
            }
        }
        beats
    }

    fn duration(&self) -> f64 {
        (1..=self.bars)
            .map(|bar| f64::from(self.time_signature.upper) * 60.0 / self.tempo_at_bar(bar))
            .sum()
    }
}

/// Playback position derived from the shared wall clock.
struct SimulatedTrack {
    clock: WallClock,
    started_at: f64,
    duration: f64,
}

impl PlaybackSource for SimulatedTrack {
    fn playback_position_seconds(&self) -> f64 {
        (self.clock.now() - self.started_at).clamp(0.0, self.duration)
    }

    fn track_duration_seconds(&self) -> f64 {
        self.duration
    }
}

fn spawn_audio_thread(
    plan: TrackPlan,
    clock: WallClock,
    started_at: f64,
    sender: BeatSender,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("simulated-audio".to_string())
        .spawn(move || {
            let sig = plan.time_signature;
            for (bar, beat, tempo, at) in plan.beats() {
                let wait = started_at + at - clock.now();
                if wait > 0.0 {
                    thread::sleep(Duration::from_secs_f64(wait));
                }
                sender.on_beat_marker(bar, beat, tempo, sig.upper, sig.lower);
            }
        })
}

fn run_simulation(args: &SimulateArgs) -> beat_sync_core::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let plan = TrackPlan {
        bpm: args.bpm,
        bars: args.bars,
        time_signature: args.time_signature,
        tempo_change: args.tempo_change_bar.zip(args.tempo_change_bpm),
    };
    if !(plan.bpm > 0.0) || plan.tempo_change.is_some_and(|(_, bpm)| !(bpm > 0.0)) {
        return Err("tempo must be positive".into());
    }
    tracing::info!(?plan, "starting simulation");

    let clock = WallClock::start();
    let started_at = clock.now();
    let track = SimulatedTrack {
        clock,
        started_at,
        duration: plan.duration(),
    };
    let (mut engine, sender) = RhythmEngine::with_queue(config, track, clock)?;
    let audio = spawn_audio_thread(plan, clock, started_at, sender)?;

    engine.schedule_after_beats(8, |beat| {
        tracing::info!(beat, "scheduled action fired");
        Ok(())
    });

    let frame = Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1)));
    let end = plan.duration() + 0.5;
    let mut pending_hits: VecDeque<f64> = VecDeque::new();
    let mut attempts = 0usize;

    loop {
        let now = clock.now();
        engine.tick(now);

        let track_time = engine.track_time_at(now).unwrap_or(0.0);
        while let Some(at) = pending_hits.front().copied().filter(|at| track_time >= *at) {
            pending_hits.pop_front();
            if let Err(err) = engine.hit_at_track_time(at, now) {
                tracing::info!(%err, "hit not judged");
            }
            attempts += 1;
        }

        for event in engine.drain_events() {
            if let RhythmEvent::BeatAdvanced {
                global_beat_index, ..
            } = event
            {
                let jitter = PLAYER_JITTER[(attempts + pending_hits.len()) % PLAYER_JITTER.len()];
                if let Some(time) = engine.predicted_time(global_beat_index + 1) {
                    pending_hits.push_back(time + jitter);
                }
            }
            report_event(&event, args.json)?;
        }

        if now - started_at > end {
            break;
        }
        thread::sleep(frame);
    }

    if audio.join().is_err() {
        tracing::error!("simulated audio thread panicked");
    }

    let counts = engine.judgment_counts();
    let stats = engine.stats();
    if args.json {
        let summary = serde_json::json!({
            "summary": {
                "stats": stats,
                "judgments": counts,
                "best_combo": engine.combo().best(),
            }
        });
        println!("{summary}");
    } else {
        tracing::info!(?stats, ?counts, best_combo = engine.combo().best(), "simulation finished");
    }
    Ok(())
}

fn report_event(event: &RhythmEvent, json: bool) -> beat_sync_core::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        RhythmEvent::BeatAdvanced {
            global_beat_index,
            bar,
            beat_in_bar,
            tempo_bpm,
        } => tracing::info!(global_beat_index, bar, beat_in_bar, tempo_bpm, "beat"),
        RhythmEvent::Judged(record) => tracing::info!(
            beat = record.beat_index,
            delta_ms = record.delta * 1000.0,
            outcome = ?record.outcome,
            "judged"
        ),
        RhythmEvent::ComboChanged { count } => tracing::info!(count, "combo"),
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn parse_time_signature(text: &str) -> Result<TimeSignature, String> {
    let (upper, lower) = text
        .split_once('/')
        .ok_or_else(|| format!("expected UPPER/LOWER, got `{text}`"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid time signature `{text}`: {err}"))
    };
    let sig = TimeSignature::new(parse(upper)?, parse(lower)?);
    if sig.is_valid() {
        Ok(sig)
    } else {
        Err(format!("time signature `{text}` must not contain zero"))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat sync engine driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine against a simulated audio engine and player.
    Simulate(SimulateArgs),
    /// Validate and print the effective configuration.
    Config {
        /// JSON configuration file; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,
    /// Number of bars in the simulated track.
    #[arg(long, default_value_t = 8)]
    bars: i64,
    #[arg(long, default_value = "4/4", value_parser = parse_time_signature)]
    time_signature: TimeSignature,
    /// Simulation ticks per second.
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Bar at which the tempo switches to `--tempo-change-bpm`.
    #[arg(long, requires = "tempo_change_bpm")]
    tempo_change_bar: Option<i64>,
    #[arg(long, requires = "tempo_change_bar")]
    tempo_change_bpm: Option<f64>,
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print events as JSON lines instead of log output.
    #[arg(long)]
    json: bool,
}
