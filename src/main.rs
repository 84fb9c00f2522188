use bass_trainer::audio::AudioDeviceManager;
use bass_trainer::pitch::offline::{Recording, analyze_recording};
use bass_trainer::{DetectionParameters, Exercise, Trainer, TrainerConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_CONFIG_PATH: &str = "bass_trainer.ron";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "bass_trainer", version, about = "Bass guitar pitch and timing trainer")]
struct Cli {
    /// Trainer configuration (RON); missing file means defaults
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Detection parameters (JSON), overriding the ones in the configuration
    #[arg(long, global = true)]
    params: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the detected note, string and cents offset
    Tune {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
        /// Write the detection history as JSON on exit
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Free-running click track
    Metronome {
        #[arg(long, default_value_t = 100.0)]
        bpm: f64,
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Play an exercise file and judge every note
    Play {
        exercise: PathBuf,
        /// Override the tempo stored in the exercise
        #[arg(long)]
        bpm: Option<f64>,
        /// Hit line position, 0-100
        #[arg(long)]
        hit_line: Option<f64>,
        /// Keep clicking after the count-off
        #[arg(long)]
        metronome: bool,
    },
    /// Run the pitch engine over a WAV file
    Analyze {
        file: PathBuf,
        /// Also print silent and suppressed ticks
        #[arg(long)]
        all: bool,
    },
    /// List audio devices
    Devices,
    /// Print the effective detection parameters as JSON
    Params {
        /// Print the defaults instead
        #[arg(long)]
        defaults: bool,
    },
    /// Write the effective configuration back to the config file
    SaveConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli.config, cli.params.as_deref())?;

    match cli.command {
        Command::Tune { seconds, history } => tune(config, seconds, history.as_deref()),
        Command::Metronome { bpm, seconds } => metronome(config, bpm, seconds),
        Command::Play {
            exercise,
            bpm,
            hit_line,
            metronome,
        } => play(config, &exercise, bpm, hit_line, metronome),
        Command::Analyze { file, all } => analyze(&config, &file, all),
        Command::Devices => {
            devices();
            Ok(())
        }
        Command::Params { defaults } => {
            let params = if defaults {
                DetectionParameters::default()
            } else {
                config.detection
            };
            println!("{}", params.to_json()?);
            Ok(())
        }
        Command::SaveConfig => {
            config.save(&cli.config)?;
            println!("Configuration written to {}", cli.config.display());
            Ok(())
        }
    }
}

fn load_config(
    path: &Path,
    params: Option<&Path>,
) -> Result<TrainerConfig, Box<dyn std::error::Error>> {
    let mut config = TrainerConfig::load(path)?;
    if let Some(params) = params {
        config.detection = DetectionParameters::load_json(params)?;
    }
    Ok(config)
}

fn until(seconds: Option<u64>) -> impl Fn() -> bool {
    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    move || deadline.is_none_or(|deadline| Instant::now() < deadline)
}

fn tune(
    config: TrainerConfig,
    seconds: Option<u64>,
    history: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let trainer = Trainer::start(config)?;
    let keep_going = until(seconds);
    let mut last_tick = 0;
    let mut last_status = None;

    while keep_going() {
        let status = trainer.input_status();
        if last_status != Some(status) {
            println!("Input: {}", status);
            last_status = Some(status);
        }
        for notification in trainer.drain_notifications() {
            eprintln!("[{:?}] {}", notification.level, notification.message);
        }
        let latest = trainer.latest();
        if latest.tick != last_tick {
            last_tick = latest.tick;
            match latest.estimate {
                Some(estimate) => println!(
                    "{:<4} {:+3} cents  {:7.2} Hz  string {}",
                    estimate.note.to_string(),
                    estimate.cents,
                    estimate.frequency,
                    estimate.string
                ),
                None => println!("--"),
            }
        }
        thread::sleep(POLL_INTERVAL);
    }

    if let Some(path) = history {
        std::fs::write(path, trainer.history_json()?)?;
        println!("Detection history written to {}", path.display());
    }
    Ok(())
}

fn metronome(
    config: TrainerConfig,
    bpm: f64,
    seconds: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let trainer = Trainer::start(config)?;
    let tempo = trainer.start_metronome(bpm);
    println!("Metronome at {}", tempo);

    let keep_going = until(seconds);
    let mut last_beat = 0;
    while keep_going() {
        let beat = trainer.metronome_beat();
        if beat != last_beat && beat != 0 {
            println!("{}", if beat == 1 { "ONE" } else { "." });
        }
        last_beat = beat;
        thread::sleep(Duration::from_millis(10));
    }
    trainer.stop_metronome();
    Ok(())
}

fn play(
    config: TrainerConfig,
    exercise: &Path,
    bpm: Option<f64>,
    hit_line: Option<f64>,
    metronome: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let exercise = Exercise::load(exercise)?;
    let trainer = Trainer::start(config)?;
    trainer.set_metronome_enabled(metronome || trainer.config().metronome_enabled);
    let tempo = trainer.play(&exercise, bpm, hit_line)?;
    println!(
        "Playing \"{}\" ({} notes) at {}",
        exercise.name,
        exercise.notes.len(),
        tempo
    );

    let mut last_label = None;
    let mut last_score = None;
    while trainer.is_playing() {
        let snapshot = trainer.snapshot();
        let label = snapshot.countdown.map(|countdown| countdown.label());
        if label.is_some() && label != last_label {
            println!("{}", label.unwrap_or_default());
        }
        last_label = label;

        if Some(snapshot.score) != last_score {
            if last_score.is_some() {
                println!(
                    "perfect {}  miss {}",
                    snapshot.score.perfect, snapshot.score.miss
                );
            }
            last_score = Some(snapshot.score);
        }
        thread::sleep(POLL_INTERVAL / 4);
    }

    let score = trainer.sequencer().score();
    println!("Done: {} perfect, {} missed", score.perfect, score.miss);
    Ok(())
}

fn analyze(config: &TrainerConfig, file: &Path, all: bool) -> Result<(), Box<dyn std::error::Error>> {
    let recording = Recording::load_wav(file)?;
    println!(
        "{}: {:.2} s at {} Hz",
        file.display(),
        recording.samples.len() as f64 / recording.sample_rate as f64,
        recording.sample_rate
    );

    for detection in analyze_recording(&recording, config.detection.clone(), config.spectrum_band) {
        match detection.estimate {
            Some(estimate) => println!(
                "{:8.3}s  {:<4} {:+3} cents  {:7.2} Hz  string {}",
                detection.time,
                estimate.note.to_string(),
                estimate.cents,
                estimate.frequency,
                estimate.string
            ),
            None if all => println!("{:8.3}s  {:?}", detection.time, detection.outcome),
            None => {}
        }
    }
    Ok(())
}

fn devices() {
    let manager = AudioDeviceManager::new();
    println!("Input devices:");
    for device in manager.list_input_devices() {
        let marker = if device.is_default { "*" } else { " " };
        println!("  {} {}", marker, device.name);
    }
    println!("Output devices:");
    for device in manager.list_output_devices() {
        let marker = if device.is_default { "*" } else { " " };
        println!("  {} {}", marker, device.name);
    }
}
