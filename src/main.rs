//! Focus Companion CLI - Pomodoro runs with ambient sound from the terminal

use chrono::Local;
use clap::{Parser, Subcommand};
use focus_companion::audio::{AudioOutput, CpalOutput};
use focus_companion::clock::SystemClock;
use focus_companion::config::AppConfig;
use focus_companion::error::{Error, StoreError};
use focus_companion::garden;
use focus_companion::layers::SoundId;
use focus_companion::mixer::{AudioMixEngine, Mix};
use focus_companion::persistence::{JsonFileStore, StateStore};
use focus_companion::record::{PersistedSession, SessionPatch};
use focus_companion::render::{RenderConfig, Renderer};
use focus_companion::scenes::{self, SceneSelection, SOUND_SCENES};
use focus_companion::session::{SessionAction, SessionEvent, SessionState};
use focus_companion::timer::FocusTimer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "focus-companion")]
#[command(about = "Pomodoro timer with procedural ambient sound", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/focus-companion/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Pomodoro cycle with ambient sound
    Run {
        /// Scene preset (see `scenes`)
        #[arg(short, long, conflicts_with = "mix")]
        scene: Option<String>,

        /// Custom mix, e.g. rain=0.5,cafe=0.4
        #[arg(short, long)]
        mix: Option<String>,

        /// Focus phase length in minutes
        #[arg(long)]
        minutes: Option<u32>,

        /// Break length in minutes
        #[arg(long)]
        break_minutes: Option<u32>,

        /// Focus phases per run
        #[arg(long)]
        cycles: Option<u32>,

        /// Master volume 0.0-1.0
        #[arg(short, long)]
        volume: Option<f32>,
    },

    /// Render a mix to WAV
    Render {
        /// Scene preset (see `scenes`)
        #[arg(short, long, conflicts_with = "mix")]
        scene: Option<String>,

        /// Custom mix, e.g. rain=0.5,cafe=0.4
        #[arg(short, long)]
        mix: Option<String>,

        /// Duration in seconds (default: 30.0)
        #[arg(short = 'd', long, default_value = "30.0")]
        seconds: f32,

        /// Output WAV file path
        #[arg(short, long)]
        out: PathBuf,

        /// Seed for noise and transient timing (default: 0)
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// List scenes and sounds
    Scenes,

    /// Show lifetime stats and plant progress
    Stats,

    /// Write the saved state to a JSON file
    Export {
        file: PathBuf,
    },

    /// Load state from a JSON file, repairing what it can
    Import {
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    let config = config?;

    match cli.command {
        Commands::Run {
            scene,
            mix,
            minutes,
            break_minutes,
            cycles,
            volume,
        } => {
            let mix = resolve_mix(scene.as_deref(), mix.as_deref())?;
            let overrides = Overrides {
                minutes,
                break_minutes,
                cycles,
                volume,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_session(&config, mix, overrides))?;
        }

        Commands::Render {
            scene,
            mix,
            seconds,
            out,
            seed,
        } => {
            let mix = resolve_mix(scene.as_deref(), mix.as_deref())?;
            let render_config = RenderConfig {
                seed,
                ..RenderConfig::from_audio(&config.audio, seconds)
            };

            println!("Rendering to {}", out.display());
            println!("  Mix:         {}", describe(&mix));
            println!("  Duration:    {} seconds", render_config.duration);
            println!("  Sample rate: {} Hz", render_config.sample_rate);
            println!();

            let stats = Renderer::new(render_config).render_to_file(&mix, &out)?;
            stats.print_summary();
            println!("\nRender complete: {}", out.display());
        }

        Commands::Scenes => {
            println!("Scenes:");
            for scene in SOUND_SCENES.iter() {
                println!("  {:<18} {} ({})", scene.id, scene.name, describe(&scene.mix()));
                println!("  {:<18} {}", "", scene.description);
            }
            println!("\nSounds:");
            for sound in SoundId::ALL {
                println!("  {:<18} {}", sound.as_str(), sound.label());
            }
        }

        Commands::Stats => {
            let store = JsonFileStore::new(&config.storage.state_file);
            let state = load_saved(&store, &config)?;
            print_stats(&state);
        }

        Commands::Export { file } => {
            let store = JsonFileStore::new(&config.storage.state_file);
            let state = load_saved(&store, &config)?;
            let json = serde_json::to_string_pretty(&PersistedSession::from(&state).to_json())
                .map_err(StoreError::from)?;
            std::fs::write(&file, json).map_err(|source| StoreError::Io {
                path: file.clone(),
                source,
            })?;
            println!("Exported to {}", file.display());
        }

        Commands::Import { file } => {
            let content = std::fs::read_to_string(&file).map_err(|source| StoreError::Io {
                path: file.clone(),
                source,
            })?;
            let record: serde_json::Value = serde_json::from_str(&content).map_err(StoreError::from)?;

            let store = JsonFileStore::new(&config.storage.state_file);
            let mut state = load_saved(&store, &config)?;
            state.apply(
                SessionAction::LoadState(SessionPatch::from_json(&record)),
                Local::now(),
            );
            store.save(&PersistedSession::from(&state).to_json())?;
            println!("Imported {} into {}", file.display(), store.path().display());
            print_stats(&state);
        }
    }

    Ok(())
}

struct Overrides {
    minutes: Option<u32>,
    break_minutes: Option<u32>,
    cycles: Option<u32>,
    volume: Option<f32>,
}

/// `--scene` or `--mix`; an unknown scene is an error here
fn resolve_mix(scene: Option<&str>, mix: Option<&str>) -> focus_companion::Result<Mix> {
    let mut selection = SceneSelection::default();
    match (scene, mix) {
        (Some(id), _) => {
            if scenes::find(id).is_none() {
                return Err(Error::Usage(format!("unknown scene: {id}")));
            }
            selection.select(Some(id));
        }
        (None, Some(spec)) => selection.set_custom_mix(Mix::parse(spec).map_err(Error::Usage)?),
        (None, None) => selection.select(None),
    }
    if let Some(id) = &selection.active_scene {
        info!("Scene: {}", id);
    }
    Ok(selection.mix)
}

fn describe(mix: &Mix) -> String {
    if mix.is_silent() {
        return "silence".to_string();
    }
    mix.active()
        .map(|(id, volume)| format!("{id} {:.0}%", volume * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Saved state over config defaults
fn load_saved(store: &JsonFileStore, config: &AppConfig) -> focus_companion::Result<SessionState> {
    let mut state = SessionState::from_config(&config.timer);
    if let Some(record) = store.load()? {
        state.apply(
            SessionAction::LoadState(SessionPatch::from_json(&record)),
            Local::now(),
        );
    }
    Ok(state)
}

fn print_stats(state: &SessionState) {
    let affection = state.affection();
    let stage = garden::current_stage(affection);

    println!("Focus minutes:   {}", state.total_focus_minutes());
    println!("Pomodoros:       {}", state.sessions_completed());
    println!("Affection:       {}", affection);
    println!(
        "Streak:          {} (longest {})",
        state.current_streak(),
        state.longest_streak()
    );
    match garden::next_stage(affection) {
        Some(next) => println!(
            "Plant:           {} ({:.0}% to {})",
            stage.name,
            garden::progress_to_next(affection),
            next.name
        ),
        None => println!("Plant:           {} (fully grown)", stage.name),
    }
    println!("                 {}", stage.description);

    let (minutes, earned) = state.history_totals();
    println!(
        "History:         {} runs, {} min, {} affection",
        state.sessions().len(),
        minutes,
        earned
    );

    println!("\nLast 7 days:");
    for (date, minutes) in state.weekly_minutes(Local::now().date_naive()) {
        println!("  {}  {:>4} min  {}", date.format("%a %d %b"), minutes, "#".repeat((minutes / 5).min(60) as usize));
    }
}

async fn run_session(config: &AppConfig, mix: Mix, overrides: Overrides) -> focus_companion::Result<()> {
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&config.storage.state_file));
    let timer = FocusTimer::restore(
        SessionState::from_config(&config.timer),
        store,
        Arc::new(SystemClock),
        tokio::runtime::Handle::current(),
    );
    if let Some(minutes) = overrides.minutes {
        timer.set_pomodoro_minutes(minutes.max(1));
    }
    if let Some(minutes) = overrides.break_minutes {
        timer.set_break_minutes(minutes.max(1));
    }
    if let Some(cycles) = overrides.cycles {
        timer.set_pomodoro_cycles(cycles.max(1));
    }

    let mut engine = AudioMixEngine::new(
        &config.audio,
        tokio::runtime::Handle::current(),
        Box::new(|| {
            let output = CpalOutput::open_default()?;
            Ok(Box::new(output) as Box<dyn AudioOutput>)
        }),
    );
    if let Some(volume) = overrides.volume {
        engine.set_master_volume(volume);
    }
    engine.set_mix(&mix);

    let mut events = timer.subscribe();
    timer.start();
    let state = timer.snapshot();
    println!(
        "Focus {}/{} - {} ({})",
        state.current_cycle(),
        state.pomodoro_cycles(),
        timer.formatted_time(),
        describe(&mix)
    );

    let mut status = tokio::time::interval(Duration::from_secs(60));
    status.tick().await;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::FocusCompleted { cycle, credited_seconds }) => {
                    engine.play_chime();
                    println!("Focus {} done ({} min)", cycle, credited_seconds / 60);
                    let state = timer.snapshot();
                    if state.is_running() {
                        println!("Break - {}", timer.formatted_time());
                    }
                }
                Ok(SessionEvent::BreakCompleted { cycle }) => {
                    engine.play_chime();
                    let state = timer.snapshot();
                    println!(
                        "Break {} over. Focus {}/{} - {}",
                        cycle,
                        state.current_cycle(),
                        state.pomodoro_cycles(),
                        timer.formatted_time()
                    );
                }
                Ok(SessionEvent::RunSettled(settlement)) => {
                    println!(
                        "Run complete: {} min, {} pomodoros, +{} affection, streak {}",
                        settlement.minutes,
                        settlement.pomodoros,
                        settlement.affection_gain,
                        settlement.streak
                    );
                    // let the chime ring out
                    tokio::time::sleep(Duration::from_millis(1500)).await;
                    break;
                }
                Ok(SessionEvent::PhaseExhausted { .. }) => {}
                Err(RecvError::Lagged(missed)) => warn!("Missed {} timer events", missed),
                Err(RecvError::Closed) => break,
            },
            _ = status.tick() => {
                let state = timer.snapshot();
                println!("{} {}  {:.0}%", state.timer_mode().as_str(), timer.formatted_time(), timer.progress() * 100.0);
            }
            _ = &mut ctrl_c => {
                timer.pause();
                println!("\nPaused at {}. State saved.", timer.formatted_time());
                break;
            }
        }
    }

    engine.dispose();
    info!("Session ended");
    Ok(())
}
