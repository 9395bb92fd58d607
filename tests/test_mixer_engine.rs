/// Mix engine integration: scenes in, audio out
///
/// Uses the offline output so the graph can be pulled directly, and tokio's
/// paused clock so transient generators fire deterministically.

use focus_companion::audio::{AudioOutput, OfflineOutput};
use focus_companion::config::AudioConfig;
use focus_companion::context::ContextState;
use focus_companion::layers::SoundLayerFactory;
use focus_companion::mixer::{AudioMixEngine, Mix};
use focus_companion::scenes::{self, SceneSelection};
use std::time::Duration;
use tokio::runtime::Handle;

mod audio_test_utils;
use audio_test_utils::{average_spectrum, band_energy, calculate_peak, calculate_rms, dominant_frequency, left};

const SAMPLE_RATE: u32 = 22050;

fn engine(seed: u64) -> AudioMixEngine {
    let config = AudioConfig {
        noise_seconds: 0.5,
        ..AudioConfig::default()
    };
    AudioMixEngine::with_factory(
        &config,
        SoundLayerFactory::with_seed(0.5, Handle::current(), seed),
        Box::new(|| Ok(Box::new(OfflineOutput::new(SAMPLE_RATE)) as Box<dyn AudioOutput>)),
    )
}

fn pull(engine: &AudioMixEngine, seconds: f32) -> Vec<[f32; 2]> {
    let ctx = engine.context().expect("context");
    ctx.render_offline((seconds * SAMPLE_RATE as f32) as usize)
}

#[tokio::test(start_paused = true)]
async fn test_scene_selection_drives_layers() {
    let mut engine = engine(1);
    let mut selection = SceneSelection::default();

    selection.select(Some("rainy_cafe"));
    engine.set_mix(&selection.mix);
    assert_eq!(engine.active_sounds(), vec!["cafe".to_string(), "rain".to_string()]);

    selection.select(Some("campfire"));
    engine.set_mix(&selection.mix);
    let expected: Vec<String> = scenes::find("campfire")
        .expect("scene")
        .mix()
        .active()
        .map(|(id, _)| id.to_string())
        .collect();
    assert_eq!(engine.active_sounds(), expected);

    selection.select(None);
    engine.set_mix(&selection.mix);
    assert!(engine.active_sounds().is_empty());
    assert_eq!(engine.context_state(), Some(ContextState::Running));
}

#[tokio::test(start_paused = true)]
async fn test_every_scene_is_audible() {
    for scene in scenes::SOUND_SCENES.iter() {
        let mut engine = engine(3);
        engine.set_mix(&scene.mix());
        let frames = pull(&engine, 1.0);
        let rms = calculate_rms(&left(&frames));
        let peak = calculate_peak(&left(&frames));
        assert!(rms > 0.001, "{} is silent (rms {})", scene.id, rms);
        assert!(peak <= 1.0, "{} clips", scene.id);
    }
}

#[tokio::test(start_paused = true)]
async fn test_volume_change_glides() {
    let mut engine = engine(5);
    engine.set_mix(&Mix::new().with("white", 0.1));
    // let master and layer gains settle
    pull(&engine, 1.0);
    let quiet = calculate_rms(&left(&pull(&engine, 0.5)));

    engine.set_mix(&Mix::new().with("white", 0.9));
    let first = pull(&engine, 0.005);
    let settled = calculate_rms(&left(&{
        pull(&engine, 1.0);
        pull(&engine, 0.5)
    }));

    // A step to 0.9 would peak near 0.3 * 0.9 * 0.5 within 5 ms
    let early_peak = calculate_peak(&left(&first));
    assert!(early_peak < 0.06, "gain should ramp, not step (peak {early_peak})");
    assert!(settled > quiet * 5.0, "quiet {quiet}, settled {settled}");
}

#[tokio::test(start_paused = true)]
async fn test_chime_is_two_tones() {
    let mut engine = engine(7);
    engine.play_chime();
    assert_eq!(engine.context_state(), Some(ContextState::Running));

    let frames = pull(&engine, 0.2);
    let samples = left(&frames);
    let (freqs, power) = average_spectrum(&samples, SAMPLE_RATE as f32, 4096);
    let tone = dominant_frequency(&freqs, &power);
    assert!((tone - 800.0).abs() < 20.0, "first tone at {tone} Hz");

    let frames = pull(&engine, 0.4);
    let samples = left(&frames);
    let (freqs, power) = average_spectrum(&samples, SAMPLE_RATE as f32, 4096);
    let high = band_energy(&freqs, &power, 1150.0, 1250.0);
    let off = band_energy(&freqs, &power, 2000.0, 3000.0);
    assert!(high > off * 100.0, "second tone missing");
}

#[tokio::test(start_paused = true)]
async fn test_transients_follow_the_mix() {
    let mut engine = engine(9);
    engine.set_mix(&Mix::new().with("fire", 0.6).with("night", 0.4));
    tokio::time::sleep(Duration::from_secs(3)).await;
    let fired = engine.transients_fired();
    // crackles every 100-300 ms alone give at least 10 in 3 s
    assert!(fired >= 10, "only {fired} transients");

    engine.set_mix(&Mix::new().with("night", 0.4));
    tokio::time::sleep(Duration::from_secs(3)).await;
    let night_only = engine.transients_fired() - fired;
    // crickets every 0.3-1.8 s
    assert!(night_only >= 1 && night_only <= 10, "{night_only} cricket bursts");

    engine.dispose();
    assert_eq!(engine.context_state(), None);
}
