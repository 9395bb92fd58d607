//! Sound scenes: named presets that replace the whole mix

use crate::mixer::Mix;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundScene {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub sounds: &'static [(&'static str, f32)],
}

impl SoundScene {
    pub fn mix(&self) -> Mix {
        self.sounds.iter().copied().collect()
    }
}

pub const SOUND_SCENES: [SoundScene; 6] = [
    SoundScene {
        id: "late_night_study",
        name: "Late-night study hall",
        description: "A quiet night: pages turning and distant crickets",
        sounds: &[("night", 0.6), ("library", 0.3)],
    },
    SoundScene {
        id: "rainy_cafe",
        name: "Rainy cafe",
        description: "Rain on the window, the warm murmur of a cafe",
        sounds: &[("rain", 0.5), ("cafe", 0.4)],
    },
    SoundScene {
        id: "morning_garden",
        name: "Morning garden",
        description: "Birdsong over a light breeze",
        sounds: &[("birds", 0.5), ("wind", 0.3)],
    },
    SoundScene {
        id: "campfire",
        name: "Campfire",
        description: "A crackling fire under the night sky",
        sounds: &[("fire", 0.6), ("night", 0.3)],
    },
    SoundScene {
        id: "ocean_breeze",
        name: "Ocean breeze",
        description: "Slow waves and sea wind",
        sounds: &[("ocean", 0.6), ("wind", 0.2)],
    },
    SoundScene {
        id: "thunderstorm",
        name: "Thunderstorm",
        description: "Heavy rain with rolling thunder",
        sounds: &[("thunder", 0.5), ("rain", 0.5)],
    },
];

pub fn find(id: &str) -> Option<&'static SoundScene> {
    SOUND_SCENES.iter().find(|scene| scene.id == id)
}

/// The active scene and the mix it produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSelection {
    pub active_scene: Option<String>,
    pub mix: Mix,
}

impl SceneSelection {
    /// Select a scene by id
    ///
    /// `None` clears both the scene and the mix. A known id replaces the mix
    /// with the scene's sounds. An unknown id is remembered as the active
    /// scene but leaves the mix untouched.
    pub fn select(&mut self, scene: Option<&str>) {
        let Some(id) = scene else {
            self.active_scene = None;
            self.mix = Mix::new();
            return;
        };
        if let Some(found) = find(id) {
            self.mix = found.mix();
        }
        self.active_scene = Some(id.to_string());
    }

    /// Replace the mix directly (the scene label is kept)
    pub fn set_custom_mix(&mut self, mix: Mix) {
        self.mix = mix;
    }
}
