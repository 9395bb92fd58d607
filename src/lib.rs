//! # Focus Companion - Pomodoro timer with procedural ambience
//!
//! A Pomodoro session machine that settles rewards (affection, streaks,
//! heatmap, session log) at the end of each run, paired with an ambient sound
//! engine that synthesizes every layer from noise, filters and oscillators.
//!
//! ## Core Features
//!
//! - **Session State Machine**: focus/break cycles, pause, reset, fast-forward,
//!   per-run reward settlement, defensive state import
//! - **Noise Synthesis**: white, pink (Paul Kellet filter bank) and brown noise buffers
//! - **Sound Layers**: twelve ambient sounds built from looped beds and
//!   randomly timed transients (drips, crackles, chirps, thunder)
//! - **Mix Engine**: lazy audio context, smooth gain changes, blocked-playback
//!   recovery, completion chime
//! - **Offline Rendering**: the same mixes rendered deterministically to WAV
//!
//! ## Quick Start
//!
//! ### Running the session machine
//!
//! ```rust
//! use chrono::Local;
//! use focus_companion::session::{SessionAction, SessionState};
//!
//! let mut state = SessionState::new(25, 5, 4);
//! state.apply(SessionAction::Start, Local::now());
//! state.apply(SessionAction::Tick, Local::now());
//! assert_eq!(state.formatted_time(), "24:59");
//! ```
//!
//! ### Rendering a mix
//!
//! ```rust
//! use focus_companion::mixer::Mix;
//! use focus_companion::render::{RenderConfig, Renderer};
//!
//! let mix = Mix::parse("rain=0.5,cafe=0.4").unwrap();
//! let renderer = Renderer::new(RenderConfig {
//!     duration: 0.5,
//!     ..Default::default()
//! });
//! let frames = renderer.render_to_buffer(&mix).unwrap();
//! assert_eq!(frames.len(), 22050);
//! ```
//!
//! ## Modules
//!
//! - [`session`]: the reducer; [`record`] its persisted form and import rules
//! - [`timer`]: the coordinator that ticks, completes phases and saves
//! - [`noise`], [`nodes`], [`graph`]: synthesis building blocks
//! - [`layers`], [`mixer`], [`context`], [`audio`]: the live engine
//! - [`scenes`], [`garden`]: presets and plant progression

pub mod audio;
pub mod audio_node;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod garden;
pub mod graph;
pub mod layers;
pub mod mixer;
pub mod nodes;
pub mod noise;
pub mod persistence;
pub mod record;
pub mod render;
pub mod scenes;
pub mod session;
pub mod timer;

pub use error::{Error, Result};
