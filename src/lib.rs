//! AU instance host
//!
//! Hosts N instances of one Audio Unit style plugin, drives them with a
//! generated MIDI note sequence and saves/restores their combined state as
//! named presets.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod midi;
pub mod paths;
pub mod platform;
pub mod playback;
pub mod state;
