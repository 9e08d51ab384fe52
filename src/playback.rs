//! Playback driver - feeds hosted instances a repeating major-scale run
//!
//! Every instance gets its own emitter task and its own playing flag. The
//! control side only ever flips flags; an emitter notices at its next step
//! boundary, so a stopped run always finishes the note it was holding.

use crate::config::PlaybackConfig;
use crate::host::HostedInstance;
use crate::midi::MidiMessage;
use crate::platform::InstanceId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Major scale as semitone steps
const MAJOR_SCALE: [u8; 7] = [2, 2, 1, 2, 2, 2, 1];

/// Ascent after which a run restarts at the base note (two octaves)
const WRAP_SEMITONES: u8 = 24;

/// Timing and note parameters shared by every emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    pub base_note: u8,
    /// MIDI channel, 0-based
    pub channel: u8,
    pub velocity: u8,
    /// One scale step: 4/5 held, 1/5 rest
    pub step: Duration,
    pub once_hold: Duration,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            base_note: 60,
            channel: 0,
            velocity: 100,
            step: Duration::from_millis(100),
            once_hold: Duration::from_millis(200),
        }
    }
}

impl PlaybackSettings {
    pub fn hold(&self) -> Duration {
        self.step * 4 / 5
    }

    pub fn rest(&self) -> Duration {
        self.step / 5
    }

    fn note_on(&self, note: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            channel: self.channel,
            note,
            velocity: self.velocity,
        }
    }

    fn note_off(&self, note: u8) -> MidiMessage {
        MidiMessage::NoteOff {
            channel: self.channel,
            note,
            velocity: 0,
        }
    }
}

impl From<&PlaybackConfig> for PlaybackSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            base_note: config.base_note.min(127 - WRAP_SEMITONES),
            channel: config.channel.saturating_sub(1).min(15),
            velocity: config.velocity.clamp(1, 127),
            step: Duration::from_millis(config.step_ms.max(5)),
            once_hold: Duration::from_millis(config.once_hold_ms),
        }
    }
}

/// Endless note sequence walking the major scale up two octaves, then
/// starting over
#[derive(Debug, Clone)]
pub struct ScaleWalker {
    base: u8,
    offset: u8,
    step: usize,
}

impl ScaleWalker {
    pub fn new(base: u8) -> Self {
        Self {
            base,
            offset: 0,
            step: 0,
        }
    }
}

impl Iterator for ScaleWalker {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let note = self.base.saturating_add(self.offset).min(127);

        self.offset += MAJOR_SCALE[self.step];
        self.step = (self.step + 1) % MAJOR_SCALE.len();
        if self.offset >= WRAP_SEMITONES {
            self.offset = 0;
            self.step = 0;
        }

        Some(note)
    }
}

/// Starts, stops and one-shots note playback on hosted instances
pub struct PlaybackDriver {
    settings: PlaybackSettings,
    flags: Mutex<HashMap<InstanceId, Arc<AtomicBool>>>,
}

impl PlaybackDriver {
    pub fn new(settings: PlaybackSettings) -> Self {
        Self {
            settings,
            flags: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// Start an emitter for every instance not already playing
    ///
    /// Flags of instances missing from `instances` are cleared first.
    /// Returns how many emitters were started.
    pub fn start(&self, instances: &[HostedInstance]) -> usize {
        self.retain(instances);

        let mut flags = self.flags.lock();
        let mut started = 0;
        for instance in instances {
            if flags.contains_key(&instance.id) {
                continue;
            }

            let playing = Arc::new(AtomicBool::new(true));
            flags.insert(instance.id, Arc::clone(&playing));
            tokio::spawn(emit_scale(instance.clone(), playing, self.settings));
            started += 1;
        }

        if started > 0 {
            info!(started, playing = flags.len(), "Playback started");
        }
        started
    }

    /// Ask every emitter to finish its current step and exit
    pub fn stop(&self) {
        let mut flags = self.flags.lock();
        for playing in flags.values() {
            playing.store(false, Ordering::Release);
        }
        if !flags.is_empty() {
            info!(stopped = flags.len(), "Playback stopped");
        }
        flags.clear();
    }

    pub fn is_playing(&self) -> bool {
        self.flags
            .lock()
            .values()
            .any(|playing| playing.load(Ordering::Acquire))
    }

    /// Stop if anything plays, start otherwise; returns the new state
    pub fn toggle(&self, instances: &[HostedInstance]) -> bool {
        if self.is_playing() {
            self.stop();
        } else {
            self.start(instances);
        }
        self.is_playing()
    }

    /// Stop the emitters of instances that are no longer live
    pub fn retain(&self, live: &[HostedInstance]) {
        self.flags.lock().retain(|id, playing| {
            let keep = live.iter().any(|instance| instance.id == *id);
            if !keep {
                playing.store(false, Ordering::Release);
                debug!(instance = %id, "Stopping playback of pruned instance");
            }
            keep
        });
    }

    /// Play a single base note on one instance
    ///
    /// Independent of the repeating runs; the returned task completes after
    /// the note-off.
    pub fn play_once(&self, instance: &HostedInstance) -> JoinHandle<()> {
        let instance = instance.clone();
        let settings = self.settings;
        tokio::spawn(async move {
            let note = settings.base_note;
            send(&instance, settings.note_on(note));
            tokio::time::sleep(settings.once_hold).await;
            send(&instance, settings.note_off(note));
        })
    }
}

impl Drop for PlaybackDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn emit_scale(instance: HostedInstance, playing: Arc<AtomicBool>, settings: PlaybackSettings) {
    debug!(instance = %instance.id, "Emitter started");

    for note in ScaleWalker::new(settings.base_note) {
        if !playing.load(Ordering::Acquire) {
            break;
        }

        send(&instance, settings.note_on(note));
        tokio::time::sleep(settings.hold()).await;
        send(&instance, settings.note_off(note));
        tokio::time::sleep(settings.rest()).await;
    }

    debug!(instance = %instance.id, "Emitter stopped");
}

fn send(instance: &HostedInstance, message: MidiMessage) {
    trace!(instance = %instance.id, %message, "MIDI out");
    instance.plugin.send_midi(&message.encode());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::SimPlugin;
    use crate::platform::PluginInstance;
    use crate::state::PropertyMap;

    fn instance(id: u64) -> (HostedInstance, Arc<SimPlugin>) {
        let plugin = Arc::new(SimPlugin::new(
            format!("sim {}", id),
            PropertyMap::new(),
            true,
            Duration::ZERO,
        ));
        let hosted = HostedInstance {
            id: InstanceId(id),
            plugin: Arc::clone(&plugin) as Arc<dyn PluginInstance>,
        };
        (hosted, plugin)
    }

    fn note_ons(plugin: &SimPlugin) -> Vec<u8> {
        plugin
            .received_midi()
            .into_iter()
            .filter_map(|m| match m {
                MidiMessage::NoteOn { note, .. } => Some(note),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_scale_walker_wraps_after_two_octaves() {
        let notes: Vec<u8> = ScaleWalker::new(60).take(16).collect();
        assert_eq!(
            notes,
            vec![60, 62, 64, 65, 67, 69, 71, 72, 74, 76, 77, 79, 81, 83, 60, 62]
        );
    }

    #[test]
    fn test_settings_split_step_into_hold_and_rest() {
        let settings = PlaybackSettings::default();
        assert_eq!(settings.hold(), Duration::from_millis(80));
        assert_eq!(settings.rest(), Duration::from_millis(20));
    }

    #[test]
    fn test_settings_from_config_clamps() {
        let config = PlaybackConfig {
            base_note: 120,
            channel: 1,
            velocity: 0,
            step_ms: 100,
            once_hold_ms: 200,
        };
        let settings = PlaybackSettings::from(&config);
        assert_eq!(settings.base_note, 103);
        assert_eq!(settings.channel, 0);
        assert_eq!(settings.velocity, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_emits_scale_on_every_instance() {
        let driver = PlaybackDriver::new(PlaybackSettings::default());
        let (a, plugin_a) = instance(1);
        let (b, plugin_b) = instance(2);

        assert_eq!(driver.start(&[a.clone(), b.clone()]), 2);
        assert!(driver.is_playing());
        // Already playing instances are left alone
        assert_eq!(driver.start(&[a, b]), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        for plugin in [&plugin_a, &plugin_b] {
            assert_eq!(&note_ons(plugin)[..3], &[60, 62, 64]);
        }
        driver.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_finishes_held_note() {
        let driver = PlaybackDriver::new(PlaybackSettings::default());
        let (a, plugin) = instance(1);

        driver.start(&[a]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        driver.stop();
        assert!(!driver.is_playing());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let received = plugin.received_midi();
        assert_eq!(
            received,
            vec![
                MidiMessage::NoteOn {
                    channel: 0,
                    note: 60,
                    velocity: 100
                },
                MidiMessage::NoteOff {
                    channel: 0,
                    note: 60,
                    velocity: 0
                },
            ]
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(plugin.received_midi().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_flips_state() {
        let driver = PlaybackDriver::new(PlaybackSettings::default());
        let (a, _plugin) = instance(1);
        let instances = [a];

        assert!(driver.toggle(&instances));
        assert!(!driver.toggle(&instances));
        assert!(driver.toggle(&instances));
        driver.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_without_instances_stays_stopped() {
        let driver = PlaybackDriver::new(PlaybackSettings::default());
        assert!(!driver.toggle(&[]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_once_is_independent() {
        let driver = PlaybackDriver::new(PlaybackSettings::default());
        let (a, plugin) = instance(1);

        let start = tokio::time::Instant::now();
        driver.play_once(&a).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(!driver.is_playing());

        let notes: Vec<u8> = plugin.received_midi().iter().map(|m| m.note()).collect();
        assert_eq!(notes, vec![60, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retain_stops_pruned_instances() {
        let driver = PlaybackDriver::new(PlaybackSettings::default());
        let (a, _plugin_a) = instance(1);
        let (b, plugin_b) = instance(2);

        driver.start(&[a.clone(), b]);
        driver.retain(&[a]);
        assert!(driver.is_playing());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let count = plugin_b.received_midi().len();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(plugin_b.received_midi().len(), count);
        driver.stop();
    }
}
