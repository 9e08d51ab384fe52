//! Command-line interface and REPL

use crate::app::HostSession;
use crate::error::HostError;
use crate::host::{HostObserver, HostedInstance, Phase, SurfaceMap};
use crate::playback::PlaybackDriver;
use crate::state::{PresetId, StateCollection, StateMap};
use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const HELP: &str = "\
Commands:
  count <n>        set the number of hosted instances
  instances        list live instances
  play | stop      start/stop the scale on every instance
  toggle           toggle playback
  once <slot>      play one note on an instance
  state <slot>     show an instance's current state
  presets          list presets
  save <name>      capture every instance into a new preset
  overwrite <i>    re-capture into preset i
  load <i>         apply preset i
  delete <i>       delete preset i
  help             this text
  quit             exit";

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Count(usize),
    Instances,
    Play,
    Stop,
    Toggle,
    Once(usize),
    State(usize),
    Presets,
    Save(String),
    Overwrite(usize),
    Load(usize),
    Delete(usize),
    Help,
    Quit,
}

impl Command {
    /// Parse a REPL line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let number = |what: &str| -> Result<usize, String> {
            rest.parse::<usize>()
                .map_err(|_| format!("'{}' expects a {}, got '{}'", word, what, rest))
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "count" => Command::Count(number("count")?),
            "instances" | "ls" => Command::Instances,
            "play" | "start" => Command::Play,
            "stop" => Command::Stop,
            "toggle" => Command::Toggle,
            "once" => Command::Once(number("slot")?),
            "state" => Command::State(number("slot")?),
            "presets" => Command::Presets,
            "save" if rest.is_empty() => return Err("'save' expects a preset name".to_string()),
            "save" => Command::Save(rest.to_string()),
            "overwrite" => Command::Overwrite(number("preset index")?),
            "load" => Command::Load(number("preset index")?),
            "delete" | "rm" => Command::Delete(number("preset index")?),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{}' (try 'help')", other)),
        };
        Ok(Some(command))
    }
}

/// Prints instance-manager notifications and keeps playback in step with
/// the live set
pub struct ConsoleObserver {
    playback: Arc<PlaybackDriver>,
}

impl ConsoleObserver {
    pub fn new(playback: Arc<PlaybackDriver>) -> Self {
        Self { playback }
    }
}

impl HostObserver for ConsoleObserver {
    fn on_connected(&self, instances: &[HostedInstance], surfaces: &SurfaceMap) {
        self.playback.retain(instances);
        println!(
            "{} {} instance(s) connected",
            "●".green(),
            instances.len().to_string().bold()
        );
        print_instances(instances, Some(surfaces));
    }

    fn on_failed(&self, error: &HostError) {
        println!("{} {}", "✗".red(), error.to_string().red());
    }

    fn on_state_captured(&self, collection: &StateCollection) {
        debug!(slots = collection.len(), "State captured");
    }
}

pub fn print_instances(instances: &[HostedInstance], surfaces: Option<&SurfaceMap>) {
    for (slot, instance) in instances.iter().enumerate() {
        let ui = match surfaces.and_then(|s| s.get(&instance.id)) {
            Some(Some(surface)) => format!("{}x{}", surface.width, surface.height).green(),
            Some(None) => "no UI".yellow(),
            None => "".normal(),
        };
        println!(
            "  [{}] {} {} {}",
            slot,
            instance.id.to_string().dimmed(),
            instance.plugin.name().bright_white(),
            ui
        );
    }
}

pub fn print_presets(presets: &[(PresetId, String)]) {
    if presets.is_empty() {
        println!("  {}", "no presets".dimmed());
        return;
    }
    for (index, (id, name)) in presets.iter().enumerate() {
        println!("  [{}] {} {}", index, name.cyan(), id.to_string().dimmed());
    }
}

fn print_state(slot: usize, state: Option<&StateMap>) {
    let Some(state) = state else {
        println!("  [{}] {}", slot, "no state".dimmed());
        return;
    };
    println!("  [{}] {} entries", slot, state.len());
    for (key, value) in state {
        println!("    {} = {}", key.yellow(), value);
    }
}

/// Run the interactive shell until `quit`, end of input or Ctrl+C
pub async fn run_repl(session: &HostSession) -> Result<()> {
    let mut lines = spawn_reader()?;
    println!("{}", "Type 'help' for commands.".dimmed());

    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        match Command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(session, command).await,
            Ok(None) => {}
            Err(message) => println!("{}", message.red()),
        }
    }

    Ok(())
}

/// Read lines on a dedicated thread; rustyline owns the terminal there
///
/// Not `spawn_blocking`: a pending `readline` must not hold up runtime
/// shutdown.
fn spawn_reader() -> Result<mpsc::UnboundedReceiver<String>> {
    let mut rl = DefaultEditor::new()?;
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new().name("repl".into()).spawn(move || loop {
        match rl.readline("au-host> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!("Readline error: {}", e);
                break;
            }
        }
    })?;

    Ok(rx)
}

async fn execute(session: &HostSession, command: Command) {
    match command {
        Command::Count(n) => {
            session.set_instance_count(n);
            println!("Requested {} instance(s)", n);
        }
        Command::Instances => {
            let instances = session.instances().await;
            if session.manager().phase().await == Phase::Failed {
                println!("  {}", "last count change failed".red());
            }
            if instances.is_empty() {
                println!("  {}", "no instances".dimmed());
            }
            print_instances(&instances, None);
        }
        Command::Play => {
            let started = session.start_playback().await;
            println!("{} ({} started)", "Playing".green(), started);
        }
        Command::Stop => {
            session.stop_playback();
            println!("{}", "Stopped".yellow());
        }
        Command::Toggle => {
            let playing = session.toggle_playback().await;
            let label = if playing { "Playing".green() } else { "Stopped".yellow() };
            println!("{}", label);
        }
        Command::Once(slot) => report(session.play_once(slot).await.map(|_| ())),
        Command::State(slot) => match session.instance_state(slot).await {
            Ok(state) => print_state(slot, state.as_ref()),
            Err(e) => println!("{}", e.to_string().red()),
        },
        Command::Presets => print_presets(&session.presets()),
        Command::Save(name) => match session.save_preset(&name).await {
            Ok(id) => println!("Saved '{}' {}", name.cyan(), id.to_string().dimmed()),
            Err(e) => println!("{}", e.to_string().red()),
        },
        Command::Overwrite(index) => report(session.overwrite_preset(index).await.map(|_| ())),
        Command::Load(index) => match session.load_preset(index).await {
            Ok(applied) => println!("Applied to {} instance(s)", applied),
            Err(e) => println!("{}", e.to_string().red()),
        },
        Command::Delete(index) => match session.delete_preset(index) {
            Ok(preset) => println!("Deleted '{}'", preset.name.cyan()),
            Err(e) => println!("{}", e.to_string().red()),
        },
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

fn report<E: std::fmt::Display>(result: Result<(), E>) {
    match result {
        Ok(()) => println!("{}", "ok".green()),
        Err(e) => println!("{}", e.to_string().red()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("count 4"), Ok(Some(Command::Count(4))));
        assert_eq!(Command::parse("  PLAY "), Ok(Some(Command::Play)));
        assert_eq!(Command::parse("once 2"), Ok(Some(Command::Once(2))));
        assert_eq!(
            Command::parse("save warm pad"),
            Ok(Some(Command::Save("warm pad".to_string())))
        );
        assert_eq!(Command::parse("rm 0"), Ok(Some(Command::Delete(0))));
        assert_eq!(Command::parse("exit"), Ok(Some(Command::Quit)));
        assert_eq!(Command::parse(""), Ok(None));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Command::parse("count").is_err());
        assert!(Command::parse("count -1").is_err());
        assert!(Command::parse("load x").is_err());
        assert!(Command::parse("save").is_err());
        assert!(Command::parse("frobnicate").unwrap_err().contains("frobnicate"));
    }
}
