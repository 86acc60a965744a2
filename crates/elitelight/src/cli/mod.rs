//! CLI subcommands: LED control, event feed, reachability and config.

mod colors;
mod config_cmd;
mod control;
mod probe;
mod watch;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use elitelight_lib::config::Config;
pub(super) use elitelight_lib::controller::{
    ConfirmationSink, ControlOutcome, ControlRequest, ControlResult, LedChanged, LedController,
};
pub(super) use elitelight_lib::error::Result;
pub(super) use elitelight_lib::hooks::{HOOK_TIMEOUT, HookRunner};
pub(super) use elitelight_lib::led::{self, LedState};
pub(super) use elitelight_lib::ElitelightError;

use elitelight_lib::endpoint::DeviceEndpoint;
use elitelight_lib::transport::{
    self, CommandSession, CommandTransport, DeviceTransport, DryRunTransport,
};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|e| ElitelightError::Config(format!("JSON output: {e}")))?;
    println!("{s}");
    Ok(())
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
    pub json: bool,
    pub config_path: Option<PathBuf>,
    pub dry_run: bool,
}

/// Load the config file, logging parse problems.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let (config, warnings) = match custom_path {
        Some(p) => Config::load_from(p),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    config
}

/// Load the config and refuse to continue if it has problems.
pub(super) fn load_valid_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = load_config(custom_path);
    if let Err(errors) = config.validate() {
        let all: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(ElitelightError::Config(all.join("; ")));
    }
    Ok(config)
}

// ── Transport selection ──

/// Transport picked from the command line: the configured bridge, or a
/// dry run that only logs.
pub(super) enum CliTransport {
    Command(CommandTransport),
    DryRun(DryRunTransport),
}

pub(super) enum CliSession {
    Command(CommandSession),
    DryRun(DeviceEndpoint),
}

impl CliTransport {
    pub(super) fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        if dry_run {
            return Ok(CliTransport::DryRun(DryRunTransport));
        }
        if config.transport_command.trim().is_empty() {
            return Err(ElitelightError::Config(
                "transport_command is not set (use --dry-run to test without a bridge)".into(),
            ));
        }
        Ok(CliTransport::Command(CommandTransport::new(
            &config.transport_command,
            config.write_timeout(),
        )))
    }
}

impl DeviceTransport for CliTransport {
    type Session = CliSession;

    fn open(&self, endpoint: &DeviceEndpoint) -> transport::Result<Self::Session> {
        match self {
            CliTransport::Command(t) => t.open(endpoint).map(CliSession::Command),
            CliTransport::DryRun(t) => t.open(endpoint).map(CliSession::DryRun),
        }
    }

    fn send(&self, session: &mut Self::Session, state: &LedState) -> transport::Result<()> {
        match (self, session) {
            (CliTransport::Command(t), CliSession::Command(s)) => t.send(s, state),
            (CliTransport::DryRun(t), CliSession::DryRun(s)) => t.send(s, state),
            _ => Err(transport::TransportError::Write(
                "session does not belong to this transport".into(),
            )),
        }
    }
}

// ── Confirmation output ──

/// Prints confirmations (when `echo` is set) and runs the change hook.
pub(super) struct CliSink {
    json: bool,
    echo: bool,
    hooks: HookRunner,
}

impl ConfirmationSink for CliSink {
    fn confirm(&self, change: &LedChanged) {
        if self.echo {
            if self.json {
                match serde_json::to_string(change) {
                    Ok(line) => println!("{line}"),
                    Err(e) => log::warn!("could not encode confirmation: {e}"),
                }
            } else {
                println!("  {} -> {}", change.source, change.state);
            }
        }
        self.hooks.run(change);
    }
}

pub(super) type CliController = LedController<CliTransport>;

/// Build the facade for the configured device.
///
/// The returned hook runner shares state with the one inside the sink, so
/// callers can wait for a hook started by the last confirmation.
pub(super) fn build_controller(
    config: &Config,
    opts: &GlobalOpts,
    echo: bool,
) -> Result<(CliController, HookRunner)> {
    let transport = CliTransport::from_config(config, opts.dry_run)?;
    let hooks = HookRunner::new(&config.on_change_command);
    let sink = CliSink {
        json: opts.json,
        echo,
        hooks: hooks.clone(),
    };
    let controller = LedController::new(
        config.endpoint()?,
        config.event_mapping()?,
        transport,
        config.control_settings(),
        sink,
    );
    Ok((controller, hooks))
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ApplyOutput {
    pub device: String,
    pub source: String,
    pub state: Option<LedState>,
    #[serde(flatten)]
    pub result: ControlResult,
}

#[derive(Serialize)]
pub(super) struct ProbeOutput {
    pub device: String,
    pub host: String,
    pub port: u16,
    pub reachable: bool,
    pub elapsed_ms: u128,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct ColorsOutput {
    pub colors: Vec<NamedColorJson>,
    pub scenes: Vec<&'static str>,
    pub speeds: Vec<&'static str>,
}

#[derive(Serialize)]
pub(super) struct NamedColorJson {
    pub name: &'static str,
    pub hex: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Set the strip to a colour, scene or "off"
    Set {
        /// Colour name, #RRGGBB, r,g,b, scene name, "on" or "off"
        color: String,
        /// Scene speed: fast, normal or slow
        #[arg(long, default_value = "normal")]
        speed: String,
    },

    /// Apply the state mapped to a game event (e.g. Docked, StartJump)
    Event {
        /// Event name as it appears in the journal
        name: String,
    },

    /// Read event names from stdin (one per line) and apply them as they arrive
    Watch,

    /// Check whether the device answers on its control port
    Probe,

    /// Show current configuration and file paths
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },

    /// List colour names, scenes and speeds
    Colors,
}

pub fn run(cmd: Command, opts: &GlobalOpts) -> Result<()> {
    let config_path = opts.config_path.as_deref();
    match cmd {
        Command::Set { color, speed } => control::cmd_set(&color, &speed, opts),
        Command::Event { name } => control::cmd_event(&name, opts),
        Command::Watch => watch::cmd_watch(opts),
        Command::Probe => probe::cmd_probe(config_path, opts.json),
        Command::Config { init } => config_cmd::cmd_config(opts.json, config_path, init),
        Command::Colors => colors::cmd_colors(opts.json),
    }
}
