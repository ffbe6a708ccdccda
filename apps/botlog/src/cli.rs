use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::normalize::ViewerZone;
use crate::roster::RosterUser;
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "botlog",
    about = "Browse, follow and search IRC channel logs from the terminal",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "BOTLOG_BASE_URL",
        value_name = "URL",
        help = "Base URL of the log server (overrides the configured one)"
    )]
    pub base_url: Option<String>,

    #[arg(
        long = "prefs",
        global = true,
        env = "BOTLOG_PREFS_PATH",
        value_name = "PATH",
        help = "File that keeps viewer preferences between runs"
    )]
    pub prefs_path: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "BOTLOG_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "BOTLOG_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    /// Falls back to `fallback` when no file was given on the command line.
    pub fn to_config(&self, fallback: Option<PathBuf>) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone().or(fallback),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Browse a channel log with infinite scroll in both directions
    View(ViewArgs),
    /// Print new lines of a channel as they arrive
    Tail(TailArgs),
    /// Show the location feed on a world map
    Globe(GlobeArgs),
    /// Edit a bot administrator roster and print the form value
    Roster(RosterArgs),
    /// Sign an email address up for announcements
    Subscribe(SubscribeArgs),
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    #[arg(value_name = "CHANNEL_URL", help = "Channel or day page, absolute or relative to the base URL")]
    pub channel: String,

    #[arg(long, value_name = "ID", help = "Entry id to highlight and center on")]
    pub highlight: Option<String>,

    #[arg(
        long,
        value_name = "TZ",
        env = "BOTLOG_CLIENT_TIMEZONE",
        help = "Display timezone: local, UTC or an offset like +09:00"
    )]
    pub timezone: Option<ViewerZone>,
}

#[derive(Args, Debug)]
pub struct TailArgs {
    #[arg(value_name = "CHANNEL_URL")]
    pub channel: String,

    #[arg(long, value_name = "TZ", env = "BOTLOG_CLIENT_TIMEZONE")]
    pub timezone: Option<ViewerZone>,

    #[arg(
        long = "all",
        action = clap::ArgAction::SetTrue,
        help = "Include joins, parts and quits"
    )]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct GlobeArgs {
    #[arg(value_name = "STREAM_URL")]
    pub stream: String,
}

#[derive(Args, Debug)]
pub struct RosterArgs {
    #[arg(value_name = "JSON_FILE")]
    pub file: PathBuf,

    #[arg(
        long = "add",
        value_name = "ID:EMAIL",
        value_parser = parse_roster_user,
        help = "Add a user (repeatable)"
    )]
    pub add: Vec<RosterUser>,

    #[arg(long = "remove", value_name = "ID", help = "Remove a user by id (repeatable)")]
    pub remove: Vec<String>,

    #[arg(
        long = "dry-run",
        action = clap::ArgAction::SetTrue,
        help = "Print the result without saving the file"
    )]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    #[arg(value_name = "FORM_URL")]
    pub form: String,

    #[arg(long, value_name = "EMAIL")]
    pub email: String,

    #[arg(long, value_name = "TOKEN", hide_env_values = true, env = "BOTLOG_CSRF_TOKEN")]
    pub csrf: Option<String>,
}

fn parse_roster_user(raw: &str) -> Result<RosterUser, String> {
    let (id, email) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected ID:EMAIL, got '{raw}'"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err("user id must not be empty".into());
    }
    Ok(RosterUser {
        id: id.to_string(),
        email: email.trim().to_string(),
    })
}
