use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use history_sdk::{HistoryClient, PushSource};
use signal_bus::{Bus, LocalBus};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::{Cli, Command, GlobeArgs, RosterArgs, SubscribeArgs, TailArgs, ViewArgs};
use crate::client::render::plain_line;
use crate::client::view::{ViewApp, ViewExit};
use crate::client::{globe_map, TerminalGuard};
use crate::config::AppConfig;
use crate::error::CliError;
use crate::fragment::parse_shell;
use crate::model::LogItem;
use crate::normalize::{Normalizer, ViewerZone};
use crate::prefs::Preferences;
use crate::roster::Roster;
use crate::runtime::{ViewerCommand, ViewerRuntime};
use crate::telemetry::logging::LogConfig;
use crate::timeline::Timeline;
use crate::viewer::{FixedHeights, LogViewer, ScrollPolicy, ViewerSetup, ViewerSignal, APPENDED_TOPIC};

pub async fn run(cli: Cli, config: AppConfig) -> Result<(), CliError> {
    let base_url = cli.base_url.clone().unwrap_or_else(|| config.base_url.clone());
    let prefs_path = cli.prefs_path.clone().or_else(|| config.prefs_path());

    match cli.command {
        Command::View(args) => view(&base_url, prefs_path, &config, args).await,
        Command::Tail(args) => tail(&base_url, &config, args).await,
        Command::Globe(args) => globe(&base_url, args).await,
        Command::Roster(args) => roster(args),
        Command::Subscribe(args) => subscribe(&base_url, args).await,
    }
}

/// Logging setup for `cli`. Full-screen commands log to a file so the
/// terminal stays clean.
pub fn log_config(cli: &Cli, config: &AppConfig) -> LogConfig {
    let fallback = config.log_path.as_ref().map(PathBuf::from).or_else(|| match cli.command {
        Command::View(_) | Command::Globe(_) => Some(std::env::temp_dir().join("botlog.log")),
        _ => None,
    });
    cli.logging.to_config(fallback)
}

struct PageContext {
    client: Arc<HistoryClient>,
    zone: ViewerZone,
    prefs_path: Option<PathBuf>,
    config: AppConfig,
}

struct OpenedPage {
    viewer: LogViewer,
    timeline: Timeline,
    title: String,
}

impl PageContext {
    async fn open(&self, channel: &str) -> Result<OpenedPage, CliError> {
        let url = self.client.resolve(channel)?;
        info!(target = "botlog.app", %url, "loading page");
        let html = self.client.fetch_shell(url.as_str()).await?;
        let shell = parse_shell(&html);

        let client_zone = self.zone.name();
        let timeline = Timeline::new(shell.links.clone(), client_zone.as_deref(), shell.current);
        let mut setup = ViewerSetup::new(url.path(), Normalizer::new(self.zone));
        setup.client_zone = client_zone;
        setup.policy = ScrollPolicy::rows();
        setup.retry = self.config.retry_policy();
        let prefs = Preferences::open(self.prefs_path.clone());
        let viewer = LogViewer::new(shell, setup, prefs, FixedHeights::rows());

        let title = match url.path().trim_matches('/') {
            "" => url.host_str().unwrap_or(channel).to_string(),
            path => path.to_string(),
        };
        Ok(OpenedPage {
            viewer,
            timeline,
            title,
        })
    }

    fn runtime(&self, viewer: LogViewer) -> ViewerRuntime {
        ViewerRuntime::new(
            viewer,
            self.client.clone(),
            self.client.clone(),
            Arc::new(LocalBus::new()),
        )
    }
}

fn viewer_zone(arg: Option<ViewerZone>, config: &AppConfig) -> ViewerZone {
    if let Some(zone) = arg {
        return zone;
    }
    match config.client_timezone.as_deref().map(str::parse::<ViewerZone>) {
        Some(Ok(zone)) => zone,
        Some(Err(err)) => {
            warn!(target = "botlog.app", error = %err, "ignoring configured timezone");
            ViewerZone::Local
        }
        None => ViewerZone::Local,
    }
}

fn context(base_url: &str, zone: ViewerZone, prefs_path: Option<PathBuf>, config: &AppConfig) -> Result<PageContext, CliError> {
    Ok(PageContext {
        client: Arc::new(HistoryClient::new(base_url)?),
        zone,
        prefs_path,
        config: config.clone(),
    })
}

async fn view(base_url: &str, prefs_path: Option<PathBuf>, config: &AppConfig, args: ViewArgs) -> Result<(), CliError> {
    let ctx = context(base_url, viewer_zone(args.timezone, config), prefs_path, config)?;
    let mut page = ctx.open(&args.channel).await?;
    let mut highlight = args.highlight;
    let mut guard = TerminalGuard::enter()?;

    loop {
        let runtime = ctx.runtime(page.viewer);
        let app = ViewApp::new(runtime, page.timeline, page.title);
        match app.run(&mut guard, highlight.take()).await? {
            ViewExit::Quit => return Ok(()),
            ViewExit::Navigate(href) => page = ctx.open(&href).await?,
        }
    }
}

async fn tail(base_url: &str, config: &AppConfig, args: TailArgs) -> Result<(), CliError> {
    let ctx = context(base_url, viewer_zone(args.timezone, config), None, config)?;
    let page = ctx.open(&args.channel).await?;
    let mut runtime = ctx.runtime(page.viewer);
    let mut appended = runtime.bus().subscribe(APPENDED_TOPIC);

    runtime.command(ViewerCommand::FollowLive);
    if !runtime.streaming() {
        return Err(CliError::NoLiveStream {
            channel: args.channel,
        });
    }

    let mut out = io::stdout();
    loop {
        tokio::select! {
            _ = runtime.step() => {}
            signal = appended.recv() => match signal {
                Ok(ViewerSignal::Appended(items)) => print_items(&mut out, &items, args.all)?,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(target = "botlog.tail", missed, "output fell behind; lines skipped");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
        if !runtime.streaming() {
            while let Ok(ViewerSignal::Appended(items)) = appended.try_recv() {
                print_items(&mut out, &items, args.all)?;
            }
            info!(target = "botlog.tail", "stream ended");
            return Ok(());
        }
    }
}

fn print_items(out: &mut impl Write, items: &[LogItem], all: bool) -> io::Result<()> {
    for item in items {
        let skip = !all && item.as_entry().is_some_and(|entry| entry.kind.is_status());
        if !skip {
            writeln!(out, "{}", plain_line(item))?;
        }
    }
    out.flush()
}

async fn globe(base_url: &str, args: GlobeArgs) -> Result<(), CliError> {
    let client = HistoryClient::new(base_url)?;
    let feed = client.open(&args.stream)?;
    let mut guard = TerminalGuard::enter()?;
    globe_map::run(&mut guard, feed).await?;
    Ok(())
}

fn roster(args: RosterArgs) -> Result<(), CliError> {
    let raw = match fs::read_to_string(&args.file) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };
    let mut roster = Roster::from_json(&raw)?;
    for id in &args.remove {
        if roster.remove(id).is_none() {
            warn!(target = "botlog.roster", %id, "no such user");
        }
    }
    for user in args.add {
        roster.add(user);
    }
    if !args.dry_run {
        fs::write(&args.file, roster.to_json()?)?;
        info!(target = "botlog.roster", path = %args.file.display(), users = roster.users().len(), "roster saved");
    }
    println!("{}", roster.render_input());
    Ok(())
}

async fn subscribe(base_url: &str, args: SubscribeArgs) -> Result<(), CliError> {
    let client = HistoryClient::new(base_url)?;
    if client
        .subscribe_email(&args.form, &args.email, args.csrf.as_deref())
        .await?
    {
        println!("subscribed {}", args.email);
        Ok(())
    } else {
        Err(CliError::SubscribeRejected { email: args.email })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::model::fixtures::{message, status};
    use crate::model::EntryKind;

    #[test]
    fn full_screen_commands_log_to_a_file() {
        let config = AppConfig::default();
        let view = Cli::try_parse_from(["botlog", "view", "/rust/"]).expect("cli");
        assert_eq!(
            log_config(&view, &config).file,
            Some(std::env::temp_dir().join("botlog.log"))
        );

        let tail = Cli::try_parse_from(["botlog", "tail", "/rust/"]).expect("cli");
        assert_eq!(log_config(&tail, &config).file, None);

        let explicit = Cli::try_parse_from(["botlog", "--log-file", "/tmp/x.log", "view", "/rust/"]).expect("cli");
        assert_eq!(log_config(&explicit, &config).file, Some(PathBuf::from("/tmp/x.log")));
    }

    #[test]
    fn configured_zone_is_the_fallback() {
        let mut config = AppConfig::default();
        assert_eq!(viewer_zone(None, &config), ViewerZone::Local);
        config.client_timezone = Some("UTC".into());
        assert_eq!(viewer_zone(None, &config).name().as_deref(), Some("UTC"));
        config.client_timezone = Some("Mars/Olympus".into());
        assert_eq!(viewer_zone(None, &config), ViewerZone::Local);
        assert_eq!(viewer_zone(Some(ViewerZone::Local), &config), ViewerZone::Local);
    }

    #[test]
    fn tail_skips_status_lines_unless_asked() {
        let items = vec![
            message("ann", "2021-03-01T08:00:00+00:00"),
            status("bob", EntryKind::Join, "2021-03-01T08:01:00+00:00"),
        ];
        let mut out = Vec::new();
        print_items(&mut out, &items, false).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("<ann> hello"));

        let mut out = Vec::new();
        print_items(&mut out, &items, true).expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8").lines().count(), 2);
    }

    #[test]
    fn roster_command_edits_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("admins.json");
        fs::write(&file, r#"[{"id": 1, "email": "a@example.com"}, {"id": 2, "email": "b@example.com"}]"#)
            .expect("seed");

        let cli = Cli::try_parse_from([
            "botlog",
            "roster",
            file.to_str().expect("utf8 path"),
            "--remove",
            "1",
            "--add",
            "3:c@example.com",
        ])
        .expect("cli");
        let Command::Roster(args) = cli.command else {
            panic!("expected roster");
        };
        roster(args).expect("roster");

        let saved = Roster::from_json(&fs::read_to_string(&file).expect("read")).expect("parse");
        assert_eq!(saved.render_input(), "2,3");
    }
}
