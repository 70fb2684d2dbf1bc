use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cdp_adapter::{CdpConfig, CdpPage, CdpTransport, ChromiumTransport, PagePort};
use clap::Args;
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tubepace_cli::{AppContext, LogNotifier, MenuSurface, RuntimeTuning, UpdateChecker};

use super::check_update::print_outcome;
use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct WatchArgs {
    /// DevTools websocket of an already running browser
    #[arg(long, value_name = "WS_URL")]
    pub ws_url: Option<String>,

    /// Page to open
    #[arg(long, default_value = "https://www.youtube.com/")]
    pub url: String,

    /// Print the status view at this interval (e.g. `30s`)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub status_interval: Option<Duration>,

    /// Launch the browser headless (also TUBEPACE_HEADLESS)
    #[arg(long)]
    pub headless: bool,

    /// Browser executable (also TUBEPACE_CHROME)
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Do not read commands from stdin
    #[arg(long)]
    pub no_console: bool,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Args, Clone, Debug, Default)]
pub struct TuningArgs {
    /// Debounce window for collapsing triggers
    #[arg(long, value_parser = humantime::parse_duration)]
    pub debounce: Option<Duration>,

    /// Lifetime of cached category checks
    #[arg(long, value_parser = humantime::parse_duration)]
    pub cache_ttl: Option<Duration>,

    /// Total locator attempts per full evaluation
    #[arg(long)]
    pub locator_attempts: Option<u32>,

    /// Linear backoff step between locator attempts
    #[arg(long, value_parser = humantime::parse_duration)]
    pub locator_step: Option<Duration>,

    /// Wait before verifying an applied rate
    #[arg(long, value_parser = humantime::parse_duration)]
    pub settle_delay: Option<Duration>,

    /// Location poll interval, `0s` disables polling
    #[arg(long, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// How often stored settings are re-read, `0s` disables it
    #[arg(long, value_parser = humantime::parse_duration)]
    pub settings_poll: Option<Duration>,
}

impl TuningArgs {
    pub fn resolve(&self) -> RuntimeTuning {
        let defaults = RuntimeTuning::default();
        RuntimeTuning {
            debounce: self.debounce.unwrap_or(defaults.debounce),
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            locator_attempts: self.locator_attempts.unwrap_or(defaults.locator_attempts),
            locator_step: self.locator_step.unwrap_or(defaults.locator_step),
            settle_delay: self.settle_delay.unwrap_or(defaults.settle_delay),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            settings_poll: self.settings_poll.unwrap_or(defaults.settings_poll),
            ..defaults
        }
    }
}

pub async fn cmd_watch(args: WatchArgs, ctx: &CliContext) -> Result<()> {
    let mut cdp = CdpConfig::default();
    cdp.websocket_url = args.ws_url.clone();
    if args.headless {
        cdp.headless = true;
    }
    if let Some(chrome) = args.chrome.clone() {
        cdp.executable = chrome;
    }

    let transport = ChromiumTransport::connect(&cdp)
        .await
        .context("Failed to reach the browser")?;
    let transport: Arc<dyn CdpTransport> = Arc::new(transport);
    let page = CdpPage::open(transport, &args.url)
        .await
        .with_context(|| format!("Failed to open {}", args.url))?;
    let page: Arc<dyn PagePort> = Arc::new(page);

    let checker = Arc::new(UpdateChecker::from_env(env!("CARGO_PKG_VERSION"))?);
    let app = AppContext::new(page, ctx.store(), args.tuning.resolve())
        .await
        .with_command_surface(Arc::new(MenuSurface::new()))
        .with_update_checker(Arc::clone(&checker), Arc::new(LogNotifier));
    app.start().await;
    info!(target: "tubepace", url = %args.url, "watching; press Ctrl-C to stop");

    let mut console = (!args.no_console).then(|| BufReader::new(stdin()).lines());
    if console.is_some() {
        info!(target: "tubepace", "type a command id, `status` or `reload`");
    }

    let mut ticker = args.status_interval.filter(|d| !d.is_zero()).map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = async {
                match ticker.as_mut() {
                    Some(ticker) => { ticker.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                emit(ctx.output(), &app.status(), |status| status.render_human())?;
            }
            line = next_line(&mut console) => match line {
                Ok(Some(line)) => run_console_line(&app, ctx, &checker, &line).await?,
                Ok(None) => console = None,
                Err(err) => {
                    warn!(target: "tubepace", %err, "stdin unreadable, console commands disabled");
                    console = None;
                }
            },
        }
    }

    app.shutdown().await;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleInput {
    Blank,
    Status,
    Reload,
    Invoke(String),
}

impl ConsoleInput {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "" => ConsoleInput::Blank,
            "status" => ConsoleInput::Status,
            "reload" => ConsoleInput::Reload,
            id => ConsoleInput::Invoke(id.to_string()),
        }
    }
}

async fn next_line(console: &mut Option<Lines<BufReader<Stdin>>>) -> std::io::Result<Option<String>> {
    match console {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

/// Bad input is reported and the session keeps running.
async fn run_console_line(
    app: &AppContext,
    ctx: &CliContext,
    checker: &UpdateChecker,
    line: &str,
) -> Result<()> {
    match ConsoleInput::parse(line) {
        ConsoleInput::Blank => {}
        ConsoleInput::Status => {
            emit(ctx.output(), &app.status(), |status| status.render_human())?;
        }
        ConsoleInput::Reload => match app.reload_settings().await {
            Ok(true) => println!("settings reloaded"),
            Ok(false) => println!("settings unchanged"),
            Err(err) => eprintln!("reload failed: {err}"),
        },
        ConsoleInput::Invoke(id) => match app.invoke_id(&id).await {
            Ok(Some(outcome)) => print_outcome(checker, &outcome),
            Ok(None) => println!("{id} applied, rate {}", app.settings().target_rate),
            Err(err) => eprintln!("{id}: {err}"),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_lines_map_to_actions() {
        assert_eq!(ConsoleInput::parse("   \n"), ConsoleInput::Blank);
        assert_eq!(ConsoleInput::parse("status\n"), ConsoleInput::Status);
        assert_eq!(ConsoleInput::parse(" reload"), ConsoleInput::Reload);
        assert_eq!(
            ConsoleInput::parse("rate:1.5\n"),
            ConsoleInput::Invoke("rate:1.5".into())
        );
    }

    #[test]
    fn settings_poll_flag_overrides_the_default() {
        let args = TuningArgs {
            settings_poll: Some(Duration::ZERO),
            ..TuningArgs::default()
        };
        let tuning = args.resolve();
        assert!(tuning.settings_poll.is_zero());
        assert_eq!(tuning.debounce, RuntimeTuning::default().debounce);
    }
}
