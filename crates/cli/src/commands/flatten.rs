//! Panic flatten, one-shot or armed on a function key.
//!
//! `--watch` puts the terminal in raw mode and flattens every time the
//! hotkey is pressed. Ctrl+C, `q` or Esc leave the loop.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;
use tracing::{info, warn};

use stopguard_broker::BrokerGateway;
use stopguard_core::config_loader::DEFAULT_CONFIG_PATH;
use stopguard_manager::{flatten_all_options, FlattenReport};

/// Pause after submitting before reading order statuses.
const SETTLE: Duration = Duration::from_secs(1);

/// Hotkey presses this soon after a flatten are ignored.
const DEBOUNCE: Duration = Duration::from_secs(1);

const KEY_POLL: Duration = Duration::from_millis(50);

#[derive(Args, Debug)]
pub struct FlattenArgs {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Only flatten this account (defaults to the configured account, if any)
    #[arg(long)]
    pub account: Option<String>,

    /// Confirm a one-shot flatten
    #[arg(long)]
    pub yes: bool,

    /// Stay armed and flatten whenever the hotkey is pressed
    #[arg(long)]
    pub watch: bool,

    /// Function key that triggers the flatten (F1-F12)
    #[arg(long, default_value = "F9", value_parser = parse_function_key)]
    pub key: u8,
}

/// Parse `F9`, `f9` or `9` into a function key number.
fn parse_function_key(raw: &str) -> Result<u8, String> {
    let digits = raw.trim().trim_start_matches(['F', 'f']);
    match digits.parse::<u8>() {
        Ok(n @ 1..=12) => Ok(n),
        _ => Err(format!("expected a function key F1-F12, got {raw:?}")),
    }
}

pub async fn run(args: FlattenArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let account = args.account.or(config.account.account_id.clone());
    let gateway = super::connect(&config);

    let result = if args.watch {
        watch(&gateway, account.as_deref(), args.key).await
    } else if args.yes {
        flatten_once(&gateway, account.as_deref()).await.map(|_| ())
    } else {
        bail!("refusing to flatten without --yes (or use --watch to arm a hotkey)")
    };

    gateway
        .disconnect()
        .await
        .context("Failed to disconnect from gateway")?;
    info!("Disconnected");
    result
}

async fn flatten_once(
    gateway: &dyn BrokerGateway,
    account: Option<&str>,
) -> Result<FlattenReport> {
    let report = flatten_all_options(gateway, account, SETTLE).await?;
    if report.failures() > 0 {
        warn!(failed = report.failures(), "Some flatten orders were rejected");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hotkey {
    Flatten,
    Quit,
}

/// Restores cooked mode however the watch loop ends.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw terminal mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn classify(event: &Event, key: u8) -> Option<Hotkey> {
    let Event::Key(press) = event else {
        return None;
    };
    if press.kind != KeyEventKind::Press {
        return None;
    }
    match press.code {
        KeyCode::F(n) if n == key => Some(Hotkey::Flatten),
        KeyCode::Char('c') if press.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Hotkey::Quit)
        }
        KeyCode::Char('q') | KeyCode::Esc => Some(Hotkey::Quit),
        _ => None,
    }
}

/// Read key events on a blocking thread and forward the ones we care about.
fn spawn_key_reader(key: u8) -> mpsc::Receiver<Hotkey> {
    let (tx, rx) = mpsc::channel(8);
    tokio::task::spawn_blocking(move || loop {
        if tx.is_closed() {
            return;
        }
        match event::poll(KEY_POLL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(error = %e, "Terminal event poll failed");
                let _ = tx.blocking_send(Hotkey::Quit);
                return;
            }
        }
        let hotkey = match event::read() {
            Ok(event) => classify(&event, key),
            Err(e) => {
                warn!(error = %e, "Terminal event read failed");
                Some(Hotkey::Quit)
            }
        };
        if let Some(hotkey) = hotkey {
            if tx.blocking_send(hotkey).is_err() || hotkey == Hotkey::Quit {
                return;
            }
        }
    });
    rx
}

async fn watch(gateway: &dyn BrokerGateway, account: Option<&str>, key: u8) -> Result<()> {
    info!(hotkey = %format!("F{key}"), "Panic flattener ready");
    info!("Press Ctrl+C, q or Esc to exit");

    let _raw = RawModeGuard::enable()?;
    let mut keys = spawn_key_reader(key);
    let mut last_flatten: Option<Instant> = None;

    while let Some(hotkey) = keys.recv().await {
        match hotkey {
            Hotkey::Quit => break,
            Hotkey::Flatten => {
                if last_flatten.is_some_and(|at| at.elapsed() < DEBOUNCE) {
                    continue;
                }
                info!(hotkey = %format!("F{key}"), "Hotkey detected");
                if let Err(e) = flatten_once(gateway, account).await {
                    warn!("Flatten failed: {e:#}");
                }
                last_flatten = Some(Instant::now());
            }
        }
    }

    info!("Exiting panic flattener");
    Ok(())
}
