//! Command-line front end: snapshot a page or run one action on it.

use anyhow::{Context, bail};
use browser_snapshot::actions::supported_methods;
use browser_snapshot::{ActOptions, Action, BrowserSession, ConnectionOptions, LaunchOptions, SettleConfig,
                       SnapshotOptions};
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "snapshot-cli")]
#[command(version)]
#[command(about = "Cross-frame page snapshots and element actions over CDP", long_about = None)]
struct Cli {
    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H', global = true)]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH", global = true)]
    executable_path: Option<String>,

    /// WebSocket endpoint URL of a running browser
    #[arg(long, value_name = "URL", global = true)]
    ws_endpoint: Option<String>,

    /// Persistent browser profile directory
    #[arg(long, value_name = "DIR", global = true)]
    user_data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the accessibility outline of a page, iframes included
    Snapshot {
        url: String,

        /// Scope the outline to the element this selector matches
        #[arg(long, value_name = "SELECTOR")]
        focus: Option<String>,

        /// Print the full snapshot (outline, xpath and url maps) as JSON
        #[arg(long)]
        json: bool,

        /// Snapshot budget in milliseconds
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,
    },

    /// Run one method on the element a selector matches
    Act {
        url: String,

        /// XPath (optionally xpath= prefixed) or CSS; `>>` enters an iframe
        selector: String,

        /// Method name, e.g. click, fill, press
        method: String,

        /// Method arguments
        args: Vec<String>,

        /// Skip waiting for network quiet before acting
        #[arg(long)]
        no_settle: bool,
    },

    /// List the supported action methods
    Methods,
}

fn open_session(cli: &Cli) -> anyhow::Result<BrowserSession> {
    if let Some(ref endpoint) = cli.ws_endpoint {
        log::info!("Connecting to {}", endpoint);
        return Ok(BrowserSession::connect(ConnectionOptions::new(endpoint.clone()))?);
    }

    let mut options = LaunchOptions::new().headless(!cli.headed);
    if let Some(ref path) = cli.executable_path {
        options = options.chrome_path(path);
    }
    if let Some(ref dir) = cli.user_data_dir {
        options = options.user_data_dir(dir);
    }
    BrowserSession::launch(options).context("Failed to launch browser")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Methods => {
            for method in supported_methods() {
                println!("{}", method);
            }
        }
        Command::Snapshot {
            url,
            focus,
            json,
            timeout_ms,
        } => {
            let session = open_session(&cli)?;
            session.navigate(url)?;

            let mut options = SnapshotOptions::new().timeout(Duration::from_millis(*timeout_ms));
            if let Some(selector) = focus {
                options = options.focus(selector.clone());
            }
            let snapshot = session.capture_snapshot(&options)?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("{}", snapshot.combined_tree);
            }
        }
        Command::Act {
            url,
            selector,
            method,
            args,
            no_settle,
        } => {
            let session = open_session(&cli)?;
            session.navigate(url)?;

            let action = Action::new(selector.clone(), method.clone()).with_arguments(args.iter().cloned());
            let mut options = ActOptions::new();
            if !no_settle {
                options = options.settle(SettleConfig::default());
            }

            let result = session.act(&action, &options, None)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                bail!("{}", result.message);
            }
        }
    }

    Ok(())
}
