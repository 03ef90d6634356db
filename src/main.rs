use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config as Layers, Environment, File};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use wavenode_watch::data::{format_watts, swr_label};
use wavenode_watch::{
    ChannelIndex, FileStore, HoldPhase, HttpSource, MemoryStore, MeterView, Poller, PrefsStore,
};

#[derive(Parser, Debug)]
#[command(name = "wavenode-watch")]
#[command(about = "Poll a WaveNode status bridge and report power, SWR and hold state")]
struct Args {
    /// Bridge base URL (e.g. http://localhost:8787)
    #[arg(short, long)]
    url: Option<String>,

    /// Poll interval in milliseconds (minimum 100)
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Enable peak/average hold
    #[arg(long, conflicts_with = "no_hold")]
    hold: bool,

    /// Disable peak/average hold
    #[arg(long)]
    no_hold: bool,

    /// RF activity threshold in watts
    #[arg(short, long)]
    threshold: Option<f64>,

    /// SWR alarm limit (1.0 to 10.0)
    #[arg(long)]
    swr_limit: Option<f64>,

    /// Sense channel (1-4) gating hold activity and worst-SWR
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    sense: Option<u8>,

    /// Directory where preferences are persisted
    #[arg(short, long)]
    prefs_dir: Option<PathBuf>,

    /// Optional settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Poll once, print the view and exit
    #[arg(long)]
    once: bool,

    /// Print views as JSON
    #[arg(long)]
    json: bool,
}

/// Settings from the optional file and `WAVENODE_*` environment variables.
#[derive(Debug, Default, Deserialize)]
struct Settings {
    base_url: Option<String>,
    poll_ms: Option<u64>,
    hold_enabled: Option<bool>,
    rf_threshold_watts: Option<f64>,
    swr_limit: Option<f64>,
    sense: Option<u8>,
    prefs_dir: Option<PathBuf>,
}

impl Settings {
    fn load(path: Option<&PathBuf>) -> Result<Self> {
        let mut builder = Layers::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.as_path()));
        }
        builder
            .add_source(Environment::with_prefix("WAVENODE").try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Command-line flags take precedence over file and environment.
    fn merge(mut self, args: &Args) -> Self {
        if args.url.is_some() {
            self.base_url = args.url.clone();
        }
        if args.interval_ms.is_some() {
            self.poll_ms = args.interval_ms;
        }
        if args.hold {
            self.hold_enabled = Some(true);
        } else if args.no_hold {
            self.hold_enabled = Some(false);
        }
        if args.threshold.is_some() {
            self.rf_threshold_watts = args.threshold;
        }
        if args.swr_limit.is_some() {
            self.swr_limit = args.swr_limit;
        }
        if args.sense.is_some() {
            self.sense = args.sense;
        }
        if args.prefs_dir.is_some() {
            self.prefs_dir = args.prefs_dir.clone();
        }
        self
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wavenode_watch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_ref())?.merge(&args);
    debug!(?settings, "Resolved settings");

    let store: Arc<dyn PrefsStore> = match &settings.prefs_dir {
        Some(dir) => Arc::new(FileStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    };
    let source = Arc::new(HttpSource::builder().build()?);
    let mut poller = Poller::new(source, store);
    apply_settings(&mut poller, &settings)?;

    if args.once {
        let view = poller.poll_once().await;
        print_view(&view, args.json)?;
        return Ok(if view.connected {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    run_watch(&mut poller, args.json).await?;
    Ok(ExitCode::SUCCESS)
}

/// Push overrides through the poller so they are persisted like user actions.
fn apply_settings(poller: &mut Poller, settings: &Settings) -> Result<()> {
    if let Some(url) = &settings.base_url {
        poller.set_base_url(url)?;
    }
    if let Some(ms) = settings.poll_ms {
        poller.set_poll_interval(Duration::from_millis(ms))?;
    }
    if let Some(enabled) = settings.hold_enabled {
        poller.set_hold_enabled(enabled)?;
    }
    if let Some(watts) = settings.rf_threshold_watts {
        poller.set_threshold(watts)?;
    }
    if let Some(limit) = settings.swr_limit {
        poller.set_swr_limit(limit)?;
    }
    if let Some(sense) = settings.sense {
        poller.set_sense_channel(ChannelIndex::clamped(i64::from(sense) - 1))?;
    }
    Ok(())
}

async fn run_watch(poller: &mut Poller, json: bool) -> Result<()> {
    let mut views = poller.subscribe();
    // Skip the pre-start view
    views.poll();
    poller.start();

    loop {
        tokio::select! {
            view = views.changed() => {
                let Some(view) = view else { break };
                print_view(&view, json)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    poller.stop();
    Ok(())
}

fn print_view(view: &MeterView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(view)?);
        return Ok(());
    }
    println!("{}", summary_line(view));
    Ok(())
}

fn summary_line(view: &MeterView) -> String {
    let mut line = format!("[{}]", view.status.label());
    for channel in view.visible_channels() {
        line.push_str(&format!(
            " {}: {}/{} SWR {}{}",
            channel.name,
            watts(channel.avg_watts),
            watts(channel.peak_watts),
            channel.swr_label,
            hold_marker(channel.hold),
        ));
    }
    line.push_str(&format!(
        " | total {} | worst SWR {} {}",
        watts(view.totals.avg_watts),
        swr_label(view.worst_swr),
        view.worst_tone.symbol(),
    ));
    if let Some(error) = &view.error {
        line.push_str(&format!(" | {error}"));
    }
    line
}

fn watts(value: f64) -> String {
    format_watts((value >= 0.0).then_some(value))
}

fn hold_marker(phase: HoldPhase) -> &'static str {
    match phase {
        HoldPhase::Latched => " (held)",
        HoldPhase::Active => " (tx)",
        HoldPhase::Inactive => "",
    }
}
