//! Privacy Origin CLI
//!
//! Inspect and maintain the locally aggregated browser activity.

use clap::{Parser, Subcommand};
use privacy_origin::{
    config::Config,
    core::{report::TipLevel, Histogram, TabSnapshot},
    engine::Engine,
    runtime::now_ms,
    store::{JsonFileStore, PersistQueue},
    transparency::create_shared_log_with_persistence,
    ClearScope, InboundMessage, TabId, OBSERVATION_NOTICE, VERSION,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "privacy-origin")]
#[command(version = VERSION)]
#[command(about = "Local view of what websites do while you browse", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a JSON-lines file of inbound messages through the aggregator
    Replay {
        /// File with one inbound message per line
        file: PathBuf,
    },

    /// Show the activity view for a tab
    Snapshot {
        #[arg(long)]
        tab: TabId,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the cross-site tracker report
    Report {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the network activity histogram for a tab
    Histogram {
        #[arg(long)]
        tab: TabId,
    },

    /// Remove stored events
    Clear {
        /// Only this tab
        #[arg(long, conflicts_with = "all")]
        tab: Option<TabId>,

        /// Every tab
        #[arg(long)]
        all: bool,

        /// Also reset the cross-site tracker statistics
        #[arg(long)]
        global_stats: bool,
    },

    /// Print a tab's counts until interrupted
    Watch {
        #[arg(long)]
        tab: TabId,

        /// Seconds between refreshes
        #[arg(long, default_value = "2")]
        interval: u64,
    },

    /// Show configuration
    Config,

    /// Display what the agent records
    Notice,

    /// Serve the local HTTP bridge
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, default_value = "8790")]
        port: u16,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config();

    match cli.command {
        Commands::Replay { file } => cmd_replay(&config, &file),
        Commands::Snapshot { tab, json } => cmd_snapshot(&config, tab, json),
        Commands::Report { json } => cmd_report(&config, json),
        Commands::Histogram { tab } => cmd_histogram(&config, tab),
        Commands::Clear {
            tab,
            all,
            global_stats,
        } => cmd_clear(&config, tab, all, global_stats),
        Commands::Watch { tab, interval } => cmd_watch(&config, tab, interval),
        Commands::Config => cmd_config(&config),
        Commands::Notice => println!("{OBSERVATION_NOTICE}"),
        #[cfg(feature = "server")]
        Commands::Serve { port } => cmd_serve(&config, port),
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    }
}

/// Build an engine restored from the persisted state.
fn open_engine(config: &Config) -> (Engine, JsonFileStore) {
    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let store = JsonFileStore::new(config.state_dir());
    engine.load_from(&store);
    (engine, store)
}

/// Write every changed key and wait for it to land.
fn persist(engine: &mut Engine, store: JsonFileStore) {
    let queue = match PersistQueue::spawn(Arc::new(store)) {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("Error starting writer: {e}");
            std::process::exit(1);
        }
    };
    queue.enqueue_all(engine.take_dirty());
    queue.shutdown();
}

fn cmd_replay(config: &Config, file: &Path) {
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let reader = match std::fs::File::open(file) {
        Ok(f) => std::io::BufReader::new(f),
        Err(e) => {
            eprintln!("Error opening {file:?}: {e}");
            std::process::exit(1);
        }
    };

    let transparency = create_shared_log_with_persistence(config.transparency_path());
    let (engine, store) = open_engine(config);
    let mut engine = engine.with_transparency(transparency.clone());

    let mut applied = 0usize;
    let mut skipped = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error reading {file:?}: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<InboundMessage>(&line) {
            Ok(message) => {
                if let InboundMessage::RawEvent(ref raw) = message {
                    // Fire timers that would have expired before this event.
                    engine.tick(raw.timestamp_ms);
                }
                engine.apply(message);
                applied += 1;
            }
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", line_no + 1, e);
                skipped += 1;
            }
        }
    }

    // The replay is over, so every pending debounce has run out.
    engine.tick(i64::MAX);
    persist(&mut engine, store);

    if let Err(e) = transparency.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!("Applied {applied} messages ({skipped} skipped)");
    println!();
    println!("{}", transparency.summary());
}

fn cmd_snapshot(config: &Config, tab: TabId, json: bool) {
    let (engine, _) = open_engine(config);
    let snapshot = engine.get_snapshot(tab, now_ms());

    if json {
        print_json(&snapshot);
    } else {
        print_snapshot(&snapshot);
    }
}

fn print_snapshot(snapshot: &TabSnapshot) {
    println!("Tab {}", snapshot.tab_id);
    println!("======");
    if let Some(ref site) = snapshot.current_site {
        println!("Site: {site}");
    }
    println!();

    let c = &snapshot.counts;
    let l = &snapshot.levels;
    println!("  Network requests:     {:>5}  ({} third-party) [{:?}]", c.network, c.third_party_requests, l.network);
    println!("  Cookies:              {:>5}  [{:?}]", c.cookies, l.cookies);
    println!("  Third-party cookies:  {:>5}  [{:?}]", c.third_party_cookies, l.third_party_cookies);
    println!("  Location requests:    {:>5}  [{:?}]", c.geolocation, l.geolocation);
    println!("  Form activity:        {:>5}  [{:?}]", c.forms, l.forms);
    println!("  Fingerprinting:       {:>5}  [{:?}]", c.fingerprinting, l.fingerprinting);
    println!();

    if !snapshot.known_trackers.is_empty() {
        let preview: Vec<&str> = snapshot
            .tracker_preview()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        println!(
            "Known trackers ({}): {}",
            snapshot.known_trackers.len(),
            preview.join(", ")
        );
        println!();
    }

    println!("Tips:");
    for tip in &snapshot.tips {
        let marker = match tip.level {
            TipLevel::Danger => "!!",
            TipLevel::Warning => "! ",
            TipLevel::Info => "i ",
            TipLevel::Success => "ok",
        };
        println!("  [{marker}] {}", tip.text);
    }

    if let Some(ref histogram) = snapshot.histogram {
        println!();
        print_histogram(histogram);
    }
}

fn cmd_report(config: &Config, json: bool) {
    let (engine, _) = open_engine(config);
    let report = engine.get_global_report();

    if json {
        print_json(&report);
        return;
    }

    println!("Tracker Report");
    println!("==============");
    println!();
    println!("Tracker domains:       {}", report.total_tracker_domains);
    println!("Sites observed:        {}", report.total_sites);
    println!("Sites with trackers:   {}%", report.percent_sites_with_trackers);
    if let Some(ref top) = report.top_tracker {
        println!("Most widespread:       {} ({} sites)", top.domain, top.sites);
    }
    println!();

    if report.ranked.is_empty() {
        println!("No trackers recorded yet.");
        return;
    }
    println!("{:<40} {:>6} {:>8}", "Domain", "Sites", "Contacts");
    for tracker in &report.ranked {
        println!("{:<40} {:>6} {:>8}", tracker.domain, tracker.sites, tracker.count);
    }
}

fn cmd_histogram(config: &Config, tab: TabId) {
    let (engine, _) = open_engine(config);
    match engine.get_histogram(tab, now_ms()) {
        Some(histogram) => print_histogram(&histogram),
        None => println!("No histogram available for tab {tab}."),
    }
}

fn print_histogram(histogram: &Histogram) {
    const BAR_WIDTH: u64 = 40;
    let max = histogram.max().max(1);

    println!("Network activity");
    for (label, count) in histogram.labels.iter().zip(&histogram.buckets) {
        let bar = "#".repeat((count * BAR_WIDTH / max) as usize);
        println!("  {label:>6} | {bar} {count}");
    }
    println!(
        "  total {}, average {:.1} {}",
        histogram.total(),
        histogram.average_per_bucket(),
        histogram.unit()
    );
}

fn cmd_clear(config: &Config, tab: Option<TabId>, all: bool, global_stats: bool) {
    let scope = match (tab, all) {
        (Some(tab), false) => Some(ClearScope::Tab(tab)),
        (None, true) => Some(ClearScope::All),
        _ => None,
    };
    if scope.is_none() && !global_stats {
        eprintln!("Error: Specify --tab <id>, --all, or --global-stats");
        std::process::exit(1);
    }

    let (mut engine, store) = open_engine(config);
    if let Some(scope) = scope {
        let removed = engine.notify_clear_request(scope);
        println!("Removed {removed} entries.");
    }
    if global_stats {
        engine.reset_global_stats();
        println!("Tracker statistics reset.");
    }
    persist(&mut engine, store);
}

fn cmd_watch(config: &Config, tab: TabId, interval: u64) {
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    println!("Watching tab {tab} (Ctrl+C to stop)");
    let interval = Duration::from_secs(interval.max(1));

    while running.load(Ordering::SeqCst) {
        let (engine, _) = open_engine(config);
        let snapshot = engine.get_snapshot(tab, now_ms());
        let c = &snapshot.counts;
        println!(
            "[{}] requests {} ({} 3p) | cookies {} ({} 3p) | location {} | forms {} | fingerprinting {}",
            chrono::Local::now().format("%H:%M:%S"),
            c.network,
            c.third_party_requests,
            c.cookies,
            c.third_party_cookies,
            c.geolocation,
            c.forms,
            c.fingerprinting
        );

        // Sleep in short steps so Ctrl+C is handled promptly.
        let mut waited = Duration::ZERO;
        while waited < interval && running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            waited += Duration::from_millis(100);
        }
    }
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    print_json(config);
}

#[cfg(feature = "server")]
fn cmd_serve(config: &Config, port: u16) {
    use privacy_origin::runtime::{AggregatorHandle, RuntimeConfig};
    use privacy_origin::server::{run, ServerConfig};

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let transparency = create_shared_log_with_persistence(config.transparency_path());
    let (engine, store) = open_engine(config);
    let engine = engine.with_transparency(transparency.clone());

    let result = (|| -> anyhow::Result<()> {
        let persist = PersistQueue::spawn(Arc::new(store))?;
        let aggregator = Arc::new(AggregatorHandle::spawn(
            engine,
            RuntimeConfig::from(config),
            Some(persist),
        )?);

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let (addr, shutdown_tx) = run(ServerConfig::new(port), aggregator).await?;
            println!("Listening on http://{addr} (Ctrl+C to stop)");
            tokio::signal::ctrl_c().await?;
            let _ = shutdown_tx.send(());
            anyhow::Ok(())
        })
    })();

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = transparency.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
