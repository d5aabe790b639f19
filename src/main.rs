//! Wildwatch Agent CLI
//!
//! Camera-side detection logging.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wildwatch_agent::{
    collector::{create_live_feed, DirectorySource, FrameSource},
    config::Config,
    core::{
        analysis::{analyze, descriptions_on},
        create_shared_tracker, DescriptionPolicy, KeywordExtractor,
    },
    inference::InferenceService,
    pipeline::{Pipeline, PipelineConfig, PipelineControl},
    recorder::MjpegFileSink,
    stats::create_shared_stats_with_persistence,
    store::{JsonlLogStore, LogRecord, LogStore, RecordMapper, SharedLogStore},
    VERSION,
};

#[derive(Parser)]
#[command(name = "wildwatch")]
#[command(version = VERSION)]
#[command(about = "Camera-side detection logging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start watching the camera
    Start {
        /// Directory of JPEG frames to use as the camera
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Replay the source directory forever
        #[arg(long)]
        loop_source: bool,

        /// Detection keywords, comma separated (e.g. person,people)
        #[arg(long)]
        keywords: Option<String>,

        /// Description kept for an open interval (keep-first or keep-latest)
        #[arg(long)]
        policy: Option<String>,

        /// Serve the live feed and logs over HTTP (requires server feature)
        #[arg(long)]
        serve: bool,

        /// HTTP port (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Do not record footage of detections
        #[arg(long)]
        no_footage: bool,
    },

    /// Pause detection on a running agent
    Pause,

    /// Resume detection on a running agent
    Resume,

    /// Show current agent status
    Status,

    /// Print the detection log
    Logs {
        /// Only show detections on this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize detections per day and by duration
    Analysis {
        /// Also list descriptions recorded on this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            source_dir,
            loop_source,
            keywords,
            policy,
            serve,
            port,
            no_footage,
        } => {
            cmd_start(StartArgs {
                source_dir,
                loop_source,
                keywords,
                policy,
                serve,
                port,
                no_footage,
            });
        }
        Commands::Pause => {
            cmd_pause();
        }
        Commands::Resume => {
            cmd_resume();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Logs { date, json } => {
            cmd_logs(date.as_deref(), json);
        }
        Commands::Analysis { date } => {
            cmd_analysis(date.as_deref());
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

struct StartArgs {
    source_dir: Option<PathBuf>,
    loop_source: bool,
    keywords: Option<String>,
    policy: Option<String>,
    serve: bool,
    port: Option<u16>,
    no_footage: bool,
}

fn cmd_start(args: StartArgs) {
    println!("Wildwatch Agent v{VERSION}");
    println!();

    // Load configuration and apply command line overrides
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    if let Some(dir) = args.source_dir {
        config.source_dir = Some(dir);
    }
    if args.loop_source {
        config.loop_source = true;
    }
    if let Some(ref keywords) = args.keywords {
        config.keywords = KeywordExtractor::from_csv(keywords).keywords().to_vec();
    }
    if let Some(ref policy) = args.policy {
        match DescriptionPolicy::parse(policy) {
            Some(policy) => config.description_policy = policy,
            None => {
                eprintln!("Error: Unknown description policy {policy:?} (use keep-first or keep-latest)");
                std::process::exit(1);
            }
        }
    }
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if args.no_footage {
        config.record_footage = false;
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    let tz = match config.tz() {
        Ok(tz) => tz,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let source: Box<dyn FrameSource> = match config.source_dir {
        Some(ref dir) => match DirectorySource::open(dir, config.loop_source) {
            Ok(source) => {
                println!("  Source: {:?} ({} frames)", dir, source.file_count());
                Box::new(source)
            }
            Err(e) => {
                eprintln!("Error opening frame source: {e}");
                std::process::exit(1);
            }
        },
        None => {
            eprintln!("Error: No frame source configured.");
            eprintln!("Pass --source-dir <DIR> or set source_dir in {:?}", Config::config_path());
            std::process::exit(1);
        }
    };

    let store: SharedLogStore = match JsonlLogStore::open(config.log_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error opening detection log: {e}");
            std::process::exit(1);
        }
    };
    if let Ok(open) = store.open_records() {
        if !open.is_empty() {
            tracing::warn!(
                "{} detection(s) from a previous run were never closed",
                open.len()
            );
        }
    }

    let inference = create_inference(&config);

    println!("  Keywords: {}", config.keywords.join(", "));
    println!("  Description policy: {}", config.description_policy);
    println!("  Timezone: {}", config.timezone);
    println!("  Detection log: {:?}", config.log_path());
    println!(
        "  Footage: {}",
        if config.record_footage {
            format!("{:?}", config.footage_path)
        } else {
            "disabled".to_string()
        }
    );

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let tracker = create_shared_tracker(config.description_policy);
    let live = create_live_feed();
    let mapper = RecordMapper::for_local_station(tz);
    println!("  Station: {}", mapper.station());

    let mut pipeline = Pipeline::new(
        PipelineConfig::from(&config),
        tracker.clone(),
        Box::new(KeywordExtractor::new(config.keywords.clone())),
        inference,
        store.clone(),
        mapper,
    )
    .with_stats(stats.clone())
    .with_live_feed(live.clone());

    if config.record_footage {
        pipeline = pipeline.with_video_sink(Box::new(MjpegFileSink::new(&config.footage_path, tz)));
    }

    // Set up Ctrl+C handler
    let control = PipelineControl::new();
    control.set_paused(config.paused);
    ctrlc_handler(control.clone());

    // Optional HTTP server on its own runtime
    #[cfg(feature = "server")]
    let server = if args.serve {
        use wildwatch_agent::server::{AppState, ServerConfig};

        let state = AppState::new(tracker.clone(), store.clone(), stats.clone(), live.clone())
            .with_control(control.clone());
        let state = if config.record_footage {
            state.with_footage_dir(&config.footage_path)
        } else {
            state
        };

        match start_server(ServerConfig::new(config.server_port), state) {
            Ok((runtime, addr, shutdown)) => {
                println!("  Live feed: http://{addr}/video_feed");
                Some((runtime, shutdown))
            }
            Err(e) => {
                eprintln!("Warning: Could not start server: {e}");
                None
            }
        }
    } else {
        None
    };

    #[cfg(not(feature = "server"))]
    if args.serve {
        eprintln!("Warning: --serve flag ignored (server feature not enabled at compile time)");
    }

    println!();
    if config.paused {
        println!("Detection is currently paused.");
        println!("Run `wildwatch resume` to start detecting.");
        println!();
    }
    println!("Press Ctrl+C to stop");
    println!();

    // Support pause/resume from another process by polling the config file.
    let poller = spawn_config_poller(control.clone());

    if let Err(e) = pipeline.run(source, &control) {
        eprintln!("Error: {e}");
    }
    control.stop();
    let _ = poller.join();

    #[cfg(feature = "server")]
    if let Some((runtime, shutdown)) = server {
        let _ = shutdown.send(());
        runtime.shutdown_timeout(Duration::from_secs(2));
    }

    // Save run statistics
    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save statistics: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

#[cfg(feature = "server")]
type ServerHandle = (
    tokio::runtime::Runtime,
    std::net::SocketAddr,
    tokio::sync::oneshot::Sender<()>,
);

/// Start the HTTP server on a dedicated runtime.
#[cfg(feature = "server")]
fn start_server(
    config: wildwatch_agent::server::ServerConfig,
    state: wildwatch_agent::server::AppState,
) -> anyhow::Result<ServerHandle> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let (addr, shutdown) = runtime.block_on(wildwatch_agent::server::run(config, state))?;
    Ok((runtime, addr, shutdown))
}

/// Select the inference backend compiled into this binary.
fn create_inference(config: &Config) -> Box<dyn InferenceService> {
    #[cfg(feature = "ollama")]
    {
        use wildwatch_agent::inference::BlockingOllamaClient;

        match BlockingOllamaClient::new(config.inference.clone()) {
            Ok(client) => {
                println!(
                    "  Inference: {} at {}",
                    config.inference.model, config.inference.base_url
                );
                Box::new(client)
            }
            Err(e) => {
                eprintln!("Error: Could not create inference client: {e}");
                std::process::exit(1);
            }
        }
    }

    #[cfg(not(feature = "ollama"))]
    {
        let _ = config;
        eprintln!("Warning: ollama feature not enabled at compile time; nothing will be detected");
        Box::new(wildwatch_agent::inference::FixedInference::new("no inference backend"))
    }
}

/// Mirror the config file's `paused` flag into `control` once a second.
fn spawn_config_poller(control: PipelineControl) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_check = std::time::Instant::now();
        while control.is_running() {
            thread::sleep(Duration::from_millis(100));
            if last_check.elapsed() < Duration::from_secs(1) {
                continue;
            }
            last_check = std::time::Instant::now();

            if let Ok(cfg) = Config::load() {
                if cfg.paused != control.is_paused() {
                    if cfg.paused {
                        println!();
                        println!("Pausing detection...");
                    } else {
                        println!();
                        println!("Resuming detection...");
                    }
                    control.set_paused(cfg.paused);
                }
            }
        }
    })
}

fn cmd_pause() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Detection paused. Use 'wildwatch resume' to continue.");
}

fn cmd_resume() {
    let mut config = Config::load().unwrap_or_default();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Detection resumed.");
}

fn open_store(config: &Config) -> JsonlLogStore {
    match JsonlLogStore::open(config.log_path()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening detection log {:?}: {e}", config.log_path());
            std::process::exit(1);
        }
    }
}

fn load_records(config: &Config, date: Option<&str>) -> Vec<LogRecord> {
    let store = open_store(config);
    let result = match date {
        Some(raw) => match chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => store.by_date(date),
            Err(_) => {
                eprintln!("Error: Invalid date {raw:?}, expected YYYY-MM-DD");
                std::process::exit(1);
            }
        },
        None => store.all(),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error reading detection log: {e}");
        std::process::exit(1);
    })
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Wildwatch Agent Status");
    println!("======================");
    println!();

    // Show config
    println!("Configuration:");
    println!(
        "  Source: {}",
        config
            .source_dir
            .as_ref()
            .map(|d| format!("{d:?}"))
            .unwrap_or_else(|| "not configured".to_string())
    );
    println!("  Keywords: {}", config.keywords.join(", "));
    println!("  Description policy: {}", config.description_policy);
    println!("  Model: {}", config.inference.model);
    println!("  Paused: {}", config.paused);
    println!();

    // Open detections in the log
    if config.log_path().exists() {
        let records = load_records(&config, None);
        let open = records.iter().filter(|r| r.is_open()).count();
        println!("Detection log: {} record(s), {} open", records.len(), open);
        println!();
    }

    // Load and show run stats if available
    let stats_path = config.stats_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for (key, label) in [
                    ("frames_captured", "Frames captured"),
                    ("frames_dropped", "Frames dropped"),
                    ("frames_classified", "Frames classified"),
                    ("inference_failures", "Inference failures"),
                    ("intervals_opened", "Intervals opened"),
                    ("intervals_closed", "Intervals closed"),
                    ("persistence_failures", "Store write failures"),
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {label}: {value}");
                    }
                }
            }
        }
    } else {
        println!("No previous run data found.");
    }
}

fn cmd_logs(date: Option<&str>, json: bool) {
    let config = Config::load().unwrap_or_default();
    let records = load_records(&config, date);

    if json {
        match serde_json::to_string_pretty(&records) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("Error serializing: {e}"),
        }
        return;
    }

    if records.is_empty() {
        println!("No detections found.");
        return;
    }

    println!("{:<12} {:<10} {:<10} Description", "Date", "Detected", "Closed");
    for record in &records {
        println!(
            "{:<12} {:<10} {:<10} {}",
            record.date.to_string(),
            record.detection_time,
            record.close_time.as_deref().unwrap_or("open"),
            record.description
        );
    }
}

fn cmd_analysis(date: Option<&str>) {
    let config = Config::load().unwrap_or_default();
    let records = load_records(&config, None);
    let report = analyze(&records);

    println!("Detection Analysis");
    println!("==================");
    println!();

    if report.per_day.is_empty() {
        println!("No detections recorded yet.");
        return;
    }

    println!("Detections per day:");
    for day in &report.per_day {
        println!("  {}: {}", day.date, day.detections);
    }
    println!();

    match report.durations {
        Some(ref d) => {
            println!("Durations ({} closed):", d.intervals);
            println!("  Total: {:.1}s", d.total_secs);
            println!("  Mean: {:.1}s", d.mean_secs);
            println!("  Median: {:.1}s", d.median_secs);
            println!("  Longest: {:.1}s", d.max_secs);
        }
        None => println!("No closed detections yet."),
    }
    if report.open_intervals > 0 {
        println!("  Still open: {}", report.open_intervals);
    }

    if let Some(raw) = date {
        let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") else {
            eprintln!("Error: Invalid date {raw:?}, expected YYYY-MM-DD");
            std::process::exit(1);
        };
        println!();
        println!("Descriptions on {date}:");
        for description in descriptions_on(&records, date) {
            println!("  - {description}");
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(control: PipelineControl) {
    if let Err(e) = ctrlc::set_handler(move || {
        control.stop();
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
