use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use historian::data::{
    ActuatorData, ConnectionStateData, MessageData, SensorData, SystemPerformanceData,
};
use historian::{
    CacheEntry, DataEventListener, HistorianConfig, HistorianManager, LogStatusListener, Payload,
    PersistenceConnector, PersistenceDataType, PlaybackDirection, SerializerKind,
};

#[derive(Parser, Debug)]
#[command(name = "historian-cli", version, about = "Historian cache tooling")]
struct Cli {
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage root (must exist)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Product directory under the root
    #[arg(long)]
    product: Option<String>,

    /// Use the zstd binary encoding for cache files
    #[arg(long)]
    binary: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the file a cache name resolves to
    Resolve {
        name: String,
        #[arg(long, default_value = "historian")]
        data_type: String,
    },
    /// List stored caches
    List,
    /// Summarize a stored cache
    Inspect { name: String },
    /// Append JSON-lines payloads to a cache and store it
    Import {
        name: String,
        input: PathBuf,
    },
    /// Replay a stored cache to stdout, honouring recorded gaps
    Replay {
        name: String,
        #[arg(long, default_value_t = 1.0)]
        factor: f64,
        #[arg(long)]
        reverse: bool,
        #[arg(long = "loop")]
        loop_at_end: bool,
        #[arg(long)]
        limit: Option<usize>,
        /// Print events without sleeping between them
        #[arg(long)]
        no_wait: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let manager = HistorianManager::new(config).context("Failed to open historian storage")?;
    manager.set_status_listener(Some(Arc::new(LogStatusListener)));

    let mut out = io::BufWriter::new(io::stdout());
    match cli.command {
        Commands::Resolve { name, data_type } => cmd_resolve(&manager, &name, &data_type, &mut out)?,
        Commands::List => cmd_list(&manager, &mut out)?,
        Commands::Inspect { name } => cmd_inspect(&manager, &name, &mut out)?,
        Commands::Import { name, input } => cmd_import(&manager, &name, &input, &mut out)?,
        Commands::Replay {
            name,
            factor,
            reverse,
            loop_at_end,
            limit,
            no_wait,
        } => {
            let options = ReplayOptions {
                factor,
                reverse,
                loop_at_end,
                limit,
                wait: !no_wait,
            };
            cmd_replay(&manager, &name, &options)?;
        }
    }
    out.flush()?;
    manager.shutdown();
    Ok(())
}

fn build_config(cli: &Cli) -> Result<HistorianConfig> {
    let mut config = match &cli.config {
        Some(path) => HistorianConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => HistorianConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root_path = root.clone();
    }
    if let Some(product) = &cli.product {
        config.product_name = product.clone();
    }
    if cli.binary {
        config.serializer = SerializerKind::Binary;
    }
    Ok(config)
}

fn parse_data_type(value: &str) -> Result<PersistenceDataType> {
    Ok(match value.to_ascii_lowercase().as_str() {
        "iot" | "data" | "datastore" => PersistenceDataType::IotData,
        "historian" => PersistenceDataType::Historian,
        "prediction" => PersistenceDataType::Prediction,
        "text" => PersistenceDataType::Text,
        other => bail!("unknown data type {other:?} (historian, iot, prediction, text)"),
    })
}

fn cmd_resolve(
    manager: &HistorianManager,
    name: &str,
    data_type: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let data_type = parse_data_type(data_type)?;
    let connector = manager.connector().context("No persistence connector")?;
    let path = connector.resolve_storage_name(name, data_type)?;
    writeln!(out, "{}", path.display())?;
    Ok(())
}

fn cmd_list(manager: &HistorianManager, out: &mut dyn Write) -> Result<()> {
    for name in manager.loadable_cache_names()? {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

fn cmd_inspect(manager: &HistorianManager, name: &str, out: &mut dyn Write) -> Result<()> {
    let player = manager.get_or_create_player(name, true)?;
    let entries = player.entries();
    writeln!(out, "cache: {}", player.name())?;
    if let Some(path) = player.storage_file_name() {
        writeln!(out, "file: {}", path.display())?;
    }
    writeln!(out, "entries: {}", entries.len())?;
    writeln!(out, "approx bytes: {}", player.approx_memory_usage())?;
    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        writeln!(out, "first: {}", first.timestamp())?;
        writeln!(out, "last: {}", last.timestamp())?;
    }
    let mut counts = std::collections::BTreeMap::new();
    for entry in &entries {
        *counts.entry(entry.kind().as_str()).or_insert(0usize) += 1;
    }
    for (kind, count) in counts {
        writeln!(out, "  {kind}: {count}")?;
    }
    Ok(())
}

fn read_payloads(path: &Path) -> Result<Vec<CacheEntry>> {
    let file = fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut entries = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let payload: Payload = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid payload", path.display(), line_no + 1))?;
        entries.push(CacheEntry::new(payload));
    }
    Ok(entries)
}

fn cmd_import(
    manager: &HistorianManager,
    name: &str,
    input: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let entries = read_payloads(input)?;
    let imported = entries.len();
    let player = manager.get_or_create_player(name, true)?;
    player.add_entries(entries);
    player.store_cache().context("Failed to store cache")?;
    info!("imported {imported} entries into {}", player.name());
    writeln!(out, "{}: {} entries", player.name(), player.cache_size())?;
    Ok(())
}

struct ReplayOptions {
    factor: f64,
    reverse: bool,
    loop_at_end: bool,
    limit: Option<usize>,
    wait: bool,
}

/// Prints each replayed event as one JSON line.
#[derive(Default)]
struct PrintListener {
    emitted: Mutex<usize>,
}

impl PrintListener {
    fn print<T: serde::Serialize>(&self, kind: &str, data: &T) {
        let line = serde_json::to_string(data).unwrap_or_default();
        println!("{kind} {line}");
        if let Ok(mut emitted) = self.emitted.lock() {
            *emitted += 1;
        }
    }

    fn emitted(&self) -> usize {
        self.emitted.lock().map(|count| *count).unwrap_or(0)
    }
}

impl DataEventListener for PrintListener {
    fn on_actuator_data(&self, data: &ActuatorData) {
        self.print("actuator", data);
    }

    fn on_connection_state_data(&self, data: &ConnectionStateData) {
        self.print("connection", data);
    }

    fn on_message_data(&self, data: &MessageData) {
        self.print("message", data);
    }

    fn on_sensor_data(&self, data: &SensorData) {
        self.print("sensor", data);
    }

    fn on_system_performance_data(&self, data: &SystemPerformanceData) {
        self.print("performance", data);
    }
}

fn cmd_replay(manager: &HistorianManager, name: &str, options: &ReplayOptions) -> Result<()> {
    let player = manager.get_or_create_player(name, true)?;
    if player.cache_size() == 0 {
        bail!("cache {name} is empty or not stored");
    }
    if !player.set_playback_delay_factor(options.factor) {
        bail!("invalid delay factor {}", options.factor);
    }
    // Replay is driven from here; the cache must not refill from live events.
    player.enable_cache_filling(false);
    player.enable_threaded_playback(false);
    player.enable_loop_at_end(options.loop_at_end);
    if options.reverse {
        player.set_direction(PlaybackDirection::Reverse);
        player.set_starting_index(player.cache_size() - 1);
    }

    let printer = Arc::new(PrintListener::default());
    let listener: Arc<dyn DataEventListener> = printer.clone();
    player.set_event_listener(Some(listener));
    if !player.play() {
        bail!("cache {name} cannot be played");
    }

    let limit = options.limit.unwrap_or(usize::MAX);
    while printer.emitted() < limit && player.is_playing() {
        let before = printer.emitted();
        let delay_ms = player.trigger_next_event();
        if options.wait && delay_ms > 0 && printer.emitted() > before {
            thread::sleep(Duration::from_millis(delay_ms));
        }
    }
    player.stop();
    info!("replayed {} events from {}", printer.emitted(), player.name());
    Ok(())
}
