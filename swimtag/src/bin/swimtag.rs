//! swimtag - finish-line timing with an R300/YRM200 RFID reader.
//!
//! Usage:
//!   swimtag race --host 192.168.0.178
//!   swimtag race --start-now --duration 3600 --output heat1
//!   swimtag monitor --duration 30
//!   swimtag monitor --replay capture.bin
//!   swimtag join --results resultados_nadadores.csv
//!   swimtag provision --distance 2K --category INF_A --gender F --count 10
//!   swimtag provision --auto 100 --distances 2K:40,3K:60

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swimtag::provision::{self, DistanceQuota, EpcFields, EpcGenerator, RaceConfig};
use swimtag::{report, roster, ArrivalRegister, ChecksumMode, FrameEvent, Reader, ReaderConfig, ReplayTransport};

#[derive(Parser, Debug)]
#[command(name = "swimtag")]
#[command(about = "Finish-line timing for swimming races with UHF RFID readers")]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Time a race: register arrivals until Ctrl+C, then save results
    Race(RaceArgs),

    /// Print every frame and tag the reader sends
    Monitor(MonitorArgs),

    /// Join a results CSV with the registration sheet
    Join(JoinArgs),

    /// Generate EPCs and the registration sheet
    Provision(ProvisionArgs),
}

#[derive(Args, Debug)]
struct ReaderArgs {
    /// JSON reader configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reader address (overrides config and SWIMTAG_READER_IP)
    #[arg(long)]
    host: Option<String>,

    /// Reader TCP port (overrides config and SWIMTAG_READER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Checksum mode (xor, sum, twos-complement)
    #[arg(long, value_parser = parse_checksum)]
    checksum: Option<ChecksumMode>,

    /// Read timeout (milliseconds)
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Offset subtracted from the raw RSSI byte
    #[arg(long, allow_hyphen_values = true)]
    rssi_offset: Option<i16>,

    /// Added to decoded antenna numbers (1 matches the port labels)
    #[arg(long)]
    antenna_base: Option<u8>,
}

#[derive(Args, Debug)]
struct RaceArgs {
    #[command(flatten)]
    reader: ReaderArgs,

    /// Set point zero as soon as reading starts
    #[arg(long, conflicts_with = "no_start")]
    start_now: bool,

    /// Never set point zero (arrival order only)
    #[arg(long)]
    no_start: bool,

    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Output base name for the CSV and JSON files
    #[arg(short, long, default_value = report::DEFAULT_RESULTS_BASE)]
    output: PathBuf,

    /// Registration sheet joined after the race when present
    #[arg(long, default_value = roster::DEFAULT_SHEET)]
    sheet: PathBuf,

    /// Optional swimmer name list
    #[arg(long, default_value = roster::DEFAULT_NAMES)]
    names: PathBuf,

    /// Joined output file
    #[arg(long, default_value = roster::DEFAULT_JOINED)]
    joined: PathBuf,

    /// Skip the roster join
    #[arg(long)]
    no_join: bool,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    #[command(flatten)]
    reader: ReaderArgs,

    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Decode a raw capture file instead of connecting
    #[arg(long)]
    replay: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct JoinArgs {
    /// Results CSV written by `race`
    #[arg(short, long, default_value = "resultados_nadadores.csv")]
    results: PathBuf,

    /// Registration sheet
    #[arg(long, default_value = roster::DEFAULT_SHEET)]
    sheet: PathBuf,

    /// Optional swimmer name list
    #[arg(long, default_value = roster::DEFAULT_NAMES)]
    names: PathBuf,

    /// Joined output file
    #[arg(short, long, default_value = roster::DEFAULT_JOINED)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ProvisionArgs {
    /// Event prefix; four leading digits set the year field
    #[arg(long, default_value = "2026")]
    event: String,

    /// Distance for a single group (1K, 2K, 3K, 5K)
    #[arg(long, required_unless_present = "auto")]
    distance: Option<provision::Distance>,

    /// Category code for a single group (INF_A ... MAS_D)
    #[arg(long, requires = "distance")]
    category: Option<String>,

    /// Gender for a single group (F or M)
    #[arg(long, requires = "distance")]
    gender: Option<provision::Gender>,

    /// Tags in a single group
    #[arg(long, default_value = "1")]
    count: u32,

    /// Spread this many tags over every category
    #[arg(long, conflicts_with_all = ["category", "gender"])]
    auto: Option<u32>,

    /// Per distance counts for --auto, e.g. 2K:40,3K:60
    #[arg(long, requires = "auto")]
    distances: Option<String>,

    /// Registration sheet output
    #[arg(long, default_value = provision::DEFAULT_CSV)]
    csv: PathBuf,

    /// JSON output
    #[arg(long, default_value = provision::DEFAULT_JSON)]
    json: PathBuf,

    /// Plain EPC list for the tag writer
    #[arg(long, default_value = provision::DEFAULT_WRITER_LIST)]
    writer_list: PathBuf,
}

fn parse_checksum(s: &str) -> Result<ChecksumMode, String> {
    [ChecksumMode::Xor, ChecksumMode::Sum, ChecksumMode::TwosComplement]
        .into_iter()
        .find(|mode| mode.name().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown checksum mode {:?} (xor, sum, twos-complement)", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Command::Race(args) => race(args).await,
        Command::Monitor(args) => monitor(args).await,
        Command::Join(args) => join(args),
        Command::Provision(args) => provision(args),
    }
}

fn reader_config(args: &ReaderArgs) -> anyhow::Result<ReaderConfig> {
    let mut config = match &args.config {
        Some(path) => ReaderConfig::load_file(path)?,
        None => ReaderConfig::default(),
    }
    .apply_env()?;

    if let Some(host) = &args.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(checksum) = args.checksum {
        config = config.with_checksum(checksum);
    }
    if let Some(ms) = args.read_timeout_ms {
        config = config.with_read_timeout(Duration::from_millis(ms));
    }
    if let Some(offset) = args.rssi_offset {
        config = config.with_rssi_offset(offset);
    }
    if let Some(base) = args.antenna_base {
        config = config.with_antenna_base(base);
    }

    config.validate()?;
    Ok(config)
}

/// Token cancelled on Ctrl+C
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping");
            trigger.cancel();
        }
    });
    cancel
}

fn with_duration(reader: Reader, seconds: u64) -> Reader {
    if seconds > 0 {
        reader.with_duration(Duration::from_secs(seconds))
    } else {
        reader
    }
}

async fn race(args: RaceArgs) -> anyhow::Result<()> {
    let config = reader_config(&args.reader)?;
    let mut reader = with_duration(Reader::new(&config), args.duration);

    reader
        .connect()
        .await
        .with_context(|| format!("cannot connect to reader at {}:{}", config.host, config.port))?;

    let register = ArrivalRegister::new();

    if args.start_now {
        register.establish_point_zero()?;
    } else if !args.no_start {
        // Plain thread: a blocked stdin read must not hold up runtime shutdown
        let register = register.clone();
        std::thread::spawn(move || {
            println!("Press Enter to start the race (point zero)...");
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line).is_ok() {
                if let Err(e) = register.establish_point_zero() {
                    warn!("Point zero not set: {}", e);
                }
            }
        });
    }

    info!("Registering arrivals. Press Ctrl+C to stop.");

    let (mut events, handle) = reader.spawn(ctrl_c_token());

    while let Some(event) = events.recv().await {
        for tag in event.events() {
            match register.register_arrival(tag) {
                Ok(Some(record)) => println!("{}", report::summary_line(&record)),
                Ok(None) => {}
                Err(e) => warn!("Arrival dropped: {}", e),
            }
        }
    }

    let stopped = handle.await.context("reader task failed")?;

    // Save whatever was registered, even when the link failed
    let result = register.finalize();
    let saved = report::save_results(&result, &args.output)?;
    println!("Results saved to {}", saved.csv.display());

    if !args.no_join && args.sheet.exists() {
        match roster::join_files(&args.sheet, Some(&args.names), &saved.csv, &args.joined) {
            Ok(_) => println!("Joined with roster -> {}", args.joined.display()),
            Err(e) => warn!("Roster join skipped: {}", e),
        }
    }

    println!("{}", report::session_summary(&result));

    let reason = stopped?;
    info!(?reason, "Race session closed");
    Ok(())
}

async fn monitor(args: MonitorArgs) -> anyhow::Result<()> {
    let config = reader_config(&args.reader)?;

    let reader = match &args.replay {
        Some(path) => Reader::with_transport(Box::new(ReplayTransport::from_file(path, 4096)?), &config),
        None => Reader::new(&config),
    };
    let mut reader = with_duration(reader, args.duration);

    reader
        .connect()
        .await
        .with_context(|| format!("cannot open {}", reader.remote_addr()))?;

    let mut tags = 0usize;
    let reason = reader
        .run(&ctrl_c_token(), |event| match event {
            FrameEvent::Tags { command, events, .. } => {
                if events.is_empty() {
                    println!("{} (no tags)", command);
                }
                for tag in &events {
                    tags += 1;
                    match EpcFields::parse(&tag.epc) {
                        Some(fields) => println!("{} [{}]", tag, fields),
                        None => println!("{}", tag),
                    }
                }
            }
            FrameEvent::Other(frame) => println!("{} {:02X?}", frame, &frame.data[..]),
        })
        .await?;

    let stats = reader.stats();
    println!(
        "Stopped ({:?}): {} frames, {} tags, {} bytes skipped, {} checksum failures",
        reason, stats.frames, tags, stats.skipped_bytes, stats.checksum_failures
    );
    Ok(())
}

fn join(args: JoinArgs) -> anyhow::Result<()> {
    let rows = roster::join_files(&args.sheet, Some(&args.names), &args.results, &args.output)
        .with_context(|| format!("cannot join {} with {}", args.results.display(), args.sheet.display()))?;
    println!("Joined {} arrivals -> {}", rows, args.output.display());
    Ok(())
}

fn provision(args: ProvisionArgs) -> anyhow::Result<()> {
    let races = match args.auto {
        Some(total) => {
            let quotas = match &args.distances {
                Some(list) => parse_quotas(list)?,
                None => match args.distance {
                    Some(distance) => vec![DistanceQuota::new(distance, total)],
                    None => bail!("--auto needs --distance or --distances"),
                },
            };
            provision::auto_distribution(total, &quotas)?
        }
        None => {
            let (Some(distance), Some(category), Some(gender)) = (args.distance, args.category, args.gender)
            else {
                bail!("--distance, --category and --gender are required without --auto");
            };
            vec![RaceConfig {
                distance,
                groups: vec![(category, gender, args.count)],
            }]
        }
    };

    let mut generator = EpcGenerator::new(args.event);
    generator.generate_batch(&races)?;
    generator.save(&args.csv, &args.json, &args.writer_list)?;

    print!("{}", generator.summary());
    println!(
        "Wrote {}, {} and {}",
        args.csv.display(),
        args.json.display(),
        args.writer_list.display()
    );
    Ok(())
}

/// Parse `2K:40,3K:60`
fn parse_quotas(list: &str) -> anyhow::Result<Vec<DistanceQuota>> {
    list.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (distance, count) = part
                .split_once(':')
                .with_context(|| format!("expected DISTANCE:COUNT, got {:?}", part))?;
            let count = count
                .trim()
                .parse()
                .with_context(|| format!("invalid count in {:?}", part))?;
            Ok(DistanceQuota::new(distance.parse()?, count))
        })
        .collect()
}
