//! mtastat - sendmail statistics in MTA-MIB table form.
//!
//! Reads the sendmail configuration, statistics file and mail queue, then
//! walks the MTA summary table and the per-mailer table and prints every row.
//! With `--interval` the walk repeats, honouring the module's cache TTLs.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use mtastat_core::collector::{RealFs, SystemClock};
use mtastat_core::config::parse_directive_lines;
use mtastat_core::models::StatLayout;
use mtastat_core::table::{Row, TableId};
use mtastat_core::MtaContext;

/// sendmail statistics in MTA-MIB table form.
#[derive(Parser)]
#[command(name = "mtastat", about = "sendmail statistics in MTA-MIB table form", version)]
struct Args {
    /// File of `key value` directive lines (e.g. `sendmail_config /etc/mail/sendmail.cf`).
    #[arg(short, long, value_name = "FILE")]
    conf: Option<PathBuf>,

    /// sendmail configuration file.
    #[arg(long, value_name = "FILE")]
    sendmail_cf: Option<String>,

    /// sendmail statistics file. Overrides the one named in sendmail.cf.
    #[arg(long, value_name = "FILE")]
    stats: Option<String>,

    /// Mail queue directory. Overrides the one named in sendmail.cf.
    #[arg(long, value_name = "DIR")]
    queue: Option<String>,

    /// Table index (first component of every row key).
    #[arg(long)]
    index: Option<String>,

    /// Seconds to cache the statistics file.
    #[arg(long)]
    stats_ttl: Option<String>,

    /// Seconds to cache the queue scan.
    #[arg(long)]
    queue_ttl: Option<String>,

    /// Width of `long` in the statistics file (4 or 8). Defaults to this platform's.
    #[arg(long)]
    word_size: Option<String>,

    /// Do not look for sendmail files in their standard locations.
    #[arg(long)]
    no_defaults: bool,

    /// Print rows as JSON.
    #[arg(long)]
    json: bool,

    /// Repeat every SECS seconds until interrupted.
    #[arg(short, long, value_name = "SECS")]
    interval: Option<u64>,

    /// Stop after N walks (with --interval).
    #[arg(short = 'n', long, value_name = "N")]
    count: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["mtastat", "mtastat_core"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Directives given as flags, in the order they are applied.
///
/// Settings that affect opening come first; explicit paths come after the
/// configuration file so they override what it names.
fn flag_directives(args: &Args) -> Vec<(&'static str, &str)> {
    [
        ("table_index", &args.index),
        ("stats_ttl_seconds", &args.stats_ttl),
        ("queue_ttl_seconds", &args.queue_ttl),
        ("stats_word_size", &args.word_size),
        ("config_path", &args.sendmail_cf),
        ("stats_path", &args.stats),
        ("queue_path", &args.queue),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
    .collect()
}

fn configure(ctx: &mut MtaContext<RealFs>, args: &Args) -> Result<(), String> {
    if let Some(ref conf) = args.conf {
        let content = std::fs::read_to_string(conf)
            .map_err(|e| format!("could not read {}: {}", conf.display(), e))?;
        for line in parse_directive_lines(&content) {
            if let Err(e) = ctx.apply_directive(&line.key, &line.value) {
                warn!("{}:{}: {}", conf.display(), line.line, e);
            }
        }
    }

    for (key, value) in flag_directives(args) {
        if let Err(e) = ctx.apply_directive(key, value) {
            warn!("--{}: {}", key, e);
        }
    }

    if !args.no_defaults {
        ctx.init_defaults();
    }
    Ok(())
}

fn fmt_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ts.to_string())
}

/// One walk of both tables.
#[derive(Serialize)]
struct Report {
    captured_at: String,
    layout: Option<StatLayout>,
    stats_initialized: Option<String>,
    summary: Vec<Row>,
    channels: Vec<Row>,
}

fn collect_report(ctx: &mut MtaContext<RealFs>) -> Report {
    let stats_initialized = ctx.statistics().map(|s| fmt_ts(s.init_time));
    Report {
        captured_at: fmt_ts(Utc::now().timestamp()),
        layout: ctx.stats_layout(),
        stats_initialized,
        summary: ctx.walk(TableId::Summary),
        channels: ctx.walk(TableId::Channel),
    }
}

fn print_text(report: &Report) {
    let layout = report.layout.map(|l| l.describe()).unwrap_or("unavailable");
    println!("# {}  statistics: {}", report.captured_at, layout);
    if let Some(ref since) = report.stats_initialized {
        println!("# counting since {}", since);
    }
    for (table, rows) in [
        (TableId::Summary, &report.summary),
        (TableId::Channel, &report.channels),
    ] {
        println!("{}", table.name());
        for row in rows {
            for field in &row.fields {
                println!("  {}.{} = {}", field.column.name(), row.key, field.value);
            }
        }
    }
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("failed to serialize report: {}", e),
        }
    } else {
        print_text(report);
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("mtastat {} starting", env!("CARGO_PKG_VERSION"));

    let mut ctx = MtaContext::new(RealFs::new(), SystemClock);
    if let Err(e) = configure(&mut ctx, &args) {
        error!("{}", e);
        std::process::exit(1);
    }

    info!(
        "Config: index={}, stats_ttl={}s, queue_ttl={}s, {} mailers",
        ctx.config().table_index,
        ctx.config().stats_ttl,
        ctx.config().queue_ttl,
        ctx.channels().len()
    );
    if ctx.stats_layout().is_none() && ctx.queue_dir().is_none() {
        warn!("neither a statistics file nor a queue directory is available");
    }

    let Some(secs) = args.interval else {
        print_report(&collect_report(&mut ctx), args.json);
        return;
    };

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let interval = Duration::from_secs(secs.max(1));
    let tick = Duration::from_millis(100);
    let mut walks: u64 = 0;

    while running.load(Ordering::SeqCst) {
        print_report(&collect_report(&mut ctx), args.json);
        walks += 1;
        if args.count.is_some_and(|n| walks >= n) {
            break;
        }

        let mut waited = Duration::ZERO;
        while waited < interval && running.load(Ordering::SeqCst) {
            std::thread::sleep(tick);
            waited += tick;
        }
    }

    debug!("stopped after {} walks", walks);
}
