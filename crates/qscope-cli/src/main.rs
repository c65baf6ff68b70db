// crates/qscope-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use qscope_core::{
    io::{read_archive_auto, write_archive_auto},
    WindowConfig,
};
use qscope_truth::TruthStream;
use qscope_window::{decode_monitor_dir, Coverage, TimeWindowDecoder, DEFAULT_TOLERANCE};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "qscope-cli",
    about = "qscope reference CLI",
    long_about = "qscope reference CLI.\n\nDecode time-window register snapshots, run interval queries, \
inspect ground-truth tap logs, and compare the engine against reference sketches.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

/// Data-plane tunables; must match the run that produced the snapshots.
#[derive(Args, Debug, Clone, Copy)]
struct Tunables {
    /// Compression factor alpha (>0)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    alpha: u32,

    /// log2 cells per window, k (>0)
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    index_bits: u32,

    /// Window count T (>0)
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    windows: u32,

    /// Trimmed bits of window 0, TB0
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..32))]
    trim_bits: u32,

    /// Per-cycle cell-write probability of window 0, z in (0,1]
    #[arg(long, default_value_t = 1.0)]
    cell_prob: f64,
}

impl Tunables {
    fn build(self) -> Result<WindowConfig> {
        WindowConfig::new(
            self.alpha,
            self.index_bits,
            self.windows,
            self.trim_bits,
            self.cell_prob,
        )
        .context("rejected tunables")
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Decode a snapshot directory into live sets; optionally correlate
    /// signals and persist the sets as an archive (.json/.cbor).
    Decode {
        /// Directory of <sec>_<usec>.bin snapshot files
        #[arg(long)]
        data: PathBuf,

        /// Directory of signal files to correlate
        #[arg(long)]
        signals: Option<PathBuf>,

        /// Signal match tolerance in trimmed ticks
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: u32,

        /// Output path for the decoded-set archive (.json/.cbor)
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        tunables: Tunables,
    },

    /// Run an interval query against a decoded-set archive
    Query {
        /// Input archive (.json/.cbor)
        #[arg(long)]
        archive: PathBuf,

        /// Interval start, ns on the reconstructed timeline
        #[arg(long)]
        start: u64,

        /// Interval end, ns on the reconstructed timeline
        #[arg(long)]
        end: u64,

        /// Print at most this many flows (0 = all)
        #[arg(long, default_value_t = 20)]
        top: usize,
    },

    /// Top flows of the ground-truth tap by enqueue time
    TruthTop {
        /// Directory of ground-truth files
        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        start: u64,

        #[arg(long)]
        end: u64,

        /// Top-K (0 = all)
        #[arg(long, default_value_t = 10)]
        k: usize,
    },

    /// Top flows of the ground-truth tap by dequeue time
    TruthRetrieve {
        /// Directory of ground-truth files
        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        start: u64,

        #[arg(long)]
        end: u64,

        /// Top-K (0 = all)
        #[arg(long, default_value_t = 10)]
        k: usize,
    },

    /// Switch-order packet trace of the ground-truth tap
    Traces {
        /// Directory of ground-truth files
        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        start: u64,

        #[arg(long)]
        end: u64,
    },

    /// Decode queue-monitor dumps into verified queue stacks
    Monitor {
        /// Directory of <sec>_<usec>_<wrap_flag>.bin dumps
        #[arg(long)]
        data: PathBuf,

        /// Stack slots per dump
        #[arg(long, default_value_t = 25_000)]
        max_qdepth: usize,
    },

    /// Compare the engine against the reference sketches per depth band
    Compare {
        /// Directory of snapshot files
        #[arg(long)]
        data: PathBuf,

        /// Directory of ground-truth files
        #[arg(long)]
        truth: PathBuf,

        /// Output directory for per-band CSV files
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Depth-band thresholds, ascending
        #[arg(long, value_delimiter = ',', default_value = "1000,2000,5000,10000,15000,20000")]
        thresholds: Vec<u32>,

        /// Samples per band
        #[arg(long, default_value_t = 20)]
        samples: usize,

        /// Sampling seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[command(flatten)]
        tunables: Tunables,
    },

    /// Per-signal precision/recall of the engine against ground truth
    SignalAccuracy {
        /// Directory of snapshot files
        #[arg(long)]
        data: PathBuf,

        /// Directory of signal files
        #[arg(long)]
        signals: PathBuf,

        /// Directory of ground-truth files
        #[arg(long)]
        truth: PathBuf,

        /// Output CSV path
        #[arg(long, default_value = "signal_accuracy.csv")]
        out: PathBuf,

        #[command(flatten)]
        tunables: Tunables,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Decode {
            data,
            signals,
            tolerance,
            out,
            tunables,
        } => decode(&data, signals.as_deref(), tolerance, out.as_deref(), tunables),

        Cmd::Query {
            archive,
            start,
            end,
            top,
        } => query(&archive, start, end, top),

        Cmd::TruthTop { data, start, end, k } => truth_flows(&data, start, end, k, true),

        Cmd::TruthRetrieve { data, start, end, k } => truth_flows(&data, start, end, k, false),

        Cmd::Traces { data, start, end } => traces(&data, start, end),

        Cmd::Monitor { data, max_qdepth } => monitor(&data, max_qdepth),

        Cmd::Compare {
            data,
            truth,
            out_dir,
            thresholds,
            samples,
            seed,
            tunables,
        } => compare(&data, &truth, &out_dir, &thresholds, samples, seed, tunables),

        Cmd::SignalAccuracy {
            data,
            signals,
            truth,
            out,
            tunables,
        } => signal_accuracy(&data, &signals, &truth, &out, tunables),
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Ensure the parent directory for a file exists.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", dir.display()))?;
        }
    }
    Ok(())
}

fn decode(
    data: &Path,
    signals: Option<&Path>,
    tolerance: u32,
    out: Option<&Path>,
    tunables: Tunables,
) -> Result<()> {
    let cfg = tunables.build()?;
    info!(?cfg, data = %data.display(), "decoding snapshots");
    let mut decoder = TimeWindowDecoder::from_dir(cfg, data)
        .with_context(|| format!("decoding snapshots under {}", data.display()))?
        .with_tolerance(tolerance);

    println!(
        "Decoded {} sets (period {} ns, coefficients {:?})",
        decoder.sets().len(),
        cfg.total_duration(),
        decoder.coefficients()
    );
    for (i, set) in decoder.sets().iter().enumerate() {
        println!(
            "  set {i}: stamp {}, cells {}, sts {}, lts {}",
            set.stamp,
            set.len(),
            set.sts,
            set.lts
        );
    }

    if let Some(sig_dir) = signals {
        let stats = decoder
            .load_signals(sig_dir)
            .with_context(|| format!("correlating signals under {}", sig_dir.display()))?;
        println!(
            "Signals: {} matched, {} dropped (of {} records in {} files)",
            stats.matched, stats.dropped, stats.records, stats.files
        );
    }

    if let Some(out) = out {
        ensure_parent_dir(out)?;
        write_archive_auto(out, &decoder.to_archive())
            .with_context(|| format!("writing archive to {}", out.display()))?;
        println!("Archived {} sets → {}", decoder.sets().len(), out.display());
    }
    Ok(())
}

fn query(archive: &Path, start: u64, end: u64, top: usize) -> Result<()> {
    let decoder = TimeWindowDecoder::from_archive(
        read_archive_auto(archive)
            .with_context(|| format!("reading archive {}", archive.display()))?,
    );
    let outcome = decoder.retrieve(start, end);

    match outcome.coverage {
        Coverage::Empty => println!("No decoded set covers [{start}, {end}]"),
        Coverage::Partial {
            covered_to,
            requested_to,
        } => println!(
            "Partial coverage: answered [{start}, {covered_to}], tail ({covered_to}, \
             {requested_to}] is past the last set"
        ),
        Coverage::Full => {}
    }
    if let Some(w) = outcome.dominant_window {
        println!(
            "{} flows across {} sub-intervals (dominant window {w})",
            outcome.flows.len(),
            outcome.spans.len()
        );
    }
    let limit = if top == 0 { outcome.flows.len() } else { top };
    for (fid, n) in outcome.flows.iter().take(limit) {
        println!("  {fid}  {n}");
    }
    Ok(())
}

fn truth_flows(data: &Path, start: u64, end: u64, k: usize, by_enqueue: bool) -> Result<()> {
    let stream = TruthStream::from_dir(data)
        .with_context(|| format!("ingesting ground truth under {}", data.display()))?;
    let k = (k != 0).then_some(k);
    let flows = if by_enqueue {
        stream.top(start, end, k)
    } else {
        stream.retrieve(start, end, k)
    };
    println!(
        "{} flows in [{start}, {end}] ({} packets total)",
        flows.len(),
        stream.stats().packets
    );
    for (fid, n) in &flows {
        println!("  {fid}  {n}");
    }
    Ok(())
}

fn traces(data: &Path, start: u64, end: u64) -> Result<()> {
    let stream = TruthStream::from_dir(data)
        .with_context(|| format!("ingesting ground truth under {}", data.display()))?;
    let trace = stream.traces(start, end);
    println!("{} packets in [{start}, {end}]", trace.len());
    for fid in &trace {
        println!("  {fid}");
    }
    Ok(())
}

fn monitor(data: &Path, max_qdepth: usize) -> Result<()> {
    let samples = decode_monitor_dir(data, max_qdepth)
        .with_context(|| format!("decoding queue monitor under {}", data.display()))?;
    println!("Decoded {} queue samples", samples.len());
    for s in &samples {
        println!(
            "  {}: depth {}, {} verified entries{}",
            s.stamp,
            s.depth,
            s.entries.len(),
            if s.wrapped { " (seq wrapped)" } else { "" }
        );
    }
    Ok(())
}

fn compare(
    data: &Path,
    truth_dir: &Path,
    out_dir: &Path,
    thresholds: &[u32],
    samples: usize,
    seed: u64,
    tunables: Tunables,
) -> Result<()> {
    let cfg = tunables.build()?;
    let decoder = TimeWindowDecoder::from_dir(cfg, data)
        .with_context(|| format!("decoding snapshots under {}", data.display()))?;
    let truth = TruthStream::from_dir(truth_dir)
        .with_context(|| format!("ingesting ground truth under {}", truth_dir.display()))?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let rows = qscope_eval::run_comparison(&decoder, &truth, thresholds, samples, seed, |band| {
        let path = out_dir.join(format!("qdepth_level_{band}_result.csv"));
        let f = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        Ok(BufWriter::new(f))
    })?;
    println!(
        "Wrote {rows} comparison rows across {} bands → {}",
        thresholds.len(),
        out_dir.display()
    );
    Ok(())
}

fn signal_accuracy(
    data: &Path,
    signals: &Path,
    truth_dir: &Path,
    out: &Path,
    tunables: Tunables,
) -> Result<()> {
    let cfg = tunables.build()?;
    let mut decoder = TimeWindowDecoder::from_dir(cfg, data)
        .with_context(|| format!("decoding snapshots under {}", data.display()))?;
    let stats = decoder
        .load_signals(signals)
        .with_context(|| format!("correlating signals under {}", signals.display()))?;
    let truth = TruthStream::from_dir(truth_dir)
        .with_context(|| format!("ingesting ground truth under {}", truth_dir.display()))?;

    ensure_parent_dir(out)?;
    let f = File::create(out).with_context(|| format!("create {}", out.display()))?;
    let rows = qscope_eval::run_signal_accuracy(&decoder, &truth, BufWriter::new(f))?;
    println!(
        "Wrote {rows} signal rows ({} matched / {} dropped) → {}",
        stats.matched,
        stats.dropped,
        out.display()
    );
    Ok(())
}
