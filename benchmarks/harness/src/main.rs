//! qscope-bench-harness
//!
//! Measure interval-query latency of the time-window engine over sampled
//! queueing intervals and append CSV rows into
//! `benchmarks/reports/bench-<unix>.csv`.
//!
//! Usage examples:
//!   cargo run -p qscope-bench-harness -- --profile configs/profiles/small.toml
//!   cargo run -p qscope-bench-harness -- --profile my-run.toml

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use qscope_core::WindowConfig;
use qscope_truth::TruthStream;
use qscope_window::TimeWindowDecoder;

#[derive(Debug, Deserialize)]
struct Profile {
    /// Directory of snapshot files
    data_dir: PathBuf,
    /// Directory of ground-truth files
    truth_dir: PathBuf,
    /// Tunables of the run that produced the snapshots
    alpha: u32,
    index_bits: u32,
    windows: u32,
    trim_bits: u32,
    cell_prob: f64,
    /// Depth-band thresholds for sampling query intervals
    thresholds: Vec<u32>,
    /// Queries sampled per band
    samples_per_band: usize,
    /// Sampling seed
    seed: u64,
}

fn parse_flag(name: &str, default: &str) -> String {
    let mut it = std::env::args().skip(1);
    while let Some(k) = it.next() {
        if k == format!("--{name}") {
            return it.next().unwrap_or_else(|| default.to_string());
        }
    }
    default.to_string()
}

fn dur_us(d: Duration) -> u128 {
    d.as_micros()
}

fn main() -> Result<()> {
    let profile_path = PathBuf::from(parse_flag("profile", "configs/profiles/small.toml"));
    let profile_src = fs::read_to_string(&profile_path)
        .with_context(|| format!("read profile {:?}", profile_path))?;
    let profile: Profile = toml::from_str(&profile_src).context("parse profile toml")?;
    println!(
        "Profile: alpha={}, k={}, T={}, TB0={}, z={}, {} samples/band",
        profile.alpha,
        profile.index_bits,
        profile.windows,
        profile.trim_bits,
        profile.cell_prob,
        profile.samples_per_band
    );

    let cfg = WindowConfig::new(
        profile.alpha,
        profile.index_bits,
        profile.windows,
        profile.trim_bits,
        profile.cell_prob,
    )?;

    // 1) ingest both inputs (timed separately from the queries)
    let t0 = Instant::now();
    let decoder = TimeWindowDecoder::from_dir(cfg, &profile.data_dir)
        .with_context(|| format!("decoding snapshots under {}", profile.data_dir.display()))?;
    let t_decode = t0.elapsed();

    let t0 = Instant::now();
    let truth = TruthStream::from_dir(&profile.truth_dir)
        .with_context(|| format!("ingesting ground truth under {}", profile.truth_dir.display()))?;
    let t_truth = t0.elapsed();

    // 2) sample query intervals per depth band
    let mut rng = StdRng::seed_from_u64(profile.seed);
    let bands = truth.bucketize_by_depth(&profile.thresholds);
    let mut intervals = Vec::new();
    for band in &bands {
        let take = profile.samples_per_band.min(band.len());
        for i in rand::seq::index::sample(&mut rng, band.len(), take) {
            intervals.push((band[i].enq, band[i].deq));
        }
    }
    anyhow::ensure!(!intervals.is_empty(), "no sampled intervals; check thresholds");

    fs::create_dir_all("benchmarks/reports").ok();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let csv_path = PathBuf::from(format!("benchmarks/reports/bench-{ts}.csv"));
    let mut csv = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&csv_path)?;
    writeln!(csv, "timestamp,stage,us,extra")?;
    writeln!(
        csv,
        "{ts},decode,{},sets={}",
        dur_us(t_decode),
        decoder.sets().len()
    )?;
    writeln!(
        csv,
        "{ts},truth,{},packets={}",
        dur_us(t_truth),
        truth.stats().packets
    )?;

    // 3) run the queries back to back
    let t0 = Instant::now();
    let mut answered = 0usize;
    for &(start, end) in &intervals {
        let outcome = decoder.retrieve(start, end);
        if !outcome.flows.is_empty() {
            answered += 1;
        }
    }
    let t_query = t0.elapsed();

    let per_query_us = dur_us(t_query) as f64 / intervals.len() as f64;
    let qps = if per_query_us > 0.0 {
        (1e6 / per_query_us).floor()
    } else {
        f64::INFINITY
    };
    writeln!(
        csv,
        "{ts},query,{},n={} answered={} per_query_us={per_query_us:.2} qps={qps}",
        dur_us(t_query),
        intervals.len(),
        answered
    )?;

    println!(
        "Executed {} queries ({answered} answered), {per_query_us:.2} us each, QPS {qps}",
        intervals.len()
    );
    println!("Wrote report → {}", csv_path.display());
    Ok(())
}
