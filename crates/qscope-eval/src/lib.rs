// crates/qscope-eval/src/lib.rs

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

//! Evaluation harness: sample packets per queue-depth band, replay their
//! queueing intervals as queries against the time-window engine and the
//! reference sketches, and emit one tab-separated precision/recall row per
//! sample.

pub mod report;

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use qscope_core::Fid;
use qscope_sketch::{count_min, flow_radar, hash_pipe, FlowHash};
use qscope_truth::{TruthRecord, TruthStream};
use qscope_window::TimeWindowDecoder;

pub use report::precision_recall;

/// Baseline sizings evaluated side by side, `(label-ish rows, cells)`.
const COUNT_MIN_SIZINGS: [(usize, usize); 2] = [(3, 1024), (5, 4096)];
const HASH_PIPE_SIZINGS: [(usize, usize); 2] = [(3, 1024), (5, 4096)];
const FLOW_RADAR_SIZINGS: [usize; 2] = [1024 * 3, 4096 * 5];

/// Uniform sample without replacement, clamped to the band size.
#[must_use]
pub fn sample_band<'a>(
    rng: &mut StdRng,
    band: &[&'a TruthRecord],
    n: usize,
) -> Vec<&'a TruthRecord> {
    let take = n.min(band.len());
    rand::seq::index::sample(rng, band.len(), take)
        .iter()
        .map(|i| band[i])
        .collect()
}

/// Ground-truth context of one covering set: the share of the set the query
/// actually touched, plus the set-interval flow list and packet trace the
/// baselines consume.
struct SpanContext {
    proportion: f64,
    flows: Vec<(Fid, u64)>,
    trace: Vec<Fid>,
}

fn span_contexts(
    decoder: &TimeWindowDecoder,
    truth: &TruthStream,
    outcome: &qscope_window::QueryOutcome,
) -> Vec<SpanContext> {
    outcome
        .spans
        .iter()
        .map(|span| {
            let set = &decoder.sets()[span.set_index];
            let proportion = if set.lts == set.sts {
                1.0
            } else {
                span.end.saturating_sub(span.start) as f64 / (set.lts - set.sts) as f64
            };
            SpanContext {
                proportion,
                flows: truth.retrieve(set.sts, set.lts, None),
                trace: truth.traces(set.sts, set.lts),
            }
        })
        .collect()
}

/// Merge per-span estimates, scaling each by its span's proportion.
fn merge_scaled(parts: Vec<(f64, Vec<(Fid, u64)>)>) -> Vec<(Fid, u64)> {
    let mut merged: HashMap<Fid, u64> = HashMap::new();
    for (proportion, flows) in parts {
        for (fid, n) in flows {
            *merged.entry(fid).or_insert(0) += (n as f64 * proportion).floor() as u64;
        }
    }
    let mut out: Vec<(Fid, u64)> = merged.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Compare the time-window engine and every baseline over one depth band's
/// samples, writing one row per usable sample. Returns the row count.
pub fn run_band_comparison<W: Write>(
    decoder: &TimeWindowDecoder,
    truth: &TruthStream,
    samples: &[&TruthRecord],
    out: W,
) -> Result<usize> {
    let hash = FlowHash::new();
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    let mut rows = 0usize;

    for (idx, pkt) in samples.iter().enumerate() {
        let gt_flows = truth.retrieve(pkt.enq, pkt.deq, None);
        let outcome = decoder.retrieve(pkt.enq, pkt.deq);
        if outcome.flows.is_empty() {
            debug!(enq = pkt.enq, deq = pkt.deq, "no decoded coverage; skipping sample");
            continue;
        }
        let (tw_p, tw_r) = precision_recall(&gt_flows, &outcome.flows);
        if tw_p == 0.0 && tw_r == 0.0 {
            continue;
        }

        let contexts = span_contexts(decoder, truth, &outcome);
        let mut fields: Vec<String> = vec![
            idx.to_string(),
            pkt.enq.to_string(),
            pkt.deq.to_string(),
            pkt.qlen.to_string(),
            tw_p.to_string(),
            tw_r.to_string(),
        ];

        for (cm_rows, cm_cols) in COUNT_MIN_SIZINGS {
            let est = merge_scaled(
                contexts
                    .iter()
                    .map(|c| {
                        (
                            c.proportion,
                            count_min(&hash, &c.flows, &gt_flows, cm_rows, cm_cols),
                        )
                    })
                    .collect(),
            );
            let (p, r) = precision_recall(&gt_flows, &est);
            fields.push(p.to_string());
            fields.push(r.to_string());
        }
        for (stages, cells) in HASH_PIPE_SIZINGS {
            let est = merge_scaled(
                contexts
                    .iter()
                    .map(|c| (c.proportion, hash_pipe(&hash, &c.trace, stages, cells)))
                    .collect(),
            );
            let (p, r) = precision_recall(&gt_flows, &est);
            fields.push(p.to_string());
            fields.push(r.to_string());
        }
        for cells in FLOW_RADAR_SIZINGS {
            let est = merge_scaled(
                contexts
                    .iter()
                    .map(|c| (c.proportion, flow_radar(&hash, &c.flows, cells)))
                    .collect(),
            );
            let (p, r) = precision_recall(&gt_flows, &est);
            fields.push(p.to_string());
            fields.push(r.to_string());
        }

        writer.write_record(&fields).context("write comparison row")?;
        rows += 1;
    }
    writer.flush().context("flush comparison rows")?;
    Ok(rows)
}

/// Full comparison run: bucketize by depth, sample each band, and hand each
/// band's rows to `make_writer` (keyed by band index).
pub fn run_comparison<W: Write, F: FnMut(usize) -> Result<W>>(
    decoder: &TimeWindowDecoder,
    truth: &TruthStream,
    thresholds: &[u32],
    samples_per_band: usize,
    seed: u64,
    mut make_writer: F,
) -> Result<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bands = truth.bucketize_by_depth(thresholds);
    let mut total = 0usize;
    for (band_idx, band) in bands.iter().enumerate() {
        let samples = sample_band(&mut rng, band, samples_per_band);
        info!(
            band = band_idx,
            candidates = band.len(),
            sampled = samples.len(),
            "evaluating depth band"
        );
        let writer = make_writer(band_idx)?;
        total += run_band_comparison(decoder, truth, &samples, writer)?;
    }
    Ok(total)
}

/// Per-signal accuracy of the engine: one `(precision, recall)` row per
/// lifted signal whose queueing interval the decoded sets cover.
pub fn run_signal_accuracy<W: Write>(
    decoder: &TimeWindowDecoder,
    truth: &TruthStream,
    out: W,
) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    let mut rows = 0usize;
    for sig in decoder.signals() {
        let gt_flows = truth.retrieve(sig.enq, sig.deq, None);
        let outcome = decoder.retrieve(sig.enq, sig.deq);
        if outcome.flows.is_empty() {
            continue;
        }
        let (p, r) = precision_recall(&gt_flows, &outcome.flows);
        if p == 0.0 && r == 0.0 {
            continue;
        }
        writer
            .write_record(&[p.to_string(), r.to_string()])
            .context("write signal-accuracy row")?;
        rows += 1;
    }
    writer.flush().context("flush signal-accuracy rows")?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qscope_core::{FileStamp, LiveCell, SetArchive, WindowConfig, WindowSet};

    fn cfg() -> WindowConfig {
        WindowConfig::new(1, 2, 2, 2, 1.0).unwrap()
    }

    fn live(tts: u32, fid: u64) -> LiveCell {
        LiveCell {
            tts,
            fid: Fid::from_u64(fid),
            window: 0,
            wrap: 0,
        }
    }

    /// One decoded set over midpoints 18..=34 and a matching tap log.
    fn fixture() -> (TimeWindowDecoder, TruthStream) {
        let c = cfg();
        let cells: Vec<LiveCell> = vec![
            live(4, 1),
            live(5, 1),
            live(6, 2),
            live(7, 3),
            live(8, 1),
        ];
        let sts = cells.iter().map(|x| x.midpoint(&c)).min().unwrap();
        let lts = cells.iter().map(|x| x.midpoint(&c)).max().unwrap();
        let set = WindowSet {
            stamp: FileStamp { sec: 1, usec: 0 },
            cells,
            sts,
            lts,
            largest: None,
            smallest: None,
            window_counts: vec![5, 0],
        };
        let decoder = TimeWindowDecoder::from_archive(SetArchive::new(c, vec![set]));

        let records: Vec<TruthRecord> = (0..40u64)
            .map(|i| TruthRecord {
                enq: 16 + i / 2,
                deq: 26 + i / 2,
                qlen: 100 + i as u32 * 40,
                fid: Fid::from_u64(1 + i % 3),
            })
            .collect();
        (decoder, TruthStream::from_records(records))
    }

    #[test]
    fn sampling_clamps_to_band_size() {
        let (_, truth) = fixture();
        let bands = truth.bucketize_by_depth(&[100, 1000]);
        let mut rng = StdRng::seed_from_u64(7);
        let sampled = sample_band(&mut rng, &bands[0], 1_000);
        assert_eq!(sampled.len(), bands[0].len());
        let few = sample_band(&mut rng, &bands[1], 3);
        assert_eq!(few.len(), 3);
    }

    #[test]
    fn comparison_emits_rows_for_covered_samples() {
        let (decoder, truth) = fixture();
        let records = truth.records();
        let samples: Vec<&TruthRecord> = records.iter().take(6).collect();
        let mut buf = Vec::new();
        let rows = run_band_comparison(&decoder, &truth, &samples, &mut buf).unwrap();
        assert!(rows > 0);
        let text = String::from_utf8(buf).unwrap();
        let first = text.lines().next().unwrap();
        // idx, enq, deq, qlen + 7 precision/recall pairs.
        assert_eq!(first.split('\t').count(), 18);
    }
}
