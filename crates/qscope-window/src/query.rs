// crates/qscope-window/src/query.rs

//! Interval queries over decoded sets.
//!
//! A query `[ts, te]` is matched against the sets in snapshot order. The
//! first set whose `[sts, lts]` contains `ts` anchors the walk; a query
//! reaching past that set's `lts` is cut there and resumed at the next
//! set's bounds. Surviving cells are binned per window by reconstructed
//! midpoint, then scaled by the per-window sampling coefficients.

use std::collections::HashMap;

use qscope_core::{Fid, WindowConfig, WindowSet};

/// How much of the requested interval the decoded sets could answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coverage {
    /// The whole interval fell inside decoded sets.
    Full,
    /// The interval reaches past the last decoded set; only the prefix up
    /// to `covered_to` is reflected in the result.
    Partial { covered_to: u64, requested_to: u64 },
    /// No set contains the interval start (or the interval is inverted).
    Empty,
}

/// One sub-interval answered by one set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuerySpan {
    /// Index into the decoder's set list.
    pub set_index: usize,
    pub start: u64,
    pub end: u64,
}

/// Result of an interval query.
#[derive(Clone, Debug)]
pub struct QueryOutcome {
    /// Estimated packets per flow, descending.
    pub flows: Vec<(Fid, u64)>,
    /// The sub-intervals actually consulted, in time order.
    pub spans: Vec<QuerySpan>,
    /// Window contributing the most distinct flows (`None` when no set
    /// matched).
    pub dominant_window: Option<u32>,
    pub coverage: Coverage,
}

impl QueryOutcome {
    fn empty() -> Self {
        Self {
            flows: Vec::new(),
            spans: Vec::new(),
            dominant_window: None,
            coverage: Coverage::Empty,
        }
    }
}

/// Run `[ts, te]` against `sets` decoded under `cfg` with `coeff` scaling.
#[must_use]
pub fn retrieve(
    cfg: &WindowConfig,
    coeff: &[f64],
    sets: &[WindowSet],
    ts: u64,
    te: u64,
) -> QueryOutcome {
    if ts > te {
        return QueryOutcome::empty();
    }

    // Locate the covering sets, cutting the query at set boundaries.
    let mut spans = Vec::new();
    let mut cursor = ts;
    let mut covered_to = ts;
    let mut full = false;
    for (i, set) in sets.iter().enumerate() {
        if !set.covers(cursor) {
            continue;
        }
        if te <= set.lts {
            spans.push(QuerySpan {
                set_index: i,
                start: cursor,
                end: te,
            });
            covered_to = te;
            full = true;
            break;
        }
        spans.push(QuerySpan {
            set_index: i,
            start: cursor,
            end: set.lts,
        });
        covered_to = set.lts;
        match sets.get(i + 1) {
            Some(next) => cursor = set.lts.max(next.sts),
            None => break,
        }
    }
    if spans.is_empty() {
        return QueryOutcome::empty();
    }

    // Bin surviving cells per window.
    let mut agg: Vec<HashMap<Fid, u64>> = vec![HashMap::new(); cfg.windows as usize];
    for span in &spans {
        for cell in &sets[span.set_index].cells {
            let mid = cell.midpoint(cfg);
            if span.start <= mid && mid <= span.end {
                *agg[usize::from(cell.window)].entry(cell.fid).or_insert(0) += 1;
            }
        }
    }

    // Dominant window: most distinct flows, earliest window on ties.
    let mut dominant = 0u32;
    let mut best = 0usize;
    for (w, bucket) in agg.iter().enumerate() {
        if bucket.len() > best {
            best = bucket.len();
            dominant = w as u32;
        }
    }

    // Apply the per-window sampling coefficients and merge.
    let mut merged: HashMap<Fid, u64> = HashMap::new();
    for (w, bucket) in agg.iter().enumerate() {
        for (&fid, &n) in bucket {
            let estimated = (n as f64 / coeff[w]).floor() as u64;
            *merged.entry(fid).or_insert(0) += estimated;
        }
    }
    let mut flows: Vec<(Fid, u64)> = merged.into_iter().collect();
    flows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    QueryOutcome {
        flows,
        spans,
        dominant_window: Some(dominant),
        coverage: if full {
            Coverage::Full
        } else {
            Coverage::Partial {
                covered_to,
                requested_to: te,
            }
        },
    }
}
