// crates/qscope-window/src/monitor.rs

//! Queue-monitor register decoding: per-sample reconstruction of the queue
//! stack from `<sec>_<usec>_<wrap_flag>.bin` dumps.
//!
//! Each dump holds three blocks of `max_qdepth` little-endian words (source
//! IPs, destination IPs, per-packet sequence numbers). Slots are only valid
//! if their widened sequence number strictly exceeds every previously
//! verified one; stale slots below a later packet are kept from the
//! previous sample's verified prefix.

use std::fs;
use std::path::{Path, PathBuf};

use qscope_core::{FileStamp, Fid, TelemetryError};
use tracing::debug;

/// One verified slot of the queue stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    /// Slot index within the stack (equals queue position).
    pub slot: u32,
    pub fid: Fid,
    /// Sequence number widened by the rollover counter.
    pub seq: u64,
}

/// The decoded queue stack at one sample time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueSample {
    pub stamp: FileStamp,
    /// Whether the sequence counter rolled over right before this sample.
    pub wrapped: bool,
    /// Queue depth: slot index of the deepest verified entry, 0 when empty.
    pub depth: u32,
    pub entries: Vec<QueueEntry>,
}

struct RawSlot {
    fid: Fid,
    seq: u32,
}

/// Enumerate and sort queue-monitor dumps under `dir`.
fn monitor_files(dir: &Path) -> Result<Vec<(FileStamp, bool, PathBuf)>, TelemetryError> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| TelemetryError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TelemetryError::io(dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bin") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some((stamp, wrapped)) = FileStamp::parse_flagged_stem(stem) {
            out.push((stamp, wrapped, path));
        }
    }
    if out.is_empty() {
        return Err(TelemetryError::EmptyDirectory {
            path: dir.to_owned(),
        });
    }
    out.sort_by_key(|(stamp, ..)| *stamp);
    Ok(out)
}

fn read_monitor_file(path: &Path, max_qdepth: usize) -> Result<Vec<RawSlot>, TelemetryError> {
    let bytes = fs::read(path).map_err(|e| TelemetryError::io(path, e))?;
    let expected = 3 * max_qdepth as u64 * 4;
    if bytes.len() as u64 != expected {
        return Err(TelemetryError::RegisterLength {
            kind: "queue-monitor",
            path: path.to_owned(),
            len: bytes.len() as u64,
            expected,
        });
    }
    let mut words = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    let src: Vec<u32> = words.by_ref().take(max_qdepth).collect();
    let dst: Vec<u32> = words.by_ref().take(max_qdepth).collect();
    let seq: Vec<u32> = words.by_ref().take(max_qdepth).collect();
    Ok(src
        .into_iter()
        .zip(dst)
        .zip(seq)
        .map(|((s, d), q)| RawSlot {
            fid: Fid::from_words(s, d),
            seq: q,
        })
        .collect())
}

/// Decode every queue-monitor dump under `dir` into verified stacks.
pub fn decode_monitor_dir(
    dir: &Path,
    max_qdepth: usize,
) -> Result<Vec<QueueSample>, TelemetryError> {
    let files = monitor_files(dir)?;
    let mut samples: Vec<QueueSample> = Vec::with_capacity(files.len());
    let mut wrap: u64 = 0;
    // Highest verified sequence so far; survives across samples.
    let mut current_seq: Option<u64> = None;

    for (i, (stamp, wrapped, path)) in files.iter().enumerate() {
        if *wrapped {
            wrap += 1;
        }
        let slots = read_monitor_file(path, max_qdepth)?;
        let widen = |s: &RawSlot| u64::from(s.seq) + (wrap << 32);

        let entries = if i == 0 {
            // First sample: every strictly increasing live slot is verified.
            let mut out = Vec::new();
            for (j, slot) in slots.iter().enumerate() {
                let seq = widen(slot);
                if !slot.fid.is_zero() && current_seq.map_or(true, |c| seq > c) {
                    current_seq = Some(seq);
                    out.push(QueueEntry {
                        slot: j as u32,
                        fid: slot.fid,
                        seq,
                    });
                }
            }
            out
        } else if slots.iter().all(|s| s.fid.is_zero()) {
            Vec::new()
        } else {
            // Walk the previous verified prefix; the first slot holding a
            // later packet invalidates everything beneath it in the old
            // stack, and the tail is re-verified slot by slot.
            let prev = &samples[i - 1].entries;
            let mut out = Vec::new();
            let mut j = 0usize;
            let mut later_found = false;
            for item in prev {
                while j <= item.slot as usize {
                    let seq = widen(&slots[j]);
                    if !slots[j].fid.is_zero() && current_seq.map_or(true, |c| seq > c) {
                        current_seq = Some(seq);
                        out.push(QueueEntry {
                            slot: j as u32,
                            fid: slots[j].fid,
                            seq,
                        });
                        j += 1;
                        later_found = true;
                        break;
                    }
                    j += 1;
                }
                if later_found {
                    break;
                }
                out.push(*item);
            }
            for (z, slot) in slots.iter().enumerate().skip(j) {
                let seq = widen(slot);
                if !slot.fid.is_zero() && current_seq.map_or(true, |c| seq > c) {
                    current_seq = Some(seq);
                    out.push(QueueEntry {
                        slot: z as u32,
                        fid: slot.fid,
                        seq,
                    });
                }
            }
            out
        };

        let depth = entries.last().map_or(0, |e| e.slot);
        debug!(%stamp, depth, entries = entries.len(), "decoded queue sample");
        samples.push(QueueSample {
            stamp: *stamp,
            wrapped: *wrapped,
            depth,
            entries,
        });
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_dump(dir: &Path, name: &str, slots: &[(u32, u32, u32)]) {
        let mut bytes = Vec::new();
        for &(s, ..) in slots {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        for &(_, d, _) in slots {
            bytes.extend_from_slice(&d.to_le_bytes());
        }
        for &(.., q) in slots {
            bytes.extend_from_slice(&q.to_le_bytes());
        }
        fs::write(dir.join(name), bytes).unwrap();
    }

    fn tmp_dir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("qscope_qm_{tag}_{nanos}"));
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn stale_tail_is_filtered_and_prefix_carries_over() {
        let dir = tmp_dir("stack");
        // Sample 1: seq 10, 11, then a stale 3 in slot 2.
        write_dump(&dir, "1_0_0.bin", &[(1, 1, 10), (2, 2, 11), (3, 3, 3), (0, 0, 0)]);
        // Sample 2: slot 0 holds a later packet (seq 12); deeper slots stale.
        write_dump(&dir, "2_0_0.bin", &[(4, 4, 12), (2, 2, 11), (3, 3, 3), (0, 0, 0)]);

        let samples = decode_monitor_dir(&dir, 4).unwrap();
        assert_eq!(samples[0].entries.len(), 2);
        assert_eq!(samples[0].depth, 1);

        let s2: Vec<u64> = samples[1].entries.iter().map(|e| e.seq).collect();
        assert_eq!(s2, vec![12]);
        assert_eq!(samples[1].depth, 0);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn wrap_flag_widens_later_sequence_numbers() {
        let dir = tmp_dir("wrap");
        write_dump(&dir, "1_0_0.bin", &[(1, 1, u32::MAX - 1), (0, 0, 0)]);
        // Counter rolled over before this sample; small raw seq is newer.
        write_dump(&dir, "2_0_1.bin", &[(5, 5, 7), (0, 0, 0)]);

        let samples = decode_monitor_dir(&dir, 2).unwrap();
        assert!(samples[1].wrapped);
        assert_eq!(samples[1].entries[0].seq, 7 + (1u64 << 32));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn all_empty_sample_decodes_to_zero_depth() {
        let dir = tmp_dir("empty");
        write_dump(&dir, "1_0_0.bin", &[(1, 1, 10), (0, 0, 0)]);
        write_dump(&dir, "2_0_0.bin", &[(0, 0, 0), (0, 0, 0)]);

        let samples = decode_monitor_dir(&dir, 2).unwrap();
        assert_eq!(samples[1].depth, 0);
        assert!(samples[1].entries.is_empty());

        let _ = fs::remove_dir_all(dir);
    }
}
