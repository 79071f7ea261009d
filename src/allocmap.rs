//! Allocation map: run-length encoding of used/free clusters (§6, component
//! D).
//!
//! Encoded as a sequence of varints, each naming the length in clusters of
//! one run; runs alternate used/free starting with a used run (an all-free
//! volume still starts with a zero-length used run so the alternation rule
//! has no special case).

use crate::error::{PipelineError, Result};
use crate::varint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub used: bool,
    pub clusters: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AllocationMap {
    runs: Vec<Run>,
    total_clusters: u64,
}

impl AllocationMap {
    /// A map with a single run covering the whole volume, `used` throughout.
    /// This is what `save_all_blocks` (§6) produces: one run, no
    /// fragmentation to describe.
    pub fn fully(used: bool, total_clusters: u64) -> Self {
        let runs = if total_clusters == 0 {
            Vec::new()
        } else {
            vec![Run {
                used,
                clusters: total_clusters,
            }]
        };
        AllocationMap {
            runs,
            total_clusters,
        }
    }

    /// Builds a map from caller-supplied runs (e.g. from a
    /// `SnapshotProvider`), merging adjacent runs of the same kind and
    /// dropping zero-length runs.
    pub fn from_runs(runs: impl IntoIterator<Item = Run>) -> Self {
        let mut merged: Vec<Run> = Vec::new();
        let mut total = 0u64;
        for run in runs {
            if run.clusters == 0 {
                continue;
            }
            total += run.clusters;
            if let Some(last) = merged.last_mut() {
                if last.used == run.used {
                    last.clusters += run.clusters;
                    continue;
                }
            }
            merged.push(run);
        }
        AllocationMap {
            runs: merged,
            total_clusters: total,
        }
    }

    pub fn total_clusters(&self) -> u64 {
        self.total_clusters
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn used_clusters(&self) -> u64 {
        self.runs
            .iter()
            .filter(|r| r.used)
            .map(|r| r.clusters)
            .sum()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // First run's kind is implicit (always "used" first); an all-free
        // volume is represented by a leading zero-length used run.
        let mut runs = self.runs.iter();
        let first_used = runs
            .clone()
            .next()
            .map(|r| r.used)
            .unwrap_or(true);
        if !first_used {
            varint::encode_u64(0, &mut out);
        }
        for run in runs {
            varint::encode_u64(run.clusters, &mut out);
        }
        out
    }

    /// Decodes and validates against `expected_total_clusters` (the
    /// header's cluster count, §7 "AllocationMapCorrupt").
    pub fn decode(mut data: &[u8], expected_total_clusters: u64) -> Result<Self> {
        let mut runs = Vec::new();
        let mut used = true;
        let mut total = 0u64;
        while !data.is_empty() {
            let (clusters, consumed) = varint::decode_u64(data)?;
            data = &data[consumed..];
            total += clusters;
            if clusters > 0 {
                runs.push(Run { used, clusters });
            }
            used = !used;
        }
        if total != expected_total_clusters {
            return Err(PipelineError::AllocationMapCorrupt {
                decoded: total,
                expected: expected_total_clusters,
            });
        }
        Ok(AllocationMap {
            runs,
            total_clusters: total,
        })
    }

    /// Iterates `(cluster_offset, run)` pairs in order, for callers that
    /// need an absolute starting cluster per run.
    pub fn iter_with_offsets(&self) -> impl Iterator<Item = (u64, Run)> + '_ {
        let mut offset = 0u64;
        self.runs.iter().map(move |run| {
            let start = offset;
            offset += run.clusters;
            (start, *run)
        })
    }
}
