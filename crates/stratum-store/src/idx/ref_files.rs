use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use stratum_graph::Ref;

use crate::codec::ByteRange;

pub(crate) const REF_FILES_FILE: &str = "ref.files.idx";

/// A unit qualifies for the file index once its refs average this many
/// per distinct file. Below that, scanning `ref.dat` touches roughly as
/// few bytes as the spans would, and the index file is pure overhead.
pub(crate) const REF_FILES_MIN_REFS_PER_FILE: usize = 16;

/// Maps files to the `ref.dat` spans holding their refs.
///
/// Refs are sorted by referent, not by file, so one file usually owns
/// several spans; adjacent records from the same file coalesce.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RefFileIndex {
    entries: Vec<(String, Vec<ByteRange>)>,
}

impl RefFileIndex {
    /// True when the unit's refs cluster heavily enough per file for the
    /// index to pay for itself.
    pub fn should_build(refs: &[Ref]) -> bool {
        if refs.is_empty() {
            return false;
        }
        let distinct: HashSet<&str> = refs.iter().map(|r| r.file.as_str()).collect();
        refs.len() >= REF_FILES_MIN_REFS_PER_FILE * distinct.len()
    }

    /// Builds the index from the refs and the byte range each one was
    /// written to, in the same order.
    pub fn build(refs: &[Ref], ranges: &[ByteRange]) -> Self {
        let mut by_file: BTreeMap<String, Vec<ByteRange>> = BTreeMap::new();
        for (r, range) in refs.iter().zip(ranges) {
            let spans = by_file.entry(r.file.clone()).or_default();
            match spans.last_mut() {
                Some(last) if last.end() == range.start => last.extend_to(*range),
                _ => spans.push(*range),
            }
        }
        Self {
            entries: by_file.into_iter().collect(),
        }
    }

    /// Union of the spans for `files`, in file order.
    pub fn ranges(&self, files: &[String]) -> Vec<ByteRange> {
        let mut out = Vec::new();
        for file in files {
            if let Ok(idx) = self
                .entries
                .binary_search_by(|(f, _)| f.as_str().cmp(file))
            {
                out.extend_from_slice(&self.entries[idx].1);
            }
        }
        out.sort();
        out.dedup();
        out
    }

    pub fn approx_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(f, spans)| f.len() + spans.len() * std::mem::size_of::<ByteRange>())
            .sum()
    }
}
