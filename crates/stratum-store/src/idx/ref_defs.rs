use serde::{Deserialize, Serialize};
use stratum_graph::{Ref, RefDefKey};

use crate::codec::ByteRange;

pub(crate) const REF_DEFS_FILE: &str = "ref.defs.idx";

/// Maps stored referent keys to the contiguous byte range of their refs
/// inside `ref.dat`.
///
/// Contiguity holds because `ref.dat` is written in canonical order,
/// referent first; a lookup is a binary search plus one bounded read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RefDefIndex {
    entries: Vec<(RefDefKey, ByteRange)>,
}

impl RefDefIndex {
    /// Builds the index from canonically sorted refs and the byte range
    /// each one was written to, in the same order.
    pub fn build(refs: &[Ref], ranges: &[ByteRange]) -> Self {
        let mut entries: Vec<(RefDefKey, ByteRange)> = Vec::new();
        for (r, range) in refs.iter().zip(ranges) {
            let key = r.ref_def_key();
            match entries.last_mut() {
                Some((last, span)) if *last == key => span.extend_to(*range),
                _ => entries.push((key, *range)),
            }
        }
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        Self { entries }
    }

    pub fn range(&self, key: &RefDefKey) -> Option<ByteRange> {
        self.entries
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|idx| self.entries[idx].1)
    }

    pub fn approx_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(k, _)| {
                k.def_repo.len()
                    + k.def_unit_type.len()
                    + k.def_unit.len()
                    + k.def_path.len()
                    + std::mem::size_of::<ByteRange>()
            })
            .sum()
    }
}
