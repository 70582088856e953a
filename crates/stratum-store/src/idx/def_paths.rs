use serde::{Deserialize, Serialize};
use stratum_graph::Def;

use crate::codec::ByteRange;

pub(crate) const DEF_PATHS_FILE: &str = "def.paths.idx";

/// Maps def paths to record offsets inside `def.dat`.
///
/// Entries are sorted by path so lookups are a binary search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct DefPathIndex {
    entries: Vec<(String, u64)>,
}

impl DefPathIndex {
    /// Builds the index from the defs and the byte range each one was
    /// written to, in the same order.
    pub fn build(defs: &[Def], ranges: &[ByteRange]) -> Self {
        let mut entries: Vec<(String, u64)> = defs
            .iter()
            .zip(ranges)
            .map(|(def, range)| (def.path.clone(), range.start))
            .collect();
        entries.sort();
        Self { entries }
    }

    pub fn offset(&self, path: &str) -> Option<u64> {
        self.entries
            .binary_search_by(|(p, _)| p.as_str().cmp(path))
            .ok()
            .map(|idx| self.entries[idx].1)
    }

    pub fn approx_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(p, _)| p.len() + std::mem::size_of::<u64>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_path() {
        let defs: Vec<Def> = ["c", "a", "b"]
            .iter()
            .map(|p| Def {
                path: p.to_string(),
                ..Def::default()
            })
            .collect();
        let ranges = [
            ByteRange { start: 0, len: 10 },
            ByteRange { start: 10, len: 10 },
            ByteRange { start: 20, len: 10 },
        ];

        let index = DefPathIndex::build(&defs, &ranges);
        assert_eq!(index.offset("a"), Some(10));
        assert_eq!(index.offset("c"), Some(0));
        assert_eq!(index.offset("missing"), None);
    }
}
