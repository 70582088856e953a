//! Selective per-unit indexes, built at import and consumed at query time.
//!
//! Each index is a separate `.idx` file whose payload lets a
//! scope-narrowing filter translate into byte-range reads over the unit's
//! `.dat` files instead of a full scan. Indexes are rebuilt on every
//! import and never patched.

mod def_paths;
mod header;
mod ref_defs;
mod ref_files;

pub(crate) use def_paths::{DefPathIndex, DEF_PATHS_FILE};
pub(crate) use header::{read_index, write_index, IndexKind};
pub(crate) use ref_defs::{RefDefIndex, REF_DEFS_FILE};
pub(crate) use ref_files::{RefFileIndex, REF_FILES_FILE};
