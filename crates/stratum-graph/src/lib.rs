//! Data model for the stratum source-graph store.
//!
//! A language-neutral analyzer emits, per source unit, a bundle
//! ([`GraphOutput`]) of symbol definitions ([`Def`]), references to them
//! ([`Ref`]), documentation blobs ([`Doc`]) and file-range annotations
//! ([`Ann`]). The wire format is JSON with PascalCase field names; empty
//! fields are omitted.
//!
//! Scope fields (`repo`, `commit_id`, `unit_type`, `unit`) are carried on
//! every record but are blanked at rest by the store and re-populated on
//! read; see the `stratum-store` crate.

mod ann;
mod def;
mod doc;
mod output;
mod refs;
mod unit;

pub use ann::Ann;
pub use def::{Def, DefKey};
pub use doc::Doc;
pub use output::GraphOutput;
pub use refs::{Ref, RefDefKey, RefKey, RefSet};
pub use unit::{SourceUnit, UnitKey};
