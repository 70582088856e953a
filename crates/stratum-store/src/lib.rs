//! Layered, filter-driven storage for source-graph data.
//!
//! Analyzer output enters through the importer traits one bundle (unit ×
//! commit × repo) at a time and is laid out as a four-tier directory
//! hierarchy:
//!
//! ```text
//! <root>/<repo-path>/<commitID>/<unit-type>/<unit-name>.unit   manifest
//! <root>/<repo-path>/<commitID>/<unit-type>/<unit-name>/       data
//!     def.dat  ref.dat  doc.dat  ann.dat
//!     def.paths.idx  ref.defs.idx  [ref.files.idx]
//! ```
//!
//! Queries run top-down: each tier classifies its filters, opens only the
//! children the filters do not exclude, rewrites the filter list for each
//! child's scope, fans out on a bounded worker pool, and merges the
//! scope-expanded results. Per-unit indexes turn the common filters into
//! byte-range reads instead of full scans.
//!
//! Records at rest omit their scope prefix (`repo`, `commit_id`,
//! `unit_type`, `unit`); the store re-populates every scope field before
//! a record is returned. At most one writer per unit at a time is the
//! caller's responsibility; imports stage into a sibling directory and
//! swap in atomically.

use std::fmt;
use std::sync::{Arc, OnceLock};

use stratum_graph::{Def, GraphOutput, Ref, SourceUnit};
use stratum_vfs::FileSystem;

mod codec;
mod error;
mod fanout;
mod filter;
mod idx;
mod index_cache;
mod multi_repo_store;
mod repo_paths;
mod repo_store;
mod scope;
mod tree_store;
mod unit_store;

pub use error::{Result, StoreError};
pub use filter::{
    abs_ref_filter_fn, by_commit_ids, by_def_path, by_def_query, by_files, by_ref_def, by_repos,
    by_units, def_filter_fn, ref_filter_fn, AbsRefFilterFunc, ByCommitIdsFilter, ByDefPathFilter,
    ByDefQueryFilter, ByFilesFilter, ByRefDefFilter, ByReposFilter, ByUnitsFilter, DefFilter,
    DefFilterFunc, Narrowing, RefFilter, RefFilterFunc,
};
pub use multi_repo_store::FsMultiRepoStore;
pub use repo_paths::{DefaultRepoPaths, EvenlyDistributedRepoPaths, RepoPaths};
pub use repo_store::FsRepoStore;
pub use scope::UnitScope;
pub use tree_store::FsTreeStore;
pub use unit_store::FsUnitStore;

// Callers need the token type to drive cancellation.
pub use tokio_util::sync::CancellationToken;

/// Tuning knobs for one store instance.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Worker width of the fan-out pool shared by every tier. Sized to
    /// saturate the disk without exhausting file descriptors.
    pub fetch_par: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { fetch_par: 8 }
    }
}

/// State shared by every tier of one store instance: the filesystem, the
/// index cache, and the lazily built fan-out pool.
struct StoreContext {
    fs: Arc<dyn FileSystem>,
    cache: index_cache::IndexCache,
    config: StoreConfig,
    pool: OnceLock<rayon::ThreadPool>,
}

impl StoreContext {
    fn new(fs: Arc<dyn FileSystem>, config: StoreConfig) -> Arc<Self> {
        Arc::new(Self {
            fs,
            cache: index_cache::IndexCache::default(),
            config,
            pool: OnceLock::new(),
        })
    }

    fn pool(&self) -> &rayon::ThreadPool {
        self.pool
            .get_or_init(|| fanout::build_pool(self.config.fetch_par))
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Stores and accesses graph data for a single source unit.
pub trait UnitStore {
    /// All defs matching every filter, scope fields populated.
    fn defs(&self, token: &CancellationToken, filters: &[Arc<dyn DefFilter>]) -> Result<Vec<Def>>;

    /// All refs matching every filter, scope fields populated.
    fn refs(&self, token: &CancellationToken, filters: &[Arc<dyn RefFilter>]) -> Result<Vec<Ref>>;
}

/// A [`UnitStore`] spanning the units of one commit.
pub trait TreeStore: UnitStore {
    fn units(&self, token: &CancellationToken) -> Result<Vec<SourceUnit>>;
}

/// A [`TreeStore`] spanning the commits of one repo.
pub trait RepoStore: TreeStore {
    fn commit_ids(&self, token: &CancellationToken) -> Result<Vec<String>>;
}

/// A [`RepoStore`] spanning every repo in the store.
pub trait MultiRepoStore: RepoStore {
    fn repos(&self, token: &CancellationToken) -> Result<Vec<String>>;
}

/// Imports one bundle into a unit store, overwriting all existing data
/// for that unit.
pub trait UnitImporter {
    fn import(&self, output: GraphOutput) -> Result<()>;
}

/// Imports bundles at the commit level, writing the unit manifest
/// alongside the unit's data.
pub trait TreeImporter {
    fn import_unit(&self, unit: &SourceUnit, output: GraphOutput) -> Result<()>;
}

/// Imports bundles at the repo level.
pub trait RepoImporter {
    fn import_unit(&self, commit_id: &str, unit: &SourceUnit, output: GraphOutput) -> Result<()>;
}

/// Imports bundles at the top level.
pub trait MultiRepoImporter {
    fn import_unit(
        &self,
        repo: &str,
        commit_id: &str,
        unit: &SourceUnit,
        output: GraphOutput,
    ) -> Result<()>;
}
