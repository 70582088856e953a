use std::io;
use std::sync::Arc;

use stratum_graph::{Def, GraphOutput, Ref, SourceUnit};
use stratum_vfs::{path as vpath, FileSystem};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};
use crate::fanout;
use crate::filter::{narrowed, DefFilter, RefFilter};
use crate::repo_paths::is_commit_dir;
use crate::tree_store::FsTreeStore;
use crate::{
    RepoImporter, RepoStore, StoreConfig, StoreContext, TreeImporter, TreeStore, UnitStore,
};

/// Fans queries out across the commits of one repo.
///
/// Commit enumeration walks every child directory, so point-in-time
/// callers are expected to narrow with `ByCommitIds`, which collapses the
/// fan-out to the named tree stores without listing at all.
#[derive(Debug)]
pub struct FsRepoStore {
    ctx: Arc<StoreContext>,
    dir: String,
    repo: String,
}

impl FsRepoStore {
    pub fn new(fs: Arc<dyn FileSystem>, dir: impl Into<String>, repo: impl Into<String>) -> Self {
        Self::with_context(
            StoreContext::new(fs, StoreConfig::default()),
            dir.into(),
            repo.into(),
        )
    }

    pub(crate) fn with_context(ctx: Arc<StoreContext>, dir: String, repo: String) -> Self {
        Self { ctx, dir, repo }
    }

    fn list_commit_ids(&self) -> Result<Vec<String>> {
        let entries = match self.ctx.fs.read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotExist(self.dir.clone()))
            }
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::new();
        for entry in entries {
            if !self.ctx.fs.stat(&entry)?.is_dir {
                continue;
            }
            if is_commit_dir(&*self.ctx.fs, &entry)? {
                out.push(vpath::file_name(&entry).to_string());
            }
        }
        Ok(out)
    }

    fn tree_store(&self, commit_id: &str) -> FsTreeStore {
        FsTreeStore::with_context(
            Arc::clone(&self.ctx),
            vpath::join(&self.dir, commit_id),
            self.repo.clone(),
            commit_id.to_string(),
        )
    }

    /// Commits to visit, and whether filters named them explicitly (a
    /// named missing commit surfaces `NotExist` instead of an empty
    /// result).
    fn selected_commits<'a>(
        &self,
        narrowings: impl Iterator<Item = crate::filter::Narrowing<'a>>,
    ) -> Result<(Vec<String>, bool)> {
        match narrowed(narrowings, |n| n.commit_ids) {
            Some(named) => Ok((named, true)),
            None => Ok((self.list_commit_ids()?, false)),
        }
    }

    fn fan_out<T, Q>(&self, token: &CancellationToken, commits: Vec<String>, named: bool, query: Q) -> Result<Vec<T>>
    where
        T: Send,
        Q: Fn(FsTreeStore, &CancellationToken) -> Result<Vec<T>> + Send + Sync,
    {
        let query = &query;
        let jobs: Vec<_> = commits
            .into_iter()
            .map(|commit_id| {
                let tree = self.tree_store(&commit_id);
                move |token: &CancellationToken| match query(tree, token) {
                    Err(err) if err.is_not_exist() && !named => Ok(Vec::new()),
                    other => other,
                }
            })
            .collect();
        fanout::run(self.ctx.pool(), token, jobs)
    }
}

impl UnitStore for FsRepoStore {
    fn defs(&self, token: &CancellationToken, filters: &[Arc<dyn DefFilter>]) -> Result<Vec<Def>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let (commits, named) = self.selected_commits(filters.iter().map(|f| f.narrowing()))?;
        self.fan_out(token, commits, named, |tree, token| tree.defs(token, filters))
    }

    fn refs(&self, token: &CancellationToken, filters: &[Arc<dyn RefFilter>]) -> Result<Vec<Ref>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let (commits, named) = self.selected_commits(filters.iter().map(|f| f.narrowing()))?;
        self.fan_out(token, commits, named, |tree, token| tree.refs(token, filters))
    }
}

impl TreeStore for FsRepoStore {
    fn units(&self, token: &CancellationToken) -> Result<Vec<SourceUnit>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let commits = self.list_commit_ids()?;
        self.fan_out(token, commits, false, |tree, token| tree.units(token))
    }
}

impl RepoStore for FsRepoStore {
    fn commit_ids(&self, token: &CancellationToken) -> Result<Vec<String>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.list_commit_ids()
    }
}

impl RepoImporter for FsRepoStore {
    fn import_unit(
        &self,
        commit_id: &str,
        unit: &SourceUnit,
        output: GraphOutput,
    ) -> Result<()> {
        if !crate::repo_paths::valid_commit_id(commit_id) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a commit id: {commit_id:?}"),
            )));
        }
        self.tree_store(commit_id).import_unit(unit, output)
    }
}
