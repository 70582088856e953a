use std::io;
use std::sync::Arc;

use stratum_graph::{Def, GraphOutput, Ref, SourceUnit};
use stratum_vfs::FileSystem;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};
use crate::fanout;
use crate::filter::{narrowed, DefFilter, RefFilter};
use crate::repo_paths::{DefaultRepoPaths, RepoPaths};
use crate::repo_store::FsRepoStore;
use crate::{
    MultiRepoImporter, MultiRepoStore, RepoImporter, RepoStore, StoreConfig, StoreContext,
    TreeStore, UnitStore,
};

/// The top tier: fans queries out across every repo in the store.
///
/// Where repos live on disk is decided by a pluggable [`RepoPaths`]
/// strategy; `ByRepos` filters collapse the fan-out to the named repos
/// without listing anything.
#[derive(Debug)]
pub struct FsMultiRepoStore {
    ctx: Arc<StoreContext>,
    repo_paths: Arc<dyn RepoPaths>,
}

impl FsMultiRepoStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with(fs, Arc::new(DefaultRepoPaths), StoreConfig::default())
    }

    pub fn with(
        fs: Arc<dyn FileSystem>,
        repo_paths: Arc<dyn RepoPaths>,
        config: StoreConfig,
    ) -> Self {
        Self {
            ctx: StoreContext::new(fs, config),
            repo_paths,
        }
    }

    fn repo_dir(&self, uri: &str) -> String {
        self.repo_paths.paths_for_repo(uri).join("/")
    }

    fn repo_store(&self, uri: &str) -> FsRepoStore {
        FsRepoStore::with_context(Arc::clone(&self.ctx), self.repo_dir(uri), uri.to_string())
    }

    /// Repos to visit, and whether filters named them explicitly (a named
    /// missing repo surfaces `NotExist` instead of an empty result).
    fn selected_repos<'a>(
        &self,
        narrowings: impl Iterator<Item = crate::filter::Narrowing<'a>>,
    ) -> Result<(Vec<String>, bool)> {
        match narrowed(narrowings, |n| n.repos) {
            Some(named) => Ok((named, true)),
            None => Ok((self.repo_paths.list_repo_uris(&*self.ctx.fs)?, false)),
        }
    }

    fn fan_out<T, Q>(
        &self,
        token: &CancellationToken,
        repos: Vec<String>,
        named: bool,
        query: Q,
    ) -> Result<Vec<T>>
    where
        T: Send,
        Q: Fn(FsRepoStore, &CancellationToken) -> Result<Vec<T>> + Send + Sync,
    {
        let query = &query;
        let jobs: Vec<_> = repos
            .into_iter()
            .map(|uri| {
                let store = self.repo_store(&uri);
                move |token: &CancellationToken| match query(store, token) {
                    Err(err) if err.is_not_exist() && !named => Ok(Vec::new()),
                    other => other,
                }
            })
            .collect();
        fanout::run(self.ctx.pool(), token, jobs)
    }
}

impl UnitStore for FsMultiRepoStore {
    fn defs(&self, token: &CancellationToken, filters: &[Arc<dyn DefFilter>]) -> Result<Vec<Def>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let (repos, named) = self.selected_repos(filters.iter().map(|f| f.narrowing()))?;
        self.fan_out(token, repos, named, |store, token| store.defs(token, filters))
    }

    fn refs(&self, token: &CancellationToken, filters: &[Arc<dyn RefFilter>]) -> Result<Vec<Ref>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let (repos, named) = self.selected_repos(filters.iter().map(|f| f.narrowing()))?;
        self.fan_out(token, repos, named, |store, token| store.refs(token, filters))
    }
}

impl TreeStore for FsMultiRepoStore {
    fn units(&self, token: &CancellationToken) -> Result<Vec<SourceUnit>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let repos = self.repo_paths.list_repo_uris(&*self.ctx.fs)?;
        self.fan_out(token, repos, false, |store, token| store.units(token))
    }
}

impl RepoStore for FsMultiRepoStore {
    fn commit_ids(&self, token: &CancellationToken) -> Result<Vec<String>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let repos = self.repo_paths.list_repo_uris(&*self.ctx.fs)?;
        self.fan_out(token, repos, false, |store, token| store.commit_ids(token))
    }
}

impl MultiRepoStore for FsMultiRepoStore {
    fn repos(&self, token: &CancellationToken) -> Result<Vec<String>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.repo_paths.list_repo_uris(&*self.ctx.fs)
    }
}

impl MultiRepoImporter for FsMultiRepoStore {
    fn import_unit(
        &self,
        repo: &str,
        commit_id: &str,
        unit: &SourceUnit,
        output: GraphOutput,
    ) -> Result<()> {
        if repo.is_empty() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "repo uri must be non-empty",
            )));
        }
        self.repo_store(repo).import_unit(commit_id, unit, output)
    }
}
