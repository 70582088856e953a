use std::io;
use std::sync::Arc;

use stratum_graph::{Def, GraphOutput, Ref, SourceUnit};
use stratum_vfs::{path as vpath, FileSystem};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};
use crate::fanout;
use crate::filter::{def_filters_for_unit, narrowed, ref_filters_for_unit, DefFilter, RefFilter};
use crate::scope::UnitScope;
use crate::unit_store::FsUnitStore;
use crate::{StoreConfig, StoreContext, TreeImporter, TreeStore, UnitImporter, UnitStore};

const UNIT_MANIFEST_SUFFIX: &str = ".unit";

/// Fans queries out across the source units of one commit.
///
/// Units are enumerated by decoding the `<unit-type>/<unit-name>.unit`
/// manifests below the commit directory; each surviving unit is queried on
/// the shared worker pool with a filter list rewritten for that unit.
#[derive(Debug)]
pub struct FsTreeStore {
    ctx: Arc<StoreContext>,
    dir: String,
    repo: String,
    commit_id: String,
}

impl FsTreeStore {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        dir: impl Into<String>,
        repo: impl Into<String>,
        commit_id: impl Into<String>,
    ) -> Self {
        Self::with_context(
            StoreContext::new(fs, StoreConfig::default()),
            dir.into(),
            repo.into(),
            commit_id.into(),
        )
    }

    pub(crate) fn with_context(
        ctx: Arc<StoreContext>,
        dir: String,
        repo: String,
        commit_id: String,
    ) -> Self {
        Self {
            ctx,
            dir,
            repo,
            commit_id,
        }
    }

    /// Decoded unit manifests paired with their data directories.
    fn list_units(&self) -> Result<Vec<(SourceUnit, String)>> {
        let files = match self.ctx.fs.walk(&self.dir) {
            Ok(files) => files,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotExist(self.dir.clone()))
            }
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::new();
        for path in files {
            let Some(data_dir) = path.strip_suffix(UNIT_MANIFEST_SUFFIX) else {
                continue;
            };
            let mut f = self.ctx.fs.open(&path)?;
            let unit: SourceUnit = serde_json::from_reader(&mut f)
                .map_err(|err| StoreError::corrupt(&path, format!("decode unit manifest: {err}")))?;
            out.push((unit, data_dir.to_string()));
        }
        Ok(out)
    }

    /// Units surviving any `ByUnits` narrowing.
    fn selected_units<'a>(
        &self,
        narrowings: impl Iterator<Item = crate::filter::Narrowing<'a>>,
    ) -> Result<Vec<(SourceUnit, String)>> {
        let mut units = self.list_units()?;
        if let Some(wanted) = narrowed(narrowings, |n| n.units) {
            units.retain(|(u, _)| wanted.contains(&u.key()));
        }
        Ok(units)
    }

    fn unit_scope(&self, unit: &SourceUnit) -> UnitScope {
        UnitScope {
            repo: self.repo.clone(),
            commit_id: self.commit_id.clone(),
            unit: unit.key(),
        }
    }
}

impl UnitStore for FsTreeStore {
    fn defs(&self, token: &CancellationToken, filters: &[Arc<dyn DefFilter>]) -> Result<Vec<Def>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let units = self.selected_units(filters.iter().map(|f| f.narrowing()))?;

        let jobs: Vec<_> = units
            .into_iter()
            .map(|(unit, data_dir)| {
                let ctx = Arc::clone(&self.ctx);
                let filters = filters.to_vec();
                let scope = self.unit_scope(&unit);
                move |token: &CancellationToken| {
                    let Some(per_unit) = def_filters_for_unit(&filters, &scope) else {
                        return Ok(Vec::new());
                    };
                    let store = FsUnitStore::with_context(ctx, data_dir, scope);
                    match store.defs(token, &per_unit) {
                        Err(err) if err.is_not_exist() => Ok(Vec::new()),
                        other => other,
                    }
                }
            })
            .collect();
        fanout::run(self.ctx.pool(), token, jobs)
    }

    fn refs(&self, token: &CancellationToken, filters: &[Arc<dyn RefFilter>]) -> Result<Vec<Ref>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let units = self.selected_units(filters.iter().map(|f| f.narrowing()))?;
        tracing::debug!(
            target: "stratum::store",
            commit_id = %self.commit_id,
            units = units.len(),
            "ref fan-out across units"
        );

        let jobs: Vec<_> = units
            .into_iter()
            .map(|(unit, data_dir)| {
                let ctx = Arc::clone(&self.ctx);
                let filters = filters.to_vec();
                let scope = self.unit_scope(&unit);
                move |token: &CancellationToken| {
                    // Rebinds implied-unit filters to this unit; nothing
                    // mutable is shared across workers.
                    let Some(per_unit) = ref_filters_for_unit(&filters, &scope)? else {
                        return Ok(Vec::new());
                    };
                    let store = FsUnitStore::with_context(ctx, data_dir, scope);
                    match store.refs(token, &per_unit) {
                        Err(err) if err.is_not_exist() => Ok(Vec::new()),
                        other => other,
                    }
                }
            })
            .collect();
        fanout::run(self.ctx.pool(), token, jobs)
    }
}

impl TreeStore for FsTreeStore {
    fn units(&self, token: &CancellationToken) -> Result<Vec<SourceUnit>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(self.list_units()?.into_iter().map(|(u, _)| u).collect())
    }
}

impl TreeImporter for FsTreeStore {
    fn import_unit(&self, unit: &SourceUnit, output: GraphOutput) -> Result<()> {
        if unit.name.is_empty() || unit.unit_type.is_empty() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "source unit name and type must be non-empty",
            )));
        }

        let data_dir = vpath::join(&vpath::join(&self.dir, &unit.unit_type), &unit.name);
        let scope = self.unit_scope(unit);
        FsUnitStore::with_context(Arc::clone(&self.ctx), data_dir.clone(), scope).import(output)?;

        // The manifest is written last so unit listings never observe a
        // unit without data.
        let manifest_path = format!("{data_dir}{UNIT_MANIFEST_SUFFIX}");
        let mut w = self.ctx.fs.create(&manifest_path)?;
        serde_json::to_writer(&mut w, unit)
            .map_err(|err| StoreError::corrupt(&manifest_path, format!("encode unit manifest: {err}")))?;
        w.flush()?;
        Ok(())
    }
}
