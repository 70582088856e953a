use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stratum_graph::{Ann, Def, Doc, GraphOutput, Ref, RefSet};
use stratum_vfs::{path as vpath, FileSystem, VfsFile};
use tokio_util::sync::CancellationToken;

use crate::codec::{self, ByteRange};
use crate::error::{Result, StoreError};
use crate::filter::{
    def_filters_for_unit, narrowed, narrowed_ref_defs, ref_filters_for_unit, DefFilter, RefFilter,
};
use crate::idx::{
    read_index, write_index, DefPathIndex, IndexKind, RefDefIndex, RefFileIndex, DEF_PATHS_FILE,
    REF_DEFS_FILE, REF_FILES_FILE,
};
use crate::index_cache::CachedIndex;
use crate::scope::{
    clean_for_import, expand_ann, expand_def, expand_doc, expand_ref, UnitScope,
};
use crate::{StoreConfig, StoreContext, UnitImporter, UnitStore};

const DEF_DATA_FILE: &str = "def.dat";
const REF_DATA_FILE: &str = "ref.dat";
const DOC_DATA_FILE: &str = "doc.dat";
const ANN_DATA_FILE: &str = "ann.dat";

static STAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores and queries the graph bundle of a single source unit.
///
/// The store knows its full scope `(repo, commit, unit)` and is the sole
/// authority for re-expanding it onto records read from disk: predicates
/// run against the stored (blanked) form, then every returned record gets
/// its scope prefix populated.
#[derive(Debug)]
pub struct FsUnitStore {
    ctx: Arc<StoreContext>,
    dir: String,
    scope: UnitScope,
}

impl FsUnitStore {
    pub fn new(fs: Arc<dyn FileSystem>, dir: impl Into<String>, scope: UnitScope) -> Self {
        Self::with_context(StoreContext::new(fs, StoreConfig::default()), dir.into(), scope)
    }

    pub(crate) fn with_context(ctx: Arc<StoreContext>, dir: String, scope: UnitScope) -> Self {
        Self { ctx, dir, scope }
    }

    pub fn scope(&self) -> &UnitScope {
        &self.scope
    }

    fn data_path(&self, name: &str) -> String {
        vpath::join(&self.dir, name)
    }

    /// Opens a data file, mapping a missing file to `NotExist` for the
    /// whole unit.
    fn open_data(&self, name: &str) -> Result<Box<dyn VfsFile>> {
        match self.ctx.fs.open(&self.data_path(name)) {
            Ok(f) => Ok(f),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotExist(self.dir.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Loads an index through the per-process cache. `Ok(None)` means the
    /// index file is absent and the caller should scan instead.
    fn load_index(
        &self,
        name: &str,
        parse: impl FnOnce(&dyn FileSystem, &str) -> Result<CachedIndex>,
    ) -> Result<Option<Arc<CachedIndex>>> {
        if let Some(cached) = self.ctx.cache.get(&self.dir, name) {
            return Ok(Some(cached));
        }
        let path = self.data_path(name);
        match parse(&*self.ctx.fs, &path) {
            Ok(index) => {
                let index = Arc::new(index);
                self.ctx.cache.insert(&self.dir, name, Arc::clone(&index));
                Ok(Some(index))
            }
            Err(err) if err.is_not_exist() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn def_path_index(&self) -> Result<Option<Arc<CachedIndex>>> {
        self.load_index(DEF_PATHS_FILE, |fs, path| {
            Ok(CachedIndex::DefPaths(read_index::<DefPathIndex>(
                fs,
                path,
                IndexKind::DefPaths,
            )?))
        })
    }

    fn ref_def_index(&self) -> Result<Option<Arc<CachedIndex>>> {
        self.load_index(REF_DEFS_FILE, |fs, path| {
            Ok(CachedIndex::RefDefs(read_index::<RefDefIndex>(
                fs,
                path,
                IndexKind::RefDefs,
            )?))
        })
    }

    fn ref_file_index(&self) -> Result<Option<Arc<CachedIndex>>> {
        self.load_index(REF_FILES_FILE, |fs, path| {
            Ok(CachedIndex::RefFiles(read_index::<RefFileIndex>(
                fs,
                path,
                IndexKind::RefFiles,
            )?))
        })
    }

    fn scan_defs(&self) -> Result<Vec<Def>> {
        let mut f = self.open_data(DEF_DATA_FILE)?;
        codec::read_all_records(&mut *f, &self.data_path(DEF_DATA_FILE))
    }

    fn scan_refs(&self) -> Result<Vec<Ref>> {
        let mut f = self.open_data(REF_DATA_FILE)?;
        codec::read_all_records(&mut *f, &self.data_path(REF_DATA_FILE))
    }

    /// All docs of the unit, scope re-expanded.
    pub fn docs(&self) -> Result<Vec<Doc>> {
        let mut f = self.open_data(DOC_DATA_FILE)?;
        let mut docs: Vec<Doc> = codec::read_all_records(&mut *f, &self.data_path(DOC_DATA_FILE))?;
        for doc in &mut docs {
            expand_doc(doc, &self.scope);
        }
        Ok(docs)
    }

    /// All anns of the unit, scope re-expanded.
    pub fn anns(&self) -> Result<Vec<Ann>> {
        let mut f = self.open_data(ANN_DATA_FILE)?;
        let mut anns: Vec<Ann> = codec::read_all_records(&mut *f, &self.data_path(ANN_DATA_FILE))?;
        for ann in &mut anns {
            expand_ann(ann, &self.scope);
        }
        Ok(anns)
    }

    fn write_stage(&self, stage: &str, output: &GraphOutput) -> Result<()> {
        let fs = &*self.ctx.fs;
        fs.mkdir_all(stage)?;

        let def_ranges = write_data(fs, &vpath::join(stage, DEF_DATA_FILE), &output.defs)?;
        let ref_ranges = write_data(fs, &vpath::join(stage, REF_DATA_FILE), &output.refs)?;
        write_data(fs, &vpath::join(stage, DOC_DATA_FILE), &output.docs)?;
        write_data(fs, &vpath::join(stage, ANN_DATA_FILE), &output.anns)?;

        write_index(
            fs,
            &vpath::join(stage, DEF_PATHS_FILE),
            IndexKind::DefPaths,
            &DefPathIndex::build(&output.defs, &def_ranges),
        )?;
        write_index(
            fs,
            &vpath::join(stage, REF_DEFS_FILE),
            IndexKind::RefDefs,
            &RefDefIndex::build(&output.refs, &ref_ranges),
        )?;
        if RefFileIndex::should_build(&output.refs) {
            write_index(
                fs,
                &vpath::join(stage, REF_FILES_FILE),
                IndexKind::RefFiles,
                &RefFileIndex::build(&output.refs, &ref_ranges),
            )?;
        }
        Ok(())
    }
}

fn write_data<T: serde::Serialize>(
    fs: &dyn FileSystem,
    path: &str,
    records: &[T],
) -> Result<Vec<ByteRange>> {
    let mut w = fs.create(path)?;
    let ranges = codec::write_records(&mut *w, records, path)?;
    w.flush()?;
    Ok(ranges)
}

impl UnitStore for FsUnitStore {
    fn defs(&self, token: &CancellationToken, filters: &[Arc<dyn DefFilter>]) -> Result<Vec<Def>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let Some(filters) = def_filters_for_unit(filters, &self.scope) else {
            return Ok(Vec::new());
        };
        let wanted_paths = narrowed(filters.iter().map(|f| f.narrowing()), |n| n.def_paths);

        let mut defs: Vec<Def> = match wanted_paths {
            Some(paths) => match self.def_path_index()? {
                Some(cached) => {
                    let CachedIndex::DefPaths(index) = &*cached else {
                        unreachable!("cache key and index kind always agree");
                    };
                    let data_path = self.data_path(DEF_DATA_FILE);
                    let mut f = self.open_data(DEF_DATA_FILE)?;
                    let mut out = Vec::with_capacity(paths.len());
                    for path in &paths {
                        if let Some(offset) = index.offset(path) {
                            out.push(codec::read_record_at(&mut *f, offset, &data_path)?);
                        }
                    }
                    out
                }
                None => self.scan_defs()?,
            },
            None => self.scan_defs()?,
        };

        defs.retain(|d| filters.iter().all(|f| f.select_def(d)));
        for def in &mut defs {
            expand_def(def, &self.scope);
        }
        Ok(defs)
    }

    fn refs(&self, token: &CancellationToken, filters: &[Arc<dyn RefFilter>]) -> Result<Vec<Ref>> {
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let Some(filters) = ref_filters_for_unit(filters, &self.scope)? else {
            return Ok(Vec::new());
        };
        let ref_def_keys = narrowed_ref_defs(filters.iter().map(|f| f.narrowing()));
        let wanted_files = narrowed(filters.iter().map(|f| f.narrowing()), |n| n.files);

        let data_path = self.data_path(REF_DATA_FILE);
        let mut refs: Vec<Ref> = if !ref_def_keys.is_empty() {
            match self.ref_def_index()? {
                Some(cached) => {
                    let CachedIndex::RefDefs(index) = &*cached else {
                        unreachable!("cache key and index kind always agree");
                    };
                    // Conjunction across referent restrictions: the
                    // candidate range is the intersection.
                    let mut range = index.range(&ref_def_keys[0]);
                    for key in &ref_def_keys[1..] {
                        range = match (range, index.range(key)) {
                            (Some(a), Some(b)) => a.intersect(&b),
                            _ => None,
                        };
                    }
                    match range {
                        Some(range) => {
                            let mut f = self.open_data(REF_DATA_FILE)?;
                            codec::read_range_records(&mut *f, range, &data_path)?
                        }
                        None => Vec::new(),
                    }
                }
                None => self.scan_refs()?,
            }
        } else if let Some(files) = &wanted_files {
            match self.ref_file_index()? {
                Some(cached) => {
                    let CachedIndex::RefFiles(index) = &*cached else {
                        unreachable!("cache key and index kind always agree");
                    };
                    let ranges = index.ranges(files);
                    let mut out = Vec::new();
                    if !ranges.is_empty() {
                        let mut f = self.open_data(REF_DATA_FILE)?;
                        for range in ranges {
                            out.extend(codec::read_range_records::<Ref>(
                                &mut *f, range, &data_path,
                            )?);
                        }
                    }
                    out
                }
                // Small units carry no file index; scan instead.
                None => self.scan_refs()?,
            }
        } else {
            self.scan_refs()?
        };

        refs.retain(|r| filters.iter().all(|f| f.select_ref(r)));
        for r in &mut refs {
            expand_ref(r, &self.scope);
        }
        Ok(refs)
    }
}

impl UnitImporter for FsUnitStore {
    /// Imports a bundle, overwriting all existing data for the unit.
    ///
    /// The bundle is written into a staging sibling directory which is
    /// swapped in only once every data file and index is complete; a
    /// failed import leaves the store untouched.
    fn import(&self, mut output: GraphOutput) -> Result<()> {
        clean_for_import(&mut output, &self.scope);

        let mut seen = RefSet::new();
        for r in &output.refs {
            if seen.add_and_check_unique(r) {
                return Err(StoreError::Duplicate {
                    key: Box::new(r.key()),
                });
            }
        }
        output.refs.sort_by_cached_key(|r| r.key());

        let stage = format!(
            "{}.stage.{}.{}",
            self.dir,
            std::process::id(),
            STAGE_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        if let Err(err) = self.write_stage(&stage, &output) {
            let _ = self.ctx.fs.remove_all(&stage);
            return Err(err);
        }

        self.ctx.fs.remove_all(&self.dir)?;
        self.ctx.fs.rename(&stage, &self.dir)?;
        self.ctx.cache.invalidate_dir(&self.dir);

        tracing::debug!(
            target: "stratum::store",
            dir = %self.dir,
            defs = output.defs.len(),
            refs = output.refs.len(),
            docs = output.docs.len(),
            anns = output.anns.len(),
            "imported unit bundle"
        );
        Ok(())
    }
}
