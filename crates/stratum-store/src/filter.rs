//! Filters and the composition algebra that narrows queries per tier.
//!
//! Filters are capabilities rather than data: every filter carries a
//! predicate, and may additionally declare which fan-out dimension it
//! restricts via [`Narrowing`]. Tiers consult the narrowing record to skip
//! children entirely and to route predicates onto indexes; filters without
//! capabilities are opaque and only their predicate runs, against every
//! candidate record.
//!
//! Predicates run on the stored (scope-blanked) form of a record before
//! the owning unit store re-expands its scope prefix. A blank scope field
//! therefore always passes a scope-dimension predicate: the surrounding
//! tier already vouched for it.

use std::sync::Arc;

use stratum_graph::{Def, Ref, RefDefKey, UnitKey};

use crate::error::{Result, StoreError};
use crate::scope::{expand_ref, UnitScope};

/// Narrowing capabilities a filter may declare.
///
/// `None` in a dimension means "does not restrict it"; an empty slice
/// restricts it to nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Narrowing<'a> {
    pub repos: Option<&'a [String]>,
    pub commit_ids: Option<&'a [String]>,
    pub units: Option<&'a [UnitKey]>,
    pub def_paths: Option<&'a [String]>,
    pub files: Option<&'a [String]>,
    /// Referent restriction, in the form the filter was bound to (see
    /// [`RefFilter::with_implied_unit`]).
    pub ref_def: Option<&'a RefDefKey>,
}

/// Predicate over defs, with optional narrowing capabilities.
pub trait DefFilter: Send + Sync {
    fn select_def(&self, def: &Def) -> bool;

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing::default()
    }
}

/// Predicate over refs, with optional narrowing capabilities.
pub trait RefFilter: Send + Sync {
    fn select_ref(&self, r: &Ref) -> bool;

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing::default()
    }

    /// True when this filter interprets referent fields relative to the
    /// unit being queried. Such filters must be rebound (cloned) for each
    /// unit a fan-out visits; they are never shared across workers.
    fn implied_unit_capable(&self) -> bool {
        false
    }

    /// Returns a copy of this filter bound to `scope`. Filters reporting
    /// [`RefFilter::implied_unit_capable`] must implement this; returning
    /// `None` there is a programmer error surfaced as
    /// [`StoreError::UnrecognizedFilter`].
    fn with_implied_unit(&self, scope: &UnitScope) -> Option<Arc<dyn RefFilter>> {
        let _ = scope;
        None
    }

    /// Short name used in error messages.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Restricts the repo dimension; collapses the multi-repo fan-out.
#[derive(Clone, Debug)]
pub struct ByReposFilter {
    repos: Vec<String>,
}

pub fn by_repos<I, S>(repos: I) -> Arc<ByReposFilter>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Arc::new(ByReposFilter {
        repos: repos.into_iter().map(Into::into).collect(),
    })
}

impl DefFilter for ByReposFilter {
    fn select_def(&self, def: &Def) -> bool {
        def.repo.is_empty() || self.repos.contains(&def.repo)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            repos: Some(&self.repos),
            ..Narrowing::default()
        }
    }
}

impl RefFilter for ByReposFilter {
    fn select_ref(&self, r: &Ref) -> bool {
        r.repo.is_empty() || self.repos.contains(&r.repo)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            repos: Some(&self.repos),
            ..Narrowing::default()
        }
    }

    fn name(&self) -> &'static str {
        "ByRepos"
    }
}

/// Restricts the commit dimension; collapses the per-repo fan-out.
#[derive(Clone, Debug)]
pub struct ByCommitIdsFilter {
    commit_ids: Vec<String>,
}

pub fn by_commit_ids<I, S>(commit_ids: I) -> Arc<ByCommitIdsFilter>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Arc::new(ByCommitIdsFilter {
        commit_ids: commit_ids.into_iter().map(Into::into).collect(),
    })
}

impl DefFilter for ByCommitIdsFilter {
    fn select_def(&self, def: &Def) -> bool {
        def.commit_id.is_empty() || self.commit_ids.contains(&def.commit_id)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            commit_ids: Some(&self.commit_ids),
            ..Narrowing::default()
        }
    }
}

impl RefFilter for ByCommitIdsFilter {
    fn select_ref(&self, r: &Ref) -> bool {
        r.commit_id.is_empty() || self.commit_ids.contains(&r.commit_id)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            commit_ids: Some(&self.commit_ids),
            ..Narrowing::default()
        }
    }

    fn name(&self) -> &'static str {
        "ByCommitIds"
    }
}

/// Restricts the unit dimension; collapses the per-commit fan-out.
#[derive(Clone, Debug)]
pub struct ByUnitsFilter {
    units: Vec<UnitKey>,
}

pub fn by_units(units: impl IntoIterator<Item = UnitKey>) -> Arc<ByUnitsFilter> {
    Arc::new(ByUnitsFilter {
        units: units.into_iter().collect(),
    })
}

impl ByUnitsFilter {
    fn matches_scope(&self, unit_type: &str, unit: &str) -> bool {
        (unit_type.is_empty() && unit.is_empty())
            || self
                .units
                .iter()
                .any(|u| u.unit_type == unit_type && u.name == unit)
    }
}

impl DefFilter for ByUnitsFilter {
    fn select_def(&self, def: &Def) -> bool {
        self.matches_scope(&def.unit_type, &def.unit)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            units: Some(&self.units),
            ..Narrowing::default()
        }
    }
}

impl RefFilter for ByUnitsFilter {
    fn select_ref(&self, r: &Ref) -> bool {
        self.matches_scope(&r.unit_type, &r.unit)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            units: Some(&self.units),
            ..Narrowing::default()
        }
    }

    fn name(&self) -> &'static str {
        "ByUnits"
    }
}

/// Matches one def by its exact path. Routed onto `def.paths.idx`.
#[derive(Clone, Debug)]
pub struct ByDefPathFilter {
    paths: Vec<String>,
}

pub fn by_def_path(path: impl Into<String>) -> Arc<ByDefPathFilter> {
    Arc::new(ByDefPathFilter {
        paths: vec![path.into()],
    })
}

impl DefFilter for ByDefPathFilter {
    fn select_def(&self, def: &Def) -> bool {
        self.paths.contains(&def.path)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            def_paths: Some(&self.paths),
            ..Narrowing::default()
        }
    }
}

/// Matches defs whose path starts with a prefix. Always a scan.
#[derive(Clone, Debug)]
pub struct ByDefQueryFilter {
    prefix: String,
}

pub fn by_def_query(prefix: impl Into<String>) -> Arc<ByDefQueryFilter> {
    Arc::new(ByDefQueryFilter {
        prefix: prefix.into(),
    })
}

impl DefFilter for ByDefQueryFilter {
    fn select_def(&self, def: &Def) -> bool {
        def.path.starts_with(&self.prefix)
    }
}

/// Restricts the file dimension. Routed onto `ref.files.idx` for refs
/// when the unit built one.
#[derive(Clone, Debug)]
pub struct ByFilesFilter {
    files: Vec<String>,
}

pub fn by_files<I, S>(files: I) -> Arc<ByFilesFilter>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Arc::new(ByFilesFilter {
        files: files.into_iter().map(Into::into).collect(),
    })
}

impl DefFilter for ByFilesFilter {
    fn select_def(&self, def: &Def) -> bool {
        self.files.contains(&def.file)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            files: Some(&self.files),
            ..Narrowing::default()
        }
    }
}

impl RefFilter for ByFilesFilter {
    fn select_ref(&self, r: &Ref) -> bool {
        self.files.contains(&r.file)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            files: Some(&self.files),
            ..Narrowing::default()
        }
    }

    fn name(&self) -> &'static str {
        "ByFiles"
    }
}

/// Restricts refs to those pointing at one def. Routed onto
/// `ref.defs.idx`.
///
/// Blank referent fields in the key mean "the referrer's own scope".
/// Binding the filter to a unit normalizes the key into the stored form
/// for that unit: fields equal to the unit's own scope are blanked,
/// mirroring how refs are laid down at import.
#[derive(Clone, Debug)]
pub struct ByRefDefFilter {
    key: RefDefKey,
    stored: RefDefKey,
}

pub fn by_ref_def(key: RefDefKey) -> Arc<ByRefDefFilter> {
    Arc::new(ByRefDefFilter {
        stored: key.clone(),
        key,
    })
}

/// One referent field: a blank filter value means the referrer's own
/// scope, which is stored blank and expands to the referrer's value.
fn referent_field_matches(filter_val: &str, ref_val: &str, referrer_val: &str) -> bool {
    if filter_val.is_empty() {
        ref_val.is_empty() || ref_val == referrer_val
    } else {
        ref_val == filter_val
    }
}

impl RefFilter for ByRefDefFilter {
    fn select_ref(&self, r: &Ref) -> bool {
        let k = &self.stored;
        r.def_path == k.def_path
            && referent_field_matches(&k.def_repo, &r.def_repo, &r.repo)
            && referent_field_matches(&k.def_unit_type, &r.def_unit_type, &r.unit_type)
            && referent_field_matches(&k.def_unit, &r.def_unit, &r.unit)
    }

    fn narrowing(&self) -> Narrowing<'_> {
        Narrowing {
            ref_def: Some(&self.stored),
            ..Narrowing::default()
        }
    }

    fn implied_unit_capable(&self) -> bool {
        true
    }

    fn with_implied_unit(&self, scope: &UnitScope) -> Option<Arc<dyn RefFilter>> {
        let mut stored = self.key.clone();
        if !scope.repo.is_empty() && stored.def_repo == scope.repo {
            stored.def_repo.clear();
        }
        if !scope.unit.unit_type.is_empty() && stored.def_unit_type == scope.unit.unit_type {
            stored.def_unit_type.clear();
        }
        if !scope.unit.name.is_empty() && stored.def_unit == scope.unit.name {
            stored.def_unit.clear();
        }
        Some(Arc::new(Self {
            key: self.key.clone(),
            stored,
        }))
    }

    fn name(&self) -> &'static str {
        "ByRefDef"
    }
}

/// Opaque def predicate.
pub struct DefFilterFunc {
    f: Arc<dyn Fn(&Def) -> bool + Send + Sync>,
}

pub fn def_filter_fn(f: impl Fn(&Def) -> bool + Send + Sync + 'static) -> Arc<DefFilterFunc> {
    Arc::new(DefFilterFunc { f: Arc::new(f) })
}

impl DefFilter for DefFilterFunc {
    fn select_def(&self, def: &Def) -> bool {
        (self.f)(def)
    }
}

/// Opaque ref predicate over the stored form.
pub struct RefFilterFunc {
    f: Arc<dyn Fn(&Ref) -> bool + Send + Sync>,
}

pub fn ref_filter_fn(f: impl Fn(&Ref) -> bool + Send + Sync + 'static) -> Arc<RefFilterFunc> {
    Arc::new(RefFilterFunc { f: Arc::new(f) })
}

impl RefFilter for RefFilterFunc {
    fn select_ref(&self, r: &Ref) -> bool {
        (self.f)(r)
    }

    fn name(&self) -> &'static str {
        "RefFilterFunc"
    }
}

/// Opaque ref predicate that always sees the fully scope-expanded form of
/// a ref, regardless of which tier evaluates it. The tiers rebind this
/// filter for every unit they visit.
pub struct AbsRefFilterFunc {
    f: Arc<dyn Fn(&Ref) -> bool + Send + Sync>,
    scope: UnitScope,
}

pub fn abs_ref_filter_fn(
    f: impl Fn(&Ref) -> bool + Send + Sync + 'static,
) -> Arc<AbsRefFilterFunc> {
    Arc::new(AbsRefFilterFunc {
        f: Arc::new(f),
        scope: UnitScope::default(),
    })
}

impl RefFilter for AbsRefFilterFunc {
    fn select_ref(&self, r: &Ref) -> bool {
        if r.unit.is_empty() && !self.scope.unit.name.is_empty() {
            let mut abs = r.clone();
            expand_ref(&mut abs, &self.scope);
            (self.f)(&abs)
        } else {
            (self.f)(r)
        }
    }

    fn implied_unit_capable(&self) -> bool {
        true
    }

    fn with_implied_unit(&self, scope: &UnitScope) -> Option<Arc<dyn RefFilter>> {
        Some(Arc::new(Self {
            f: Arc::clone(&self.f),
            scope: scope.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "AbsRefFilterFunc"
    }
}

/// Intersection of one narrowing dimension across a filter list. `None`
/// when no filter restricts it; filters of the same kind compose
/// conjunctively, so disagreement yields an empty intersection.
pub(crate) fn narrowed<'a, T, F>(
    narrowings: impl Iterator<Item = Narrowing<'a>>,
    pick: F,
) -> Option<Vec<T>>
where
    T: Clone + PartialEq + 'a,
    F: Fn(&Narrowing<'a>) -> Option<&'a [T]>,
{
    let mut acc: Option<Vec<T>> = None;
    for narrowing in narrowings {
        if let Some(vals) = pick(&narrowing) {
            acc = Some(match acc {
                None => vals.to_vec(),
                Some(prev) => prev.into_iter().filter(|v| vals.contains(v)).collect(),
            });
        }
    }
    acc
}

/// All referent restrictions in a filter list (conjunctive).
pub(crate) fn narrowed_ref_defs<'a>(
    narrowings: impl Iterator<Item = Narrowing<'a>>,
) -> Vec<RefDefKey> {
    narrowings.filter_map(|n| n.ref_def.cloned()).collect()
}

/// True when a scope-dimension restriction rules this unit out entirely.
/// Blank scope values (a store that does not know its repo) never
/// exclude.
fn scope_excludes(narrowing: &Narrowing<'_>, scope: &UnitScope) -> bool {
    if let Some(repos) = narrowing.repos {
        if !scope.repo.is_empty() && !repos.contains(&scope.repo) {
            return true;
        }
    }
    if let Some(commit_ids) = narrowing.commit_ids {
        if !scope.commit_id.is_empty() && !commit_ids.contains(&scope.commit_id) {
            return true;
        }
    }
    if let Some(units) = narrowing.units {
        if !scope.unit.name.is_empty() && !units.contains(&scope.unit) {
            return true;
        }
    }
    false
}

/// True when the filter restricts only dimensions the unit's identity
/// already pins, so the unit store need not re-evaluate it per record.
fn scope_dims_only(narrowing: &Narrowing<'_>) -> bool {
    (narrowing.repos.is_some() || narrowing.commit_ids.is_some() || narrowing.units.is_some())
        && narrowing.def_paths.is_none()
        && narrowing.files.is_none()
        && narrowing.ref_def.is_none()
}

/// Rewrites a def filter list for one unit. `None` means some filter
/// excludes the unit outright; otherwise filters satisfied by the unit's
/// identity are dropped.
pub(crate) fn def_filters_for_unit(
    filters: &[Arc<dyn DefFilter>],
    scope: &UnitScope,
) -> Option<Vec<Arc<dyn DefFilter>>> {
    let mut out = Vec::with_capacity(filters.len());
    for f in filters {
        let narrowing = f.narrowing();
        if scope_excludes(&narrowing, scope) {
            return None;
        }
        if scope_dims_only(&narrowing) {
            continue;
        }
        out.push(Arc::clone(f));
    }
    Some(out)
}

/// Rewrites a ref filter list for one unit: drops filters satisfied by the
/// unit's identity, reports exclusion as `None`, and rebinds implied-unit
/// filters so no mutable state crosses fan-out workers. A filter that
/// declares the capability without providing a bound clone fails rather
/// than being shared.
pub(crate) fn ref_filters_for_unit(
    filters: &[Arc<dyn RefFilter>],
    scope: &UnitScope,
) -> Result<Option<Vec<Arc<dyn RefFilter>>>> {
    let mut out = Vec::with_capacity(filters.len());
    for f in filters {
        let narrowing = f.narrowing();
        if scope_excludes(&narrowing, scope) {
            return Ok(None);
        }
        if scope_dims_only(&narrowing) {
            continue;
        }
        if f.implied_unit_capable() {
            match f.with_implied_unit(scope) {
                Some(bound) => out.push(bound),
                None => {
                    return Err(StoreError::UnrecognizedFilter { filter: f.name() });
                }
            }
        } else {
            out.push(Arc::clone(f));
        }
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_kind_filters_intersect() {
        let a = by_units([UnitKey::new("t", "u1"), UnitKey::new("t", "u2")]);
        let b = by_units([UnitKey::new("t", "u2")]);
        let filters: Vec<Arc<dyn RefFilter>> = vec![a, b];

        let units = narrowed(filters.iter().map(|f| f.narrowing()), |n| n.units).unwrap();
        assert_eq!(units, vec![UnitKey::new("t", "u2")]);

        let disagreeing: Vec<Arc<dyn RefFilter>> = vec![
            by_units([UnitKey::new("t", "u1")]),
            by_units([UnitKey::new("t", "u2")]),
        ];
        let units = narrowed(disagreeing.iter().map(|f| f.narrowing()), |n| n.units).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn ref_def_key_is_normalized_when_bound() {
        let filter = by_ref_def(RefDefKey {
            def_repo: "r1".to_string(),
            def_unit_type: "t".to_string(),
            def_unit: "u1".to_string(),
            def_path: "Y".to_string(),
        });

        let own = UnitScope::new("r1", "c1", "t", "u1");
        let bound = filter.with_implied_unit(&own).unwrap();
        let stored = bound.narrowing().ref_def.unwrap().clone();
        assert!(stored.def_repo.is_empty());
        assert!(stored.def_unit.is_empty());
        assert_eq!(stored.def_path, "Y");

        let other = UnitScope::new("r1", "c1", "t", "u2");
        let bound = filter.with_implied_unit(&other).unwrap();
        let stored = bound.narrowing().ref_def.unwrap().clone();
        assert_eq!(stored.def_unit, "u1");
    }

    #[test]
    fn unrecognized_implied_unit_filter_fails_rewrite() {
        struct Sneaky;
        impl RefFilter for Sneaky {
            fn select_ref(&self, _: &stratum_graph::Ref) -> bool {
                true
            }
            fn implied_unit_capable(&self) -> bool {
                true
            }
            fn name(&self) -> &'static str {
                "Sneaky"
            }
        }

        let filters: Vec<Arc<dyn RefFilter>> = vec![Arc::new(Sneaky)];
        let err = match ref_filters_for_unit(&filters, &UnitScope::new("r", "c", "t", "u")) {
            Err(e) => e,
            Ok(_) => panic!("expected ref_filters_for_unit to fail"),
        };
        assert!(matches!(
            err,
            StoreError::UnrecognizedFilter { filter: "Sneaky" }
        ));
    }

    #[test]
    fn unit_identity_drops_satisfied_filters_and_excludes_mismatches() {
        let scope = UnitScope::new("r", "c", "t", "u1");

        let satisfied: Vec<Arc<dyn RefFilter>> = vec![by_units([UnitKey::new("t", "u1")])];
        let rewritten = ref_filters_for_unit(&satisfied, &scope).unwrap().unwrap();
        assert!(rewritten.is_empty());

        let mismatched: Vec<Arc<dyn RefFilter>> = vec![by_units([UnitKey::new("t", "u2")])];
        assert!(ref_filters_for_unit(&mismatched, &scope).unwrap().is_none());

        let wrong_repo: Vec<Arc<dyn RefFilter>> = vec![by_repos(["elsewhere"])];
        assert!(ref_filters_for_unit(&wrong_repo, &scope).unwrap().is_none());
    }
}
