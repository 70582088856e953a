use stratum_graph::{GraphOutput, UnitKey};

/// Fully-qualified identity of one unit within the store.
///
/// The unit store is constructed with its scope and is the sole authority
/// for re-expanding it onto records read from disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitScope {
    pub repo: String,
    pub commit_id: String,
    pub unit: UnitKey,
}

impl UnitScope {
    pub fn new(
        repo: impl Into<String>,
        commit_id: impl Into<String>,
        unit_type: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            commit_id: commit_id.into(),
            unit: UnitKey::new(unit_type, unit),
        }
    }
}

/// Blanks the scope prefix of every record in `output` so that stored
/// records omit what the unit's location already says. Ref referent fields
/// equal to the referrer's own scope are blanked too; blank means "same as
/// the referrer".
pub(crate) fn clean_for_import(output: &mut GraphOutput, scope: &UnitScope) {
    for def in &mut output.defs {
        def.repo.clear();
        def.commit_id.clear();
        def.unit_type.clear();
        def.unit.clear();
    }
    for r in &mut output.refs {
        r.repo.clear();
        r.commit_id.clear();
        r.unit_type.clear();
        r.unit.clear();
        if !scope.repo.is_empty() && r.def_repo == scope.repo {
            r.def_repo.clear();
        }
        if !scope.unit.unit_type.is_empty() && r.def_unit_type == scope.unit.unit_type {
            r.def_unit_type.clear();
        }
        if !scope.unit.name.is_empty() && r.def_unit == scope.unit.name {
            r.def_unit.clear();
        }
    }
    for doc in &mut output.docs {
        doc.repo.clear();
        doc.commit_id.clear();
        doc.unit_type.clear();
        doc.unit.clear();
    }
    for ann in &mut output.anns {
        ann.repo.clear();
        ann.commit_id.clear();
        ann.unit_type.clear();
        ann.unit.clear();
    }
}

pub(crate) fn expand_def(def: &mut stratum_graph::Def, scope: &UnitScope) {
    def.repo = scope.repo.clone();
    def.commit_id = scope.commit_id.clone();
    def.unit_type = scope.unit.unit_type.clone();
    def.unit = scope.unit.name.clone();
}

pub(crate) fn expand_ref(r: &mut stratum_graph::Ref, scope: &UnitScope) {
    r.repo = scope.repo.clone();
    r.commit_id = scope.commit_id.clone();
    r.unit_type = scope.unit.unit_type.clone();
    r.unit = scope.unit.name.clone();
    if r.def_repo.is_empty() {
        r.def_repo = scope.repo.clone();
    }
    if r.def_unit_type.is_empty() {
        r.def_unit_type = scope.unit.unit_type.clone();
    }
    if r.def_unit.is_empty() {
        r.def_unit = scope.unit.name.clone();
    }
}

pub(crate) fn expand_doc(doc: &mut stratum_graph::Doc, scope: &UnitScope) {
    doc.repo = scope.repo.clone();
    doc.commit_id = scope.commit_id.clone();
    doc.unit_type = scope.unit.unit_type.clone();
    doc.unit = scope.unit.name.clone();
}

pub(crate) fn expand_ann(ann: &mut stratum_graph::Ann, scope: &UnitScope) {
    ann.repo = scope.repo.clone();
    ann.commit_id = scope.commit_id.clone();
    ann.unit_type = scope.unit.unit_type.clone();
    ann.unit = scope.unit.name.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_graph::Ref;

    #[test]
    fn clean_blanks_scope_and_same_scope_referents() {
        let scope = UnitScope::new("r1", "c1", "t", "u1");
        let mut output = GraphOutput {
            refs: vec![
                Ref {
                    def_repo: "r1".to_string(),
                    def_unit_type: "t".to_string(),
                    def_unit: "u1".to_string(),
                    def_path: "X".to_string(),
                    repo: "r1".to_string(),
                    commit_id: "c1".to_string(),
                    unit_type: "t".to_string(),
                    unit: "u1".to_string(),
                    file: "a.go".to_string(),
                    start: 1,
                    end: 2,
                    ..Ref::default()
                },
                Ref {
                    def_repo: "r2".to_string(),
                    def_unit_type: "t".to_string(),
                    def_unit: "other".to_string(),
                    def_path: "Y".to_string(),
                    file: "a.go".to_string(),
                    start: 3,
                    end: 4,
                    ..Ref::default()
                },
            ],
            ..GraphOutput::default()
        };

        clean_for_import(&mut output, &scope);

        let same_unit = &output.refs[0];
        assert!(same_unit.repo.is_empty());
        assert!(same_unit.commit_id.is_empty());
        assert!(same_unit.def_repo.is_empty());
        assert!(same_unit.def_unit.is_empty());

        let cross = &output.refs[1];
        assert_eq!(cross.def_repo, "r2");
        assert_eq!(cross.def_unit, "other");
        // Same unit type as the referrer is still blanked.
        assert!(cross.def_unit_type.is_empty());
    }

    #[test]
    fn expand_restores_referent_defaults() {
        let scope = UnitScope::new("r1", "c1", "t", "u1");
        let mut r = Ref {
            def_path: "X".to_string(),
            file: "a.go".to_string(),
            start: 1,
            end: 2,
            ..Ref::default()
        };
        expand_ref(&mut r, &scope);
        assert_eq!(r.repo, "r1");
        assert_eq!(r.commit_id, "c1");
        assert_eq!(r.def_repo, "r1");
        assert_eq!(r.def_unit_type, "t");
        assert_eq!(r.def_unit, "u1");
    }
}
