use serde::{Deserialize, Serialize};

use crate::{Ann, Def, Doc, Ref};

/// Everything the analyzer produced for one source unit at one commit.
///
/// This is the unit of import: the store replaces a unit's data wholesale
/// with the contents of one bundle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GraphOutput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defs: Vec<Def>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<Ref>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<Doc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anns: Vec<Ann>,
}

impl GraphOutput {
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty() && self.refs.is_empty() && self.docs.is_empty() && self.anns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bundle_round_trip_with_omitted_sections() {
        let bundle = GraphOutput {
            defs: vec![Def {
                path: "X".to_string(),
                file: "a.go".to_string(),
                def_start: 10,
                def_end: 14,
                ..Def::default()
            }],
            refs: vec![Ref {
                def_path: "X".to_string(),
                file: "a.go".to_string(),
                start: 20,
                end: 24,
                ..Ref::default()
            }],
            ..GraphOutput::default()
        };

        let json = serde_json::to_value(&bundle).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("Docs"));
        assert!(!obj.contains_key("Anns"));

        let back: GraphOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back, bundle);
    }
}
