#![allow(dead_code)]

use std::sync::Arc;

use stratum_graph::{Def, GraphOutput, Ref, SourceUnit};
use stratum_store::CancellationToken;
use stratum_vfs::{FileSystem, MemFs};

pub fn token() -> CancellationToken {
    CancellationToken::new()
}

pub fn mem_fs() -> Arc<MemFs> {
    Arc::new(MemFs::new())
}

pub fn def(path: &str, file: &str, start: u32) -> Def {
    Def {
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        kind: "func".to_string(),
        file: file.to_string(),
        def_start: start,
        def_end: start + 4,
        exported: true,
        ..Def::default()
    }
}

/// A ref to a def in the referrer's own unit.
pub fn own_ref(def_path: &str, file: &str, start: u32) -> Ref {
    Ref {
        def_path: def_path.to_string(),
        file: file.to_string(),
        start,
        end: start + 4,
        ..Ref::default()
    }
}

/// A ref to a def in another unit of the same repo.
pub fn cross_ref(def_path: &str, def_unit: &str, file: &str, start: u32) -> Ref {
    Ref {
        def_unit: def_unit.to_string(),
        ..own_ref(def_path, file, start)
    }
}

pub fn unit(unit_type: &str, name: &str) -> SourceUnit {
    SourceUnit::new(unit_type, name)
}

/// One def at `a.go[10,14)` and one ref to it at `a.go[20,24)`.
pub fn small_bundle() -> GraphOutput {
    GraphOutput {
        defs: vec![def("X", "a.go", 10)],
        refs: vec![own_ref("X", "a.go", 20)],
        ..GraphOutput::default()
    }
}

/// Sort keys so unordered fan-out results can be compared.
pub fn sort_defs(defs: &mut [Def]) {
    defs.sort_by_key(|d| {
        (
            d.repo.clone(),
            d.commit_id.clone(),
            d.unit_type.clone(),
            d.unit.clone(),
            d.path.clone(),
        )
    });
}

pub fn sort_refs(refs: &mut [Ref]) {
    refs.sort_by_key(|r| {
        (
            r.repo.clone(),
            r.commit_id.clone(),
            r.unit.clone(),
            r.def_path.clone(),
            r.file.clone(),
            r.start,
        )
    });
}

/// Splits a raw length-delimited `.dat` file into its JSON record bodies.
pub fn raw_records(fs: &dyn FileSystem, path: &str) -> Vec<serde_json::Value> {
    use std::io::Read;

    let mut bytes = Vec::new();
    fs.open(path).unwrap().read_to_end(&mut bytes).unwrap();

    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        out.push(serde_json::from_slice(&bytes[pos..pos + len]).unwrap());
        pos += len;
    }
    out
}

/// Truncates a stored file to `len` bytes in place.
pub fn truncate_file(fs: &dyn FileSystem, path: &str, len: usize) {
    use std::io::{Read, Write};

    let mut bytes = Vec::new();
    fs.open(path).unwrap().read_to_end(&mut bytes).unwrap();
    bytes.truncate(len);
    let mut w = fs.create(path).unwrap();
    w.write_all(&bytes).unwrap();
    w.flush().unwrap();
}
