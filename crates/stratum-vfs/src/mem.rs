use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Write};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::fs::{FileMeta, FileSystem, VfsFile, VfsWriter};
use crate::path as vpath;

/// In-memory filesystem for tests and ephemeral stores.
///
/// Clones share the same underlying state. Directories exist implicitly
/// for every stored file; `mkdir_all` additionally records empty
/// directories so they are visible to `stat`/`read_dir`.
#[derive(Debug, Clone, Default)]
pub struct MemFs {
    inner: Arc<RwLock<MemInner>>,
}

#[derive(Debug, Default)]
struct MemInner {
    files: BTreeMap<String, Arc<Vec<u8>>>,
    dirs: BTreeSet<String>,
}

impl MemInner {
    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() || self.dirs.contains(path) {
            return true;
        }
        let prefix = format!("{path}/");
        self.files.range(prefix.clone()..).next().is_some_and(|(p, _)| p.starts_with(&prefix))
            || self.dirs.range(prefix.clone()..).next().is_some_and(|p| p.starts_with(&prefix))
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(path: &str) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("no such path: {path:?}"))
    }

    fn publish(&self, path: &str, bytes: Vec<u8>) {
        let mut inner = self.inner.write();
        for anc in ancestors(path) {
            inner.dirs.insert(anc);
        }
        inner.files.insert(path.to_string(), Arc::new(bytes));
    }
}

/// All strict ancestors of `path`, nearest last.
fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = vpath::parent(path);
    while !cur.is_empty() {
        out.push(cur.to_string());
        cur = vpath::parent(cur);
    }
    out
}

/// `Cursor` target that keeps the published file contents alive.
#[derive(Debug)]
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Buffers writes and publishes the file on flush or drop.
#[derive(Debug)]
struct MemWriter {
    fs: MemFs,
    path: String,
    buf: Vec<u8>,
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.fs.publish(&self.path, self.buf.clone());
        Ok(())
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        self.fs.publish(&self.path, std::mem::take(&mut self.buf));
    }
}

impl FileSystem for MemFs {
    fn open(&self, path: &str) -> io::Result<Box<dyn VfsFile>> {
        let inner = self.inner.read();
        let bytes = inner.files.get(path).ok_or_else(|| Self::not_found(path))?;
        Ok(Box::new(Cursor::new(SharedBytes(Arc::clone(bytes)))))
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn VfsWriter>> {
        vpath::validate(path).map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;
        if path.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty file path"));
        }
        Ok(Box::new(MemWriter {
            fs: self.clone(),
            path: path.to_string(),
            buf: Vec::new(),
        }))
    }

    fn stat(&self, path: &str) -> io::Result<FileMeta> {
        let inner = self.inner.read();
        if let Some(bytes) = inner.files.get(path) {
            return Ok(FileMeta {
                len: bytes.len() as u64,
                is_dir: false,
            });
        }
        if inner.is_dir(path) {
            return Ok(FileMeta { len: 0, is_dir: true });
        }
        Err(Self::not_found(path))
    }

    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        vpath::validate(path).map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;
        let mut inner = self.inner.write();
        if !path.is_empty() {
            inner.dirs.insert(path.to_string());
            for anc in ancestors(path) {
                inner.dirs.insert(anc);
            }
        }
        Ok(())
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let inner = self.inner.read();
        if !inner.is_dir(path) {
            return Err(Self::not_found(path));
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut out = BTreeSet::new();
        for name in inner.files.keys().chain(inner.dirs.iter()) {
            if let Some(rest) = name.strip_prefix(&prefix) {
                if rest.is_empty() {
                    continue;
                }
                let child = rest.split('/').next().unwrap_or(rest);
                out.insert(vpath::join(path, child));
            }
        }
        Ok(out.into_iter().collect())
    }

    fn walk(&self, root: &str) -> io::Result<Vec<String>> {
        let inner = self.inner.read();
        if !inner.is_dir(root) {
            return Err(Self::not_found(root));
        }
        let prefix = if root.is_empty() {
            String::new()
        } else {
            format!("{root}/")
        };
        Ok(inner
            .files
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut inner = self.inner.write();
        if let Some(bytes) = inner.files.remove(from) {
            inner.files.insert(to.to_string(), bytes);
            return Ok(());
        }
        if !inner.is_dir(from) {
            return Err(Self::not_found(from));
        }
        let from_prefix = format!("{from}/");
        let moved: Vec<(String, Arc<Vec<u8>>)> = inner
            .files
            .iter()
            .filter(|(p, _)| p.starts_with(&from_prefix))
            .map(|(p, b)| (p.clone(), Arc::clone(b)))
            .collect();
        for (old, bytes) in moved {
            inner.files.remove(&old);
            let new = format!("{to}/{}", &old[from_prefix.len()..]);
            inner.files.insert(new, bytes);
        }
        let moved_dirs: Vec<String> = inner
            .dirs
            .iter()
            .filter(|p| *p == from || p.starts_with(&from_prefix))
            .cloned()
            .collect();
        for old in moved_dirs {
            inner.dirs.remove(&old);
            let new = if old == from {
                to.to_string()
            } else {
                format!("{to}/{}", &old[from_prefix.len()..])
            };
            inner.dirs.insert(new);
        }
        for anc in ancestors(to) {
            inner.dirs.insert(anc);
        }
        Ok(())
    }

    fn remove_all(&self, path: &str) -> io::Result<()> {
        let mut inner = self.inner.write();
        inner.files.remove(path);
        let prefix = format!("{path}/");
        inner.files.retain(|p, _| !p.starts_with(&prefix));
        inner.dirs.retain(|p| p != path && !p.starts_with(&prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn create_publishes_on_drop() {
        let fs = MemFs::new();
        {
            let mut w = fs.create("a/b/f.dat").unwrap();
            w.write_all(b"data").unwrap();
        }
        let mut buf = Vec::new();
        fs.open("a/b/f.dat").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"data");
        assert!(fs.stat("a/b").unwrap().is_dir);
    }

    #[test]
    fn rename_moves_directory_trees() {
        let fs = MemFs::new();
        fs.create("u.stage/def.dat").unwrap().write_all(b"x").unwrap();
        fs.create("u.stage/sub/ref.dat").unwrap().write_all(b"y").unwrap();

        fs.rename("u.stage", "u").unwrap();

        assert!(fs.open("u/def.dat").is_ok());
        assert!(fs.open("u/sub/ref.dat").is_ok());
        assert!(fs.stat("u.stage").is_err());
    }

    #[test]
    fn read_dir_lists_immediate_children() {
        let fs = MemFs::new();
        fs.create("r/c1/t/u.unit").unwrap().write_all(b"{}").unwrap();
        fs.create("r/c2/t/u.unit").unwrap().write_all(b"{}").unwrap();
        fs.mkdir_all("r/empty").unwrap();

        let entries = fs.read_dir("r").unwrap();
        assert_eq!(entries, vec!["r/c1".to_string(), "r/c2".to_string(), "r/empty".to_string()]);
    }

    #[test]
    fn walk_is_rooted_and_sorted() {
        let fs = MemFs::new();
        fs.create("a/2.dat").unwrap().write_all(b"x").unwrap();
        fs.create("a/1.dat").unwrap().write_all(b"x").unwrap();
        fs.create("b/3.dat").unwrap().write_all(b"x").unwrap();

        assert_eq!(fs.walk("a").unwrap(), vec!["a/1.dat".to_string(), "a/2.dat".to_string()]);
        assert!(fs.walk("missing").is_err());
    }

    #[test]
    fn remove_all_is_idempotent() {
        let fs = MemFs::new();
        fs.create("a/f.dat").unwrap().write_all(b"x").unwrap();
        fs.remove_all("a").unwrap();
        fs.remove_all("a").unwrap();
        assert!(fs.stat("a").is_err());
    }
}
