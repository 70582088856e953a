use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::fs::{FileMeta, FileSystem, VfsFile, VfsWriter};
use crate::path as vpath;

/// Filesystem rooted at a real directory.
///
/// Store paths are mapped onto OS paths below `root`; nothing outside the
/// root is ever touched.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn os_path(&self, path: &str) -> io::Result<PathBuf> {
        vpath::validate(path)
            .map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;
        let mut out = self.root.clone();
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            out.push(seg);
        }
        Ok(out)
    }

    fn rel_path(&self, path: &Path) -> io::Result<String> {
        let rel = path.strip_prefix(&self.root).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path {path:?} is outside the filesystem root"),
            )
        })?;
        let segs: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(segs.join("/"))
    }
}

impl FileSystem for LocalFs {
    fn open(&self, path: &str) -> io::Result<Box<dyn VfsFile>> {
        let file = fs::File::open(self.os_path(path)?)?;
        Ok(Box::new(file))
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn VfsWriter>> {
        let file = fs::File::create(self.os_path(path)?)?;
        Ok(Box::new(io::BufWriter::new(file)))
    }

    fn stat(&self, path: &str) -> io::Result<FileMeta> {
        let meta = fs::metadata(self.os_path(path)?)?;
        Ok(FileMeta {
            len: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn mkdir_all(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.os_path(path)?)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.os_path(path)?)? {
            out.push(self.rel_path(&entry?.path())?);
        }
        out.sort();
        Ok(out)
    }

    fn walk(&self, root: &str) -> io::Result<Vec<String>> {
        let base = self.os_path(root)?;
        if !base.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such directory: {root:?}"),
            ));
        }
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&base) {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_file() {
                out.push(self.rel_path(entry.path())?);
            }
        }
        out.sort();
        Ok(out)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.os_path(from)?, self.os_path(to)?)
    }

    fn remove_all(&self, path: &str) -> io::Result<()> {
        let target = self.os_path(path)?;
        let result = match fs::metadata(&target) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&target),
            Ok(_) => fs::remove_file(&target),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        match result {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn create_write_close_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());

        fs.mkdir_all("a/b").unwrap();
        let mut w = fs.create("a/b/f.dat").unwrap();
        w.write_all(b"hello").unwrap();
        w.flush().unwrap();
        drop(w);

        let mut buf = String::new();
        fs.open("a/b/f.dat").unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");
        assert_eq!(fs.stat("a/b/f.dat").unwrap().len, 5);
    }

    #[test]
    fn paths_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        assert!(fs.open("../etc/passwd").is_err());
        assert!(fs.open("/etc/passwd").is_err());
    }
}
