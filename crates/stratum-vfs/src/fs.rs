use std::fmt;
use std::io::{self, Read, Seek, Write};

/// Read handle returned by [`FileSystem::open`].
///
/// Handles are independent: concurrent readers of distinct files (or the
/// same file through separate handles) do not observe each other.
pub trait VfsFile: Read + Seek + Send {}

impl<T: Read + Seek + Send> VfsFile for T {}

/// Write handle returned by [`FileSystem::create`].
///
/// A successful create → write → flush → drop sequence makes the file
/// visible and readable under its final name. No stronger atomicity is
/// guaranteed.
pub trait VfsWriter: Write + Send {}

impl<T: Write + Send> VfsWriter for T {}

/// Basic metadata for a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileMeta {
    pub len: u64,
    pub is_dir: bool,
}

/// Filesystem abstraction the store is written against.
///
/// The trait is intentionally small so it can be implemented for
/// different backends. All paths are `/`-separated and relative to the
/// filesystem root; absolute paths and `..` segments are rejected.
/// Operations on missing paths fail with `io::ErrorKind::NotFound` except
/// where noted.
pub trait FileSystem: Send + Sync + fmt::Debug {
    fn open(&self, path: &str) -> io::Result<Box<dyn VfsFile>>;

    /// Creates (or truncates) a file. The parent directory must exist.
    fn create(&self, path: &str) -> io::Result<Box<dyn VfsWriter>>;

    fn stat(&self, path: &str) -> io::Result<FileMeta>;

    /// Creates a directory and any missing ancestors.
    fn mkdir_all(&self, path: &str) -> io::Result<()>;

    /// Lists the entries directly under `path`, as full paths, sorted.
    fn read_dir(&self, path: &str) -> io::Result<Vec<String>>;

    /// Returns every file path under `root` (recursively), sorted.
    fn walk(&self, root: &str) -> io::Result<Vec<String>>;

    /// Renames a file or directory tree. The destination must not exist.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Removes a file or directory tree. Missing paths are not an error.
    fn remove_all(&self, path: &str) -> io::Result<()>;
}
