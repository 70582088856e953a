use std::fmt;
use std::io;

use stratum_vfs::FileSystem;

use crate::error::Result;

/// Strategy deciding where each repo's data lives under the store root.
///
/// A flat one-directory-per-repo layout collapses under tens of thousands
/// of repositories, so the mapping is pluggable.
pub trait RepoPaths: Send + Sync + fmt::Debug {
    /// Path components of the directory holding `uri`'s data.
    fn paths_for_repo(&self, uri: &str) -> Vec<String>;

    /// Enumerates every repo URI present in `fs`.
    fn list_repo_uris(&self, fs: &dyn FileSystem) -> Result<Vec<String>>;
}

/// The repo's directory is its URI, slash-separated.
#[derive(Debug, Default)]
pub struct DefaultRepoPaths;

impl RepoPaths for DefaultRepoPaths {
    fn paths_for_repo(&self, uri: &str) -> Vec<String> {
        uri.split('/')
            .filter(|seg| !seg.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn list_repo_uris(&self, fs: &dyn FileSystem) -> Result<Vec<String>> {
        scan_repos(fs, "", "")
    }
}

/// Hashes each URI into a fixed 256-bucket prefix (two hex nibbles of the
/// URI hash) so no single directory accumulates every repo. Listing walks
/// all buckets.
#[derive(Debug, Default)]
pub struct EvenlyDistributedRepoPaths;

impl EvenlyDistributedRepoPaths {
    fn bucket(uri: &str) -> String {
        format!("{:02x}", blake3::hash(uri.as_bytes()).as_bytes()[0])
    }
}

impl RepoPaths for EvenlyDistributedRepoPaths {
    fn paths_for_repo(&self, uri: &str) -> Vec<String> {
        let mut out = vec![Self::bucket(uri)];
        out.extend(DefaultRepoPaths.paths_for_repo(uri));
        out
    }

    fn list_repo_uris(&self, fs: &dyn FileSystem) -> Result<Vec<String>> {
        let buckets = match fs.read_dir("") {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::new();
        for bucket in buckets {
            if bucket.len() != 2 || !fs.stat(&bucket)?.is_dir {
                continue;
            }
            out.extend(scan_repos(fs, &bucket, &bucket)?);
        }
        out.sort();
        Ok(out)
    }
}

/// True when `id` has the shape of a commit ID: lowercase hex, between an
/// abbreviated and a full SHA in length. Imports enforce this, so listing
/// can rely on it.
pub(crate) fn valid_commit_id(id: &str) -> bool {
    (4..=40).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// True when `dir` holds the data of one commit: the directory is named
/// like a commit ID and contains at least one unit manifest.
///
/// Repo URI components that are themselves pure hex can shadow their
/// parent during listing; real repo paths (hosts, owners, project names)
/// do not look like commit IDs.
pub(crate) fn is_commit_dir(fs: &dyn FileSystem, dir: &str) -> Result<bool> {
    use stratum_vfs::path as vpath;

    if !valid_commit_id(vpath::file_name(dir)) {
        return Ok(false);
    }
    match fs.walk(dir) {
        Ok(files) => Ok(files.iter().any(|f| f.ends_with(".unit"))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Recursively finds repo directories below `base`: a directory is a repo
/// iff at least one of its children is a commit directory. `strip` is
/// removed from the front of each result to turn paths back into URIs.
fn scan_repos(fs: &dyn FileSystem, base: &str, strip: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut pending = vec![base.to_string()];
    while let Some(dir) = pending.pop() {
        let entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };

        let mut is_repo = false;
        for entry in &entries {
            if !fs.stat(entry)?.is_dir {
                continue;
            }
            if is_commit_dir(fs, entry)? {
                is_repo = true;
            } else {
                pending.push(entry.clone());
            }
        }
        if is_repo && !dir.is_empty() {
            let uri = if strip.is_empty() {
                dir.clone()
            } else {
                dir.strip_prefix(&format!("{strip}/")).unwrap_or(&dir).to_string()
            };
            out.push(uri);
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_paths_follow_the_uri() {
        assert_eq!(
            DefaultRepoPaths.paths_for_repo("github.com/x/y"),
            vec!["github.com", "x", "y"]
        );
    }

    #[test]
    fn commit_id_shape() {
        assert!(valid_commit_id("aaaa"));
        assert!(valid_commit_id("0123456789abcdef0123456789abcdef01234567"));
        assert!(!valid_commit_id("abc"));
        assert!(!valid_commit_id("HEAD"));
        assert!(!valid_commit_id("feature/x"));
    }

    #[test]
    fn listing_reports_repo_dirs_not_their_ancestors() {
        use std::io::Write;
        use stratum_vfs::MemFs;

        let fs = MemFs::new();
        for path in [
            "github.com/a/b/aaaa/t/u.unit",
            "github.com/a/c/bbbb/t/u.unit",
            "example.org/solo/cccc/t/sub/u.unit",
        ] {
            fs.create(path).unwrap().write_all(b"{}").unwrap();
        }

        let uris = DefaultRepoPaths.list_repo_uris(&fs).unwrap();
        assert_eq!(
            uris,
            ["example.org/solo", "github.com/a/b", "github.com/a/c"]
        );
    }

    #[test]
    fn buckets_are_stable_and_spread() {
        let a = EvenlyDistributedRepoPaths.paths_for_repo("github.com/x/y");
        let b = EvenlyDistributedRepoPaths.paths_for_repo("github.com/x/y");
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 2);
        assert_eq!(&a[1..], ["github.com", "x", "y"]);

        // Not a distribution proof, just a sanity check that the prefix
        // actually varies.
        let buckets: HashSet<String> = (0..64)
            .map(|i| EvenlyDistributedRepoPaths::bucket(&format!("repo/{i}")))
            .collect();
        assert!(buckets.len() > 8);
    }
}
