use std::io;

use stratum_graph::RefKey;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by the store tiers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A requested path (unit, commit, or repo) is absent. Fan-outs treat
    /// this as an empty child; it surfaces only when a filter named the
    /// missing entity directly.
    #[error("not found: {0}")]
    NotExist(String),

    /// Decoding failed or an on-disk invariant was violated.
    #[error("corrupt data in {path}: {detail}")]
    Corrupt { path: String, detail: String },

    /// An import bundle contained two refs with the same canonical key.
    #[error("duplicate ref {key:?}")]
    Duplicate { key: Box<RefKey> },

    /// A filter declared the implied-unit capability but did not produce a
    /// bound clone; sharing it across fan-out workers would race.
    #[error("cannot rebind {filter} filter for per-unit use")]
    UnrecognizedFilter { filter: &'static str },

    #[error("query cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    pub(crate) fn corrupt(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// True for both the store's own `NotExist` and a raw `NotFound` from
    /// the filesystem.
    pub fn is_not_exist(&self) -> bool {
        match self {
            Self::NotExist(_) => true,
            Self::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
