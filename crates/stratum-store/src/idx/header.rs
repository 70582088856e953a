//! Self-describing container format shared by every index file.
//!
//! Layout, all little-endian:
//!
//! ```text
//! magic (8) | header version (u16) | kind (u16) | schema version (u32)
//! payload len (u64) | payload hash (u64, truncated blake3) | payload …
//! ```
//!
//! The payload is bincode. `payload len` bounds the read, so a
//! forward-compatible reader skips any trailing sections it does not
//! understand; the truncated hash catches silent corruption.

use std::io::{Read, Write};

use bincode::Options;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use stratum_vfs::FileSystem;

use crate::error::{Result, StoreError};

const MAGIC: [u8; 8] = *b"STRMIDX\x01";
const HEADER_VERSION: u16 = 1;

pub(crate) const INDEX_SCHEMA_VERSION: u32 = 1;

/// Hard cap on index payloads; corruption degrades to an error, not an
/// allocation blow-up.
const INDEX_PAYLOAD_LIMIT: u64 = 64 * 1024 * 1024;

/// Index kind identifier embedded in the header.
///
/// These values are part of the on-disk format; do not reorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum IndexKind {
    DefPaths = 1,
    RefDefs = 2,
    RefFiles = 3,
}

impl IndexKind {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::DefPaths),
            2 => Some(Self::RefDefs),
            3 => Some(Self::RefFiles),
            _ => None,
        }
    }
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

fn content_hash(payload: &[u8]) -> u64 {
    let hash = blake3::hash(payload);
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().expect("hash slice"))
}

pub(crate) fn write_index<T: Serialize>(
    fs: &dyn FileSystem,
    path: &str,
    kind: IndexKind,
    payload: &T,
) -> Result<()> {
    let body = bincode_options()
        .serialize(payload)
        .map_err(|err| StoreError::corrupt(path, format!("encode index: {err}")))?;

    let mut w = fs.create(path)?;
    w.write_all(&MAGIC)?;
    w.write_u16::<LittleEndian>(HEADER_VERSION)?;
    w.write_u16::<LittleEndian>(kind as u16)?;
    w.write_u32::<LittleEndian>(INDEX_SCHEMA_VERSION)?;
    w.write_u64::<LittleEndian>(body.len() as u64)?;
    w.write_u64::<LittleEndian>(content_hash(&body))?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}

/// Reads and validates an index file. A missing file surfaces as an
/// `Io(NotFound)` error so callers can fall back to a scan.
pub(crate) fn read_index<T: DeserializeOwned>(
    fs: &dyn FileSystem,
    path: &str,
    kind: IndexKind,
) -> Result<T> {
    let mut f = fs.open(path)?;

    let mut magic = [0u8; 8];
    f.read_exact(&mut magic)
        .map_err(|_| StoreError::corrupt(path, "truncated index header"))?;
    if magic != MAGIC {
        return Err(StoreError::corrupt(path, "bad index magic"));
    }

    let header_version = f.read_u16::<LittleEndian>()?;
    if header_version != HEADER_VERSION {
        return Err(StoreError::corrupt(
            path,
            format!("unsupported index header version {header_version}"),
        ));
    }

    let kind_raw = f.read_u16::<LittleEndian>()?;
    let found_kind = IndexKind::from_u16(kind_raw)
        .ok_or_else(|| StoreError::corrupt(path, format!("unknown index kind {kind_raw}")))?;
    if found_kind != kind {
        return Err(StoreError::corrupt(
            path,
            format!("index kind mismatch: expected {kind:?}, found {found_kind:?}"),
        ));
    }

    let schema = f.read_u32::<LittleEndian>()?;
    if schema != INDEX_SCHEMA_VERSION {
        return Err(StoreError::corrupt(
            path,
            format!("unsupported index schema version {schema}"),
        ));
    }

    let payload_len = f.read_u64::<LittleEndian>()?;
    if payload_len > INDEX_PAYLOAD_LIMIT {
        return Err(StoreError::corrupt(
            path,
            format!("index payload of {payload_len} bytes exceeds the size limit"),
        ));
    }
    let expected_hash = f.read_u64::<LittleEndian>()?;

    let mut body = vec![0u8; payload_len as usize];
    f.read_exact(&mut body)
        .map_err(|_| StoreError::corrupt(path, "truncated index payload"))?;

    let found_hash = content_hash(&body);
    if found_hash != expected_hash {
        return Err(StoreError::corrupt(
            path,
            format!("index hash mismatch: expected {expected_hash:#x}, found {found_hash:#x}"),
        ));
    }

    bincode_options()
        .with_limit(INDEX_PAYLOAD_LIMIT)
        .deserialize(&body)
        .map_err(|err| StoreError::corrupt(path, format!("decode index: {err}")))
}
