//! Length-delimited record files.
//!
//! A `.dat` file is a sequence of records, each a `u32` little-endian
//! byte length followed by that many bytes of JSON. The format is
//! self-describing per record, and byte offsets of whole records are
//! stable, which is what the selective indexes address into.
//!
//! Decoders enforce [`MAX_RECORD_LEN`] so a corrupt length prefix
//! degrades to an error instead of an allocation blow-up.

use std::io::{Read, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stratum_vfs::VfsFile;

use crate::error::{Result, StoreError};

pub(crate) const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

/// Byte range of one or more consecutive records inside a `.dat` file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct ByteRange {
    pub start: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Extends this range to also cover `other`, which must start at or
    /// after `self.start`.
    pub fn extend_to(&mut self, other: ByteRange) {
        self.len = other.end() - self.start;
    }

    /// Overlap of two ranges; `None` when they are disjoint.
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.start.max(other.start);
        let end = self.end().min(other.end());
        (start < end).then(|| ByteRange {
            start,
            len: end - start,
        })
    }
}

/// Writes `records` length-delimited, returning the byte range each record
/// occupies (including its length prefix).
pub(crate) fn write_records<T: Serialize, W: Write + ?Sized>(
    w: &mut W,
    records: &[T],
    path: &str,
) -> Result<Vec<ByteRange>> {
    let mut ranges = Vec::with_capacity(records.len());
    let mut pos = 0u64;
    for record in records {
        let body = serde_json::to_vec(record)
            .map_err(|err| StoreError::corrupt(path, format!("encode record: {err}")))?;
        if body.len() as u64 > MAX_RECORD_LEN as u64 {
            return Err(StoreError::corrupt(
                path,
                format!("record of {} bytes exceeds the record size limit", body.len()),
            ));
        }
        w.write_u32::<LittleEndian>(body.len() as u32)?;
        w.write_all(&body)?;
        let len = 4 + body.len() as u64;
        ranges.push(ByteRange { start: pos, len });
        pos += len;
    }
    Ok(ranges)
}

/// Reads the next record's length prefix. `None` means a clean EOF at a
/// record boundary; a partial prefix is `Corrupt`.
fn read_len<R: Read + ?Sized>(r: &mut R, path: &str) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(StoreError::corrupt(path, "truncated record length"));
        }
        filled += n;
    }
    let len = u32::from_le_bytes(buf);
    if len > MAX_RECORD_LEN {
        return Err(StoreError::corrupt(
            path,
            format!("record length {len} exceeds the record size limit"),
        ));
    }
    Ok(Some(len))
}

fn read_record<T: DeserializeOwned, R: Read + ?Sized>(r: &mut R, len: u32, path: &str) -> Result<T> {
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body)
        .map_err(|_| StoreError::corrupt(path, "truncated record"))?;
    serde_json::from_slice(&body)
        .map_err(|err| StoreError::corrupt(path, format!("decode record: {err}")))
}

/// Decodes every record until EOF.
pub(crate) fn read_all_records<T: DeserializeOwned, R: Read + ?Sized>(
    r: &mut R,
    path: &str,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    while let Some(len) = read_len(r, path)? {
        out.push(read_record(r, len, path)?);
    }
    Ok(out)
}

/// Decodes the records inside `range`, which must cover whole records.
pub(crate) fn read_range_records<T: DeserializeOwned>(
    f: &mut dyn VfsFile,
    range: ByteRange,
    path: &str,
) -> Result<Vec<T>> {
    f.seek(std::io::SeekFrom::Start(range.start))?;
    let mut bounded = f.take(range.len);
    read_all_records(&mut bounded, path)
}

/// Decodes the single record starting at `offset`.
pub(crate) fn read_record_at<T: DeserializeOwned>(
    f: &mut dyn VfsFile,
    offset: u64,
    path: &str,
) -> Result<T> {
    f.seek(std::io::SeekFrom::Start(offset))?;
    match read_len(f, path)? {
        Some(len) => read_record(f, len, path),
        None => Err(StoreError::corrupt(path, "record offset points past EOF")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_graph::Def;
    use stratum_vfs::{FileSystem, MemFs};

    fn sample_defs() -> Vec<Def> {
        (0..4)
            .map(|i| Def {
                path: format!("p{i}"),
                file: "a.go".to_string(),
                def_start: i * 10,
                def_end: i * 10 + 4,
                ..Def::default()
            })
            .collect()
    }

    #[test]
    fn round_trip_and_ranges() {
        let fs = MemFs::new();
        let defs = sample_defs();
        let ranges = {
            let mut w = fs.create("def.dat").unwrap();
            write_records(&mut *w, &defs, "def.dat").unwrap()
        };
        assert_eq!(ranges.len(), defs.len());
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[1].start, ranges[0].end());

        let mut f = fs.open("def.dat").unwrap();
        let back: Vec<Def> = read_all_records(&mut *f, "def.dat").unwrap();
        assert_eq!(back, defs);

        let mut f = fs.open("def.dat").unwrap();
        let third: Def = read_record_at(&mut *f, ranges[2].start, "def.dat").unwrap();
        assert_eq!(third, defs[2]);
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let fs = MemFs::new();
        let defs = sample_defs();
        {
            let mut w = fs.create("def.dat").unwrap();
            write_records(&mut *w, &defs, "def.dat").unwrap();
        }
        let len = fs.stat("def.dat").unwrap().len;

        // Drop the tail of the last record.
        let mut bytes = Vec::new();
        fs.open("def.dat").unwrap().read_to_end(&mut bytes).unwrap();
        bytes.truncate(len as usize - 3);
        fs.create("def.dat").unwrap().write_all(&bytes).unwrap();

        let mut f = fs.open("def.dat").unwrap();
        let err = read_all_records::<Def, _>(&mut *f, "def.dat").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "{err:?}");
    }

    #[test]
    fn oversized_length_prefix_is_corrupt() {
        let fs = MemFs::new();
        {
            let mut w = fs.create("ref.dat").unwrap();
            w.write_u32::<LittleEndian>(MAX_RECORD_LEN + 1).unwrap();
            w.write_all(&[0u8; 8]).unwrap();
        }
        let mut f = fs.open("ref.dat").unwrap();
        let err = read_all_records::<Def, _>(&mut *f, "ref.dat").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "{err:?}");
    }

    #[test]
    fn range_reads_are_bounded() {
        let fs = MemFs::new();
        let defs = sample_defs();
        let ranges = {
            let mut w = fs.create("def.dat").unwrap();
            write_records(&mut *w, &defs, "def.dat").unwrap()
        };

        let mut span = ranges[1];
        span.extend_to(ranges[2]);

        let mut f = fs.open("def.dat").unwrap();
        let middle: Vec<Def> = read_range_records(&mut *f, span, "def.dat").unwrap();
        assert_eq!(middle, &defs[1..3]);
    }
}
