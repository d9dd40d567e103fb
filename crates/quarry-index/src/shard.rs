//! On-disk shard format: builder and reader.
//!
//! ## Format
//!
//! ```text
//! magic            8 bytes, "QSHARD01"
//! doc count        u32 LE
//! per document:    u32 LE name length, then UTF-8 name bytes
//! trigram count    u32 LE
//! per trigram:     3 raw bytes, u32 LE posting count,
//!                  postings as varint deltas (first id absolute)
//! ```
//!
//! Documents are numbered in insertion order; posting lists are therefore
//! already sorted when written. All multi-byte integers are little-endian.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

/// Magic bytes identifying a shard file.
pub const MAGIC: &[u8; 8] = b"QSHARD01";

/// Longest line, in bytes, the builder accepts in a source file.
///
/// Files with longer lines are almost always generated or minified and
/// would bloat posting lists without making search results better.
pub const MAX_LINE_BYTES: usize = 2000;

/// Largest distinct-trigram set the builder accepts for one file.
pub const MAX_FILE_TRIGRAMS: usize = 20_000;

/// A trigram: three consecutive bytes of file content.
pub type Trigram = [u8; 3];

// ============================================================================
// Builder
// ============================================================================

/// Accumulates documents and trigram postings, then writes one shard file.
///
/// Create via [`TrigramEngine::create`](crate::TrigramEngine), add files,
/// and finish with [`flush`](Self::flush). Nothing is written to disk until
/// the flush.
#[derive(Debug)]
pub struct TrigramShardBuilder {
    path: PathBuf,
    docs: Vec<String>,
    postings: BTreeMap<Trigram, Vec<u32>>,
}

impl TrigramShardBuilder {
    /// Creates a builder that will write its shard to `path` on flush.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            docs: Vec::new(),
            postings: BTreeMap::new(),
        }
    }

    /// Reads the file at `source` and records it under `stored_name`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::FileRejected`] for content that must not be
    /// indexed (invalid UTF-8, over-long lines, or a trigram set so large
    /// the file is effectively generated noise), and [`IndexError::Io`] if
    /// the file cannot be read.
    pub fn add_file(&mut self, source: &Path, stored_name: &str) -> Result<()> {
        let content = std::fs::read(source)?;
        let text = std::str::from_utf8(&content)
            .map_err(|_| IndexError::rejected("content is not valid UTF-8"))?;

        if let Some(line) = text.split('\n').find(|line| line.len() > MAX_LINE_BYTES) {
            return Err(IndexError::rejected(format!(
                "line of {} bytes exceeds {MAX_LINE_BYTES}",
                line.len()
            )));
        }

        let trigrams: HashSet<Trigram> = content
            .windows(3)
            .map(|w| [w[0], w[1], w[2]])
            .collect();
        if trigrams.len() > MAX_FILE_TRIGRAMS {
            return Err(IndexError::rejected(format!(
                "{} distinct trigrams exceed {MAX_FILE_TRIGRAMS}",
                trigrams.len()
            )));
        }

        let doc_id = u32::try_from(self.docs.len())
            .map_err(|_| IndexError::rejected("document table full"))?;
        self.docs.push(stored_name.to_string());
        for trigram in trigrams {
            self.postings.entry(trigram).or_default().push(doc_id);
        }
        Ok(())
    }

    /// Number of documents recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns true if no documents have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Writes the shard file and consumes the builder.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the shard cannot be written.
    pub fn flush(self) -> Result<()> {
        write_shard(&self.path, &self.docs, &self.postings)
    }
}

/// Serializes one shard file at `path`.
pub(crate) fn write_shard(
    path: &Path,
    docs: &[String],
    postings: &BTreeMap<Trigram, Vec<u32>>,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(MAGIC)?;

    write_u32(&mut out, cast_len(docs.len())?)?;
    for doc in docs {
        write_u32(&mut out, cast_len(doc.len())?)?;
        out.write_all(doc.as_bytes())?;
    }

    write_u32(&mut out, cast_len(postings.len())?)?;
    for (trigram, ids) in postings {
        out.write_all(trigram)?;
        write_u32(&mut out, cast_len(ids.len())?)?;
        let mut prev = 0u32;
        for (i, &id) in ids.iter().enumerate() {
            let delta = if i == 0 { id } else { id - prev };
            write_varint(&mut out, delta)?;
            prev = id;
        }
    }

    out.flush()?;
    Ok(())
}

fn cast_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| IndexError::rejected("shard section too large"))
}

// ============================================================================
// Reader
// ============================================================================

/// A shard opened for enumeration.
#[derive(Debug)]
pub struct Shard {
    docs: Vec<String>,
    postings: BTreeMap<Trigram, Vec<u32>>,
}

impl Shard {
    /// Opens and fully parses the shard at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the file cannot be read and
    /// [`IndexError::Malformed`] if it does not parse as a shard.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut cursor = Cursor {
            bytes: &bytes,
            pos: 0,
            path,
        };

        let magic = cursor.take(MAGIC.len())?;
        if magic != MAGIC {
            return Err(IndexError::malformed(path, "bad magic"));
        }

        let doc_count = cursor.read_u32()? as usize;
        let mut docs = Vec::with_capacity(doc_count);
        for _ in 0..doc_count {
            let len = cursor.read_u32()? as usize;
            let raw = cursor.take(len)?;
            let name = std::str::from_utf8(raw)
                .map_err(|_| IndexError::malformed(path, "document name is not UTF-8"))?;
            docs.push(name.to_string());
        }

        let trigram_count = cursor.read_u32()? as usize;
        let mut postings = BTreeMap::new();
        for _ in 0..trigram_count {
            let raw = cursor.take(3)?;
            let trigram = [raw[0], raw[1], raw[2]];
            let posting_count = cursor.read_u32()? as usize;
            let mut ids = Vec::with_capacity(posting_count);
            let mut prev = 0u32;
            for i in 0..posting_count {
                let delta = cursor.read_varint()?;
                let id = if i == 0 { delta } else { prev + delta };
                if id as usize >= doc_count {
                    return Err(IndexError::malformed(path, "posting refers past doc table"));
                }
                ids.push(id);
                prev = id;
            }
            postings.insert(trigram, ids);
        }

        if cursor.pos != bytes.len() {
            return Err(IndexError::malformed(path, "trailing bytes after postings"));
        }

        Ok(Self { docs, postings })
    }

    /// The stored names of every document, in insertion order.
    #[must_use]
    pub fn documents(&self) -> &[String] {
        &self.docs
    }

    /// Sorted document ids containing `trigram`, if any do.
    #[must_use]
    pub fn postings_for(&self, trigram: Trigram) -> Option<&[u32]> {
        self.postings.get(&trigram).map(Vec::as_slice)
    }

    /// Number of distinct trigrams in the shard.
    #[must_use]
    pub fn trigram_count(&self) -> usize {
        self.postings.len()
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, BTreeMap<Trigram, Vec<u32>>) {
        (self.docs, self.postings)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| IndexError::malformed(self.path, "truncated shard"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_varint(&mut self) -> Result<u32> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.take(1)?[0];
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return u32::try_from(value)
                    .map_err(|_| IndexError::malformed(self.path, "varint overflow"));
            }
            shift += 7;
            if shift >= 35 {
                return Err(IndexError::malformed(self.path, "varint overflow"));
            }
        }
    }
}

fn write_u32<W: Write>(out: &mut W, value: u32) -> Result<()> {
    out.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_varint<W: Write>(out: &mut W, mut value: u32) -> Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.write_all(&[byte])?;
            return Ok(());
        }
        out.write_all(&[byte | 0x80])?;
    }
}
