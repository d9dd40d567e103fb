//! Decides, per directory entry, whether it is source worth indexing.
//!
//! The indexer consults [`skip_reason`] for every entry in an unpacked
//! tree. A `Some` result means the entry must be excluded from the index
//! and deleted from disk; for directories the whole subtree goes. The
//! decision depends only on the entry itself, never on previous calls.

use std::fmt;
use std::fs::Metadata;
use std::io::Read;
use std::path::Path;

/// Tunable knobs for the filter.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Largest file, in bytes, worth indexing.
    pub max_file_size: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_file_size: crate::config::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Why an entry is excluded from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Version-control metadata directory.
    VcsMetadata,
    /// Generated artifact recognized by extension.
    GeneratedArtifact,
    /// Content sniffed as binary.
    BinaryContent,
    /// File exceeds the configured size ceiling.
    TooLarge(u64),
    /// Symbolic link, device node, or other non-regular file.
    SpecialFile,
    /// File could not be read for sniffing.
    Unreadable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VcsMetadata => write!(f, "version control metadata"),
            Self::GeneratedArtifact => write!(f, "generated artifact"),
            Self::BinaryContent => write!(f, "binary content"),
            Self::TooLarge(size) => write!(f, "file too large ({size} bytes)"),
            Self::SpecialFile => write!(f, "not a regular file"),
            Self::Unreadable => write!(f, "unreadable"),
        }
    }
}

/// Version-control metadata directories, excluded with their contents.
const VCS_DIRECTORIES: &[&str] = &[".git", ".svn", ".hg", ".bzr", "CVS"];

/// Extensions of artifacts that are built, not written: object code,
/// compiled bytecode, and archive/compression formats the unpacker has
/// already expanded once.
const ARTIFACT_EXTENSIONS: &[&str] = &[
    "o", "a", "so", "lo", "la", "obj", "exe", "class", "jar", "pyc", "pyo", "elc", "beam", "tar",
    "tgz", "gz", "bz2", "xz", "lzma", "zst", "zip", "7z", "deb", "rpm",
];

/// Extensions trusted to be text even when the content sniff disagrees
/// (editors embed control bytes in legitimate sources now and then).
const TEXT_EXTENSIONS: &[&str] = &[
    "c", "h", "cc", "cpp", "cxx", "hh", "hpp", "rs", "go", "py", "pl", "pm", "rb", "sh", "js",
    "ts", "css", "html", "xml", "json", "yaml", "yml", "toml", "md", "txt", "tex", "java", "el",
    "hs", "ml", "lisp", "scm", "sql", "diff", "patch",
];

/// How many leading bytes the binary sniff examines.
const SNIFF_BYTES: usize = 1024;

/// Returns why the entry must be excluded, or `None` to keep it.
///
/// `meta` must come from a non-following stat so links are seen as links.
/// The sniff reads the file's leading bytes; everything else is decided
/// from metadata and the name alone.
#[must_use]
pub fn skip_reason(
    meta: &Metadata,
    dir: &Path,
    name: &str,
    config: &FilterConfig,
) -> Option<SkipReason> {
    if meta.is_dir() {
        if VCS_DIRECTORIES.contains(&name) {
            return Some(SkipReason::VcsMetadata);
        }
        return None;
    }

    if !meta.is_file() {
        return Some(SkipReason::SpecialFile);
    }

    let ext = extension(name);
    if ARTIFACT_EXTENSIONS.contains(&ext) {
        return Some(SkipReason::GeneratedArtifact);
    }

    if meta.len() > config.max_file_size {
        return Some(SkipReason::TooLarge(meta.len()));
    }

    if TEXT_EXTENSIONS.contains(&ext) {
        return None;
    }

    match sniff_binary(&dir.join(name)) {
        Ok(true) => Some(SkipReason::BinaryContent),
        Ok(false) => None,
        Err(_) => Some(SkipReason::Unreadable),
    }
}

fn extension(name: &str) -> &str {
    name.rsplit_once('.').map_or("", |(_, ext)| ext)
}

/// Leading-bytes heuristic: NUL bytes or a high share of control bytes
/// mean binary.
fn sniff_binary(path: &Path) -> std::io::Result<bool> {
    let mut head = [0u8; SNIFF_BYTES];
    let mut file = std::fs::File::open(path)?;
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let head = &head[..filled];

    if head.contains(&0) {
        return Ok(true);
    }
    let suspect = head
        .iter()
        .filter(|&&b| b < 0x09 || (0x0e..0x20).contains(&b))
        .count();
    Ok(suspect * 10 > head.len())
}
