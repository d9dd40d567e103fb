//! N-way shard concatenation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::shard::{Shard, Trigram, write_shard};

/// Concatenates `inputs` into a single shard at `output`.
///
/// Document tables are appended in input order and posting lists are
/// renumbered accordingly, so the result is equivalent to the union of the
/// inputs. Returns the total document count of the merged shard.
///
/// The caller owns the choice of `output`: it must live in the same
/// directory as its eventual published name so the final rename stays
/// atomic, and must not collide with any name enumerators treat as a
/// shard.
///
/// # Errors
///
/// Fails if any input cannot be opened or parsed, or if the output cannot
/// be written. On failure the output file may exist with partial content;
/// callers must only publish it by rename after success.
pub fn concat_shards(output: &Path, inputs: &[PathBuf]) -> Result<usize> {
    let mut docs: Vec<String> = Vec::new();
    let mut postings: BTreeMap<Trigram, Vec<u32>> = BTreeMap::new();

    for input in inputs {
        let shard = Shard::open(input)?;
        let base = u32::try_from(docs.len())
            .map_err(|_| crate::IndexError::rejected("merged document table full"))?;
        let (shard_docs, shard_postings) = shard.into_parts();
        docs.extend(shard_docs);
        for (trigram, ids) in shard_postings {
            let merged = postings.entry(trigram).or_default();
            merged.extend(ids.into_iter().map(|id| base + id));
        }
    }

    write_shard(output, &docs, &postings)?;
    Ok(docs.len())
}
