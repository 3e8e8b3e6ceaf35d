//! Fixed-window character chunking.
//!
//! Windows are measured in Unicode scalar values (`char`), never bytes, so a window boundary
//! cannot split a UTF-8 sequence. Each window is `size` characters long and starts
//! `size - overlap` characters after the previous one; the final window may be shorter.

use super::types::ChunkingError;

/// Split `text` into ordered, overlapping windows of `size` characters.
///
/// Requires `overlap < size`. Empty input yields no chunks; input no longer than `size` yields
/// exactly one chunk equal to the input.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ChunkingError> {
    validate_window(size, overlap)?;

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let step = size - overlap;

    let mut chunks = Vec::with_capacity(char_count.div_ceil(step));
    let mut start = 0;
    while start < char_count {
        let end = (start + size).min(char_count);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == char_count {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Check that a window configuration can make progress.
pub fn validate_window(size: usize, overlap: usize) -> Result<(), ChunkingError> {
    if size == 0 || overlap >= size {
        return Err(ChunkingError::InvalidParameter { size, overlap });
    }
    Ok(())
}

/// Rebuild the source text from windows produced with the same `overlap`.
pub fn merge_chunks<S: AsRef<str>>(chunks: &[S], overlap: usize) -> String {
    let mut merged = String::new();
    for (index, chunk) in chunks.iter().enumerate() {
        let chunk = chunk.as_ref();
        if index == 0 {
            merged.push_str(chunk);
        } else {
            merged.extend(chunk.chars().skip(overlap));
        }
    }
    merged
}
