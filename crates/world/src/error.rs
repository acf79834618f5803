use thiserror::Error;

/// Errors surfaced by the chunk codecs and the mesh builder.
///
/// Degenerate boundary transforms are not represented here: they are
/// recovered locally (the boundary is skipped with a logged warning).
/// Allocator resolution failures and out-of-range direct tile access are
/// programmer errors and assert instead of returning.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("buffer is not a chunk file (bad magic)")]
    BadMagic,

    #[error("chunk data truncated: {0}")]
    Truncated(#[from] std::io::Error),

    #[error("malformed {chunk} chunk: {detail}")]
    MalformedChunk { chunk: &'static str, detail: String },

    #[error("chunk of type {0} not found")]
    ChunkNotFound(i16),

    #[error("collision object {object} has non-vertical walls")]
    UnsupportedGeometry { object: usize },
}

impl ChunkError {
    pub(crate) fn malformed(chunk: &'static str, detail: impl Into<String>) -> Self {
        ChunkError::MalformedChunk { chunk, detail: detail.into() }
    }
}

/// Reject a header-declared record table before anything is allocated for
/// it. Counts come straight from untrusted buffers, so the end offset is
/// computed in u64 rather than trusted to fit.
pub(crate) fn check_table(
    chunk: &'static str,
    buffer_len: usize,
    base: u64,
    count: u64,
    record_size: u64,
) -> Result<(), ChunkError> {
    let end = count.checked_mul(record_size).and_then(|size| base.checked_add(size));
    if end.is_none_or(|end| end > buffer_len as u64) {
        return Err(ChunkError::malformed(
            chunk,
            format!("table of {} records at {:#x} exceeds {} byte buffer", count, base, buffer_len),
        ));
    }
    Ok(())
}
