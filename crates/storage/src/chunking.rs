//! Multipart chunk planning.
//!
//! Pure logic mapping a declared file size to a legal multipart layout.
//! No I/O operations - just decision making.

use crate::error::ChunkPlanError;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Hard backend ceiling on the number of parts in a multipart upload.
/// A plan is legal only when its part count is strictly below this.
pub const MAX_MULTIPART_PARTS: u64 = 10_000;

/// Candidate chunk sizes, ascending. The planner picks the smallest
/// entry that keeps the part count under [`MAX_MULTIPART_PARTS`].
pub const CHUNK_SIZE_LADDER: [u64; 12] = [
    10 * MIB,
    50 * MIB,
    100 * MIB,
    200 * MIB,
    400 * MIB,
    600 * MIB,
    800 * MIB,
    GIB,
    2 * GIB,
    3 * GIB,
    4 * GIB,
    5 * GIB,
];

/// File sizes above this are uploaded/copied via the multipart protocol.
pub const MULTIPART_THRESHOLD: u64 = 100 * MIB;

/// Maximum object size for a single presigned PUT. Larger uploads must
/// go through a multipart session.
pub const PRESIGNED_PUT_SIZE_LIMIT: u64 = 5 * GIB;

/// A legal multipart layout for a declared file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Number of parts, `ceil(file_size / chunk_size)`.
    pub num_parts: u64,
    /// Uniform part size in bytes; the last part may be shorter.
    pub chunk_size: u64,
}

impl ChunkPlan {
    /// Byte range `(offset, length)` of a zero-based part index within
    /// a file of `file_size` bytes.
    pub fn part_range(&self, index: u64, file_size: u64) -> (u64, u64) {
        let offset: u64 = index * self.chunk_size;
        let length: u64 = self.chunk_size.min(file_size.saturating_sub(offset));
        (offset, length)
    }
}

/// Compute the multipart layout for a declared file size.
///
/// Walks [`CHUNK_SIZE_LADDER`] in ascending order and returns the first
/// candidate whose part count stays under the backend ceiling. The size
/// is taken at the caller's word - it is not verified against content.
///
/// # Errors
/// [`ChunkPlanError`] when even the largest candidate would exceed the
/// part-count ceiling. There is no fallback; the upload must be rejected.
pub fn compute_chunk_plan(file_size: u64) -> Result<ChunkPlan, ChunkPlanError> {
    for chunk_size in CHUNK_SIZE_LADDER {
        let num_parts: u64 = num_parts_for(file_size, chunk_size);
        if num_parts < MAX_MULTIPART_PARTS {
            return Ok(ChunkPlan {
                num_parts,
                chunk_size,
            });
        }
    }
    Err(ChunkPlanError {
        file_size,
        max_parts: MAX_MULTIPART_PARTS,
    })
}

/// Whether a file of the given size goes through the multipart protocol.
pub fn is_multipart(file_size: u64) -> bool {
    file_size > MULTIPART_THRESHOLD
}

/// `ceil(file_size / chunk_size)`.
fn num_parts_for(file_size: u64, chunk_size: u64) -> u64 {
    file_size / chunk_size + u64::from(file_size % chunk_size > 0)
}
