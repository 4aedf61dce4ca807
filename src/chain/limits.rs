//! Chain guardrails.
//!
//! These constants bound what a (possibly hostile) team server can make the
//! verifier decode and how long a read loop may run.

use crate::chain::errors::ChainError;

/// Max payload size per block, checked before JSON decoding.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // 64 KB

/// Max blocks accepted in a single read response page.
pub const MAX_BLOCKS_PER_PAGE: usize = 10_000;

/// Default bound on the number of pages one read loop will request.
pub const DEFAULT_MAX_READ_PAGES: usize = 1_000;

/// Default number of refresh-and-repost attempts after the server rejects an
/// append.
pub const DEFAULT_MAIN_CHAIN_RETRIES: usize = 3;

/// Reject oversized payloads before they reach the decoder.
pub fn check_payload_size(len: usize) -> Result<(), ChainError> {
    if len > MAX_PAYLOAD_BYTES {
        return Err(ChainError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(())
}

/// Reject oversized response pages.
pub fn check_page_size(blocks: usize) -> Result<(), ChainError> {
    if blocks > MAX_BLOCKS_PER_PAGE {
        return Err(ChainError::PageTooLarge {
            blocks,
            max: MAX_BLOCKS_PER_PAGE,
        });
    }
    Ok(())
}
