// Intel-HEX encoding: sparse memory blocks to text lines.
//
// Each block is walked from its first position. Runs of unset bytes are
// skipped; runs of defined bytes are cut into data records of at most
// `max_record_length` bytes. An extended-linear-address record is emitted
// whenever the upper 16 bits of the next record's address change, so no
// record ever straddles a 64 KiB boundary.

use log::{debug, trace};

use super::record::{self, RecordType};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Default maximum payload length per data record.
pub const DEFAULT_MAX_RECORD_LENGTH: usize = 0x10;

/// Configuration for HEX encoding.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Maximum payload bytes per data record (1..=255).
    pub max_record_length: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_record_length: DEFAULT_MAX_RECORD_LENGTH,
        }
    }
}

// ---------------------------------------------------------------------------
// Block contents
// ---------------------------------------------------------------------------

/// Random access to a block's bytes, where positions may be unset.
pub trait BlockContents {
    /// Number of positions in the block.
    fn len(&self) -> usize;

    /// The byte at `index`, or `None` when unset or out of range.
    fn byte_at(&self, index: usize) -> Option<u8>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockContents for [Option<u8>] {
    fn len(&self) -> usize {
        <[Option<u8>]>::len(self)
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.get(index).copied().flatten()
    }
}

impl BlockContents for Vec<Option<u8>> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.as_slice().byte_at(index)
    }
}

/// A contiguous span of memory to encode.
pub struct Block<'a> {
    pub start_address: u32,
    pub contents: &'a dyn BlockContents,
}

// ---------------------------------------------------------------------------
// Payload extraction
// ---------------------------------------------------------------------------

/// A run of defined bytes found by [`next_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Block index of the first byte (after skipping leading unset bytes).
    pub offset: usize,
    pub bytes: Vec<u8>,
}

/// Extract the next run of defined bytes starting at `offset`.
///
/// Returns the payload (if any defined byte remains) and the offset to
/// continue from. The continuation skips an unset run that immediately
/// follows the payload.
pub fn next_payload<C>(contents: &C, offset: usize, max_length: usize) -> (Option<Payload>, usize)
where
    C: BlockContents + ?Sized,
{
    let len = contents.len();
    let Some(start) = (offset..len).find(|&i| contents.byte_at(i).is_some()) else {
        return (None, len);
    };

    let bytes: Vec<u8> = (start..len)
        .take(max_length)
        .map_while(|i| contents.byte_at(i))
        .collect();
    let end = start + bytes.len();

    let next = if end < len && contents.byte_at(end).is_none() {
        (end..len)
            .find(|&i| contents.byte_at(i).is_some())
            .unwrap_or(len)
    } else {
        end
    };

    (
        Some(Payload {
            offset: start,
            bytes,
        }),
        next,
    )
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode `blocks` into HEX lines, terminated by the end-of-file record.
pub fn encode(blocks: &[Block<'_>], opts: &EncodeOptions) -> Result<Vec<String>> {
    if opts.max_record_length == 0 || opts.max_record_length > usize::from(u8::MAX) {
        return Err(Error::Config(format!(
            "max record length must be within 1..=255, got {}",
            opts.max_record_length
        )));
    }

    let mut lines = Vec::new();
    let mut upper: u16 = 0;

    for block in blocks {
        let contents = block.contents;
        let mut offset = 0usize;

        while offset < contents.len() {
            let (payload, next) = next_payload(contents, offset, opts.max_record_length);
            let Some(mut payload) = payload else {
                break;
            };

            let address = absolute_address(block.start_address, payload.offset)?;
            let [hi, lo] = [(address >> 16) as u16, address as u16];

            // Records never cross into the next 64 KiB page.
            let room = 0x1_0000 - usize::from(lo);
            let next = if payload.bytes.len() > room {
                payload.bytes.truncate(room);
                payload.offset + room
            } else {
                next
            };

            if hi != upper {
                trace!("linear base {hi:#06X} at {address:#010X}");
                lines.push(record::extended_linear_address_record(hi));
                upper = hi;
            }
            lines.push(record::serialize_record(
                &payload.bytes,
                lo,
                RecordType::Data.code(),
            ));
            offset = next;
        }
    }

    lines.push(record::END_OF_FILE_LINE.to_string());
    debug!("encoded {} blocks into {} records", blocks.len(), lines.len());
    Ok(lines)
}

fn absolute_address(start: u32, index: usize) -> Result<u32> {
    u32::try_from(index)
        .ok()
        .and_then(|i| start.checked_add(i))
        .ok_or_else(|| {
            Error::Range(format!(
                "block at {start:#010X} extends past the 32-bit address space (index {index})"
            ))
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
