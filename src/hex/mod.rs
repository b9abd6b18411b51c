// Intel-HEX record codec.
//
// # Modules
//
// - `record`  - Record layout, checksum, line serialization
// - `decoder` - Text lines to (address, byte) pairs
// - `encoder` - Sparse blocks to text lines

pub mod decoder;
pub mod encoder;
pub mod record;

// Re-export key types for convenience.
pub use decoder::{parse, parse_to_vec};
pub use encoder::{Block, BlockContents, EncodeOptions, Payload, encode, next_payload};
pub use record::{END_OF_FILE_LINE, Record, RecordType};
