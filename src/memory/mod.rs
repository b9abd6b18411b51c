// Memory model: sparse buffers, cell-packed regions and the region map.
//
// # Modules
//
// - `buffer` - Fixed-capacity byte storage with a presence bitmap
// - `region` - A single named region and its cell layout
// - `map`    - Sorted, non-overlapping set of regions with address routing

pub mod buffer;
pub mod map;
pub mod region;

pub use buffer::SparseBuffer;
pub use map::MemoryMap;
pub use region::{Address, Endian, MemoryRegion, Permissions, RegionConfig};
