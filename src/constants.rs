pub const UPPER_BITS: u32 = 10;
pub const LOWER_BITS: u32 = 10;
pub const OFFSET_BITS: u32 = 12;

pub const PAGE_SIZE: usize = 1 << OFFSET_BITS;
pub const BLOCK_SIZE: usize = PAGE_SIZE;
pub const TABLE_ENTRIES: usize = 1 << LOWER_BITS;

pub const OFFSET_MASK: u32 = (1 << OFFSET_BITS) - 1;
pub const PAGE_MASK: u32 = !OFFSET_MASK;
pub const LOWER_MASK: u32 = (1 << LOWER_BITS) - 1;
pub const UPPER_MASK: u32 = (1 << UPPER_BITS) - 1;

pub const LOWER_SHIFT: u32 = OFFSET_BITS;
pub const UPPER_SHIFT: u32 = OFFSET_BITS + LOWER_BITS;

pub const PTE_SIZE: usize = size_of::<u32>();

// The low bits of an entry always belong to status flags; the
// backing-store block number occupies the bits above them.
pub const STATUS_BITS: u32 = 10;
pub const STATUS_MASK: u32 = (1 << STATUS_BITS) - 1;
pub const BLOCK_SHIFT: u32 = STATUS_BITS;
pub const MAX_BLOCK_NUMBER: u32 = (1 << (32 - BLOCK_SHIFT)) - 1;

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;
pub const GIB: usize = 1024 * MIB;

// Real memory below this boundary is reserved for page tables; the
// general pool for simulated pages starts here.
pub const PT_AREA_SIZE: usize = 4 * MIB + 4 * KIB;

pub const DEFAULT_REAL_MEMORY_SIZE: usize = 4 * MIB + 16 * KIB;
pub const DEFAULT_BACKING_STORE_SIZE: usize = GIB;
