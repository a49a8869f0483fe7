use crate::constants::*;
use crate::translation::RealAddr;

/// The simulated real-memory region: a flat, fixed-size, zeroed byte
/// buffer.  Every higher-level structure (page tables, pool frames)
/// lives inside it and is reached through these two primitives.
pub struct RealMemory {
    data: Box<[u8]>,
}

impl RealMemory {
    /// Create a region of `size` bytes, zero-filled
    pub fn new(size: usize) -> Self {
        RealMemory { data: vec![0u8; size].into_boxed_slice() }
    }

    /// Total size of the region in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn range(&self, addr: RealAddr, len: usize) -> std::ops::Range<usize> {
        let start = addr as usize;
        let end = start
            .checked_add(len)
            .unwrap_or_else(|| panic!("real access at {addr:#x} overflows the address type"));
        assert!(
            end <= self.data.len(),
            "real access [{start:#x}, {end:#x}) exceeds region of {} bytes",
            self.data.len()
        );
        start..end
    }

    /// Copy bytes out of the region into `buffer`.
    /// Fatal if the range exceeds the region bound.
    pub fn read(&self, buffer: &mut [u8], addr: RealAddr) {
        let range = self.range(addr, buffer.len());
        buffer.copy_from_slice(&self.data[range]);
    }

    /// Copy `buffer` into the region.
    /// Fatal if the range exceeds the region bound.
    pub fn write(&mut self, buffer: &[u8], addr: RealAddr) {
        let range = self.range(addr, buffer.len());
        self.data[range].copy_from_slice(buffer);
    }

    /// Zero a byte range inside the region
    pub fn zero(&mut self, addr: RealAddr, len: usize) {
        let range = self.range(addr, len);
        self.data[range].fill(0);
    }
}

/// Failure modes of the backing-store device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingStoreError {
    /// The block number addresses past the configured capacity
    BlockOutOfRange { block: u32, capacity: u32 },
}

impl std::fmt::Display for BackingStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackingStoreError::BlockOutOfRange { block, capacity } => {
                write!(f, "block {block} is beyond the store's {capacity} blocks")
            }
        }
    }
}

impl std::error::Error for BackingStoreError {}

/// The simulated secondary-storage device: a flat region addressed by
/// fixed-size block numbers.  It is a pure copy device; which block a
/// page lands in is decided entirely by the caller.
pub struct BackingStore {
    data: Box<[u8]>,
}

impl BackingStore {
    /// Create a store of `size` bytes, zero-filled
    pub fn new(size: usize) -> Self {
        BackingStore { data: vec![0u8; size].into_boxed_slice() }
    }

    /// Number of whole blocks the store can hold
    #[inline]
    pub fn capacity(&self) -> u32 {
        (self.data.len() / BLOCK_SIZE) as u32
    }

    fn block_range(&self, block: u32) -> Result<std::ops::Range<usize>, BackingStoreError> {
        let start = block as usize * BLOCK_SIZE;
        if start + BLOCK_SIZE > self.data.len() {
            return Err(BackingStoreError::BlockOutOfRange { block, capacity: self.capacity() });
        }
        Ok(start..start + BLOCK_SIZE)
    }

    /// Copy one block from the store into real memory at `dest`
    pub fn read_block(
        &self,
        real: &mut RealMemory,
        dest: RealAddr,
        block: u32,
    ) -> Result<(), BackingStoreError> {
        let range = self.block_range(block)?;
        real.write(&self.data[range], dest);
        Ok(())
    }

    /// Copy one block from real memory at `src` into the store
    pub fn write_block(
        &mut self,
        real: &RealMemory,
        src: RealAddr,
        block: u32,
    ) -> Result<(), BackingStoreError> {
        let range = self.block_range(block)?;
        real.read(&mut self.data[range], src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_memory_starts_zeroed() {
        let real = RealMemory::new(4 * PAGE_SIZE);
        let mut buf = [0xffu8; 64];
        real.read(&mut buf, 0);
        assert_eq!(buf, [0u8; 64]);
    }

    #[test]
    fn test_real_memory_round_trip() {
        let mut real = RealMemory::new(4 * PAGE_SIZE);
        let pattern = [0xab, 0xcd, 0xef, 0x01];
        real.write(&pattern, 100);

        let mut buf = [0u8; 4];
        real.read(&mut buf, 100);
        assert_eq!(buf, pattern);

        // Neighbouring bytes are untouched
        let mut edge = [0u8; 1];
        real.read(&mut edge, 99);
        assert_eq!(edge, [0]);
        real.read(&mut edge, 104);
        assert_eq!(edge, [0]);
    }

    #[test]
    fn test_real_memory_zero_range() {
        let mut real = RealMemory::new(PAGE_SIZE);
        real.write(&[0xff; 16], 8);
        real.zero(8, 16);

        let mut buf = [0xaau8; 16];
        real.read(&mut buf, 8);
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn test_real_memory_full_span_allowed() {
        let mut real = RealMemory::new(PAGE_SIZE);
        let buf = vec![7u8; PAGE_SIZE];
        real.write(&buf, 0);

        let mut back = vec![0u8; PAGE_SIZE];
        real.read(&mut back, 0);
        assert_eq!(back, buf);
    }

    #[test]
    #[should_panic]
    fn test_real_memory_read_past_end_is_fatal() {
        let real = RealMemory::new(PAGE_SIZE);
        let mut buf = [0u8; 8];
        real.read(&mut buf, (PAGE_SIZE - 4) as RealAddr);
    }

    #[test]
    #[should_panic]
    fn test_real_memory_write_past_end_is_fatal() {
        let mut real = RealMemory::new(PAGE_SIZE);
        real.write(&[0u8; 8], (PAGE_SIZE - 4) as RealAddr);
    }

    #[test]
    fn test_backing_store_round_trip() {
        let mut real = RealMemory::new(2 * PAGE_SIZE);
        let mut store = BackingStore::new(8 * BLOCK_SIZE);

        let pattern: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
        real.write(&pattern, 0);

        store.write_block(&real, 0, 3).unwrap();
        store.read_block(&mut real, PAGE_SIZE as RealAddr, 3).unwrap();

        let mut back = vec![0u8; BLOCK_SIZE];
        real.read(&mut back, PAGE_SIZE as RealAddr);
        assert_eq!(back, pattern);
    }

    #[test]
    fn test_backing_store_rejects_block_past_capacity() {
        let mut real = RealMemory::new(PAGE_SIZE);
        let mut store = BackingStore::new(4 * BLOCK_SIZE);
        assert_eq!(store.capacity(), 4);

        let err = store.write_block(&real, 0, 4).unwrap_err();
        assert_eq!(err, BackingStoreError::BlockOutOfRange { block: 4, capacity: 4 });

        let err = store.read_block(&mut real, 0, 999).unwrap_err();
        assert_eq!(err, BackingStoreError::BlockOutOfRange { block: 999, capacity: 4 });

        // The failed operations copied nothing
        let mut buf = [0u8; 4];
        real.read(&mut buf, 0);
        assert_eq!(buf, [0u8; 4]);
    }

    #[test]
    fn test_backing_store_last_block_is_usable() {
        let real = RealMemory::new(PAGE_SIZE);
        let mut store = BackingStore::new(4 * BLOCK_SIZE);
        store.write_block(&real, 0, 3).unwrap();
    }
}
