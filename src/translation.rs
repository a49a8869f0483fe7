use crate::constants::*;

/// An address in the simulated 4 GiB space that clients operate on.
pub type SimAddr = u32;

/// A byte offset into the real-memory region.
pub type RealAddr = u32;

/// Represents the decomposed components of a simulated address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedAddress {
    pub raw: SimAddr,
    pub upper: u32,
    pub lower: u32,
    pub offset: u32,
}

impl SimulatedAddress {
    /// Decompose a raw simulated address into its components
    pub fn from_raw(raw: SimAddr) -> Self {
        let upper = (raw >> UPPER_SHIFT) & UPPER_MASK;
        let lower = (raw >> LOWER_SHIFT) & LOWER_MASK;
        let offset = raw & OFFSET_MASK;

        SimulatedAddress { raw, upper, lower, offset }
    }

    /// The page-aligned base of the simulated page containing this address
    #[inline]
    pub fn page_base(&self) -> SimAddr {
        self.raw & PAGE_MASK
    }
}

impl std::fmt::Display for SimulatedAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sim({:#010x}) = (upper={}, lower={}, offset={:#x})",
            self.raw, self.upper, self.lower, self.offset
        )
    }
}

bitflags::bitflags! {
    /// Status bits of a page table entry. They live in the low bits of
    /// the entry, below both the frame address and the block number.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const RESIDENT   = 1 << 0;
        const REFERENCED = 1 << 1;
        const DIRTY      = 1 << 2;
    }
}

/// One packed page table entry.
///
/// The raw value `0` means "unallocated".  A resident entry carries the
/// page-aligned real frame address in its high 20 bits; a non-resident
/// (swapped-out) entry carries a backing-store block number above the
/// status bits instead.  Every field-layout constraint is asserted here
/// and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    pub const EMPTY: PageTableEntry = PageTableEntry(0);

    /// Reconstruct an entry from its raw in-memory representation
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        PageTableEntry(bits)
    }

    /// The raw in-memory representation
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether this entry has never been allocated
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    #[inline]
    pub fn is_resident(self) -> bool {
        self.flags().contains(PteFlags::RESIDENT)
    }

    #[inline]
    pub fn is_referenced(self) -> bool {
        self.flags().contains(PteFlags::REFERENCED)
    }

    #[inline]
    pub fn is_dirty(self) -> bool {
        self.flags().contains(PteFlags::DIRTY)
    }

    /// An upper-table entry naming a lower table's base address.
    /// Upper entries carry no status bits.
    pub fn table(base: RealAddr) -> Self {
        assert!(base != 0, "a lower table can never live at real address 0");
        assert_eq!(base & OFFSET_MASK, 0, "table base {base:#x} is not page-aligned");
        PageTableEntry(base)
    }

    /// The lower-table base address named by an upper-table entry
    #[inline]
    pub fn table_base(self) -> RealAddr {
        self.0 & PAGE_MASK
    }

    /// A fresh resident mapping to the given pool frame
    pub fn resident(frame: RealAddr) -> Self {
        assert_eq!(frame & OFFSET_MASK, 0, "frame {frame:#x} is not page-aligned");
        PageTableEntry(frame | PteFlags::RESIDENT.bits())
    }

    /// The real frame address of a resident entry
    #[inline]
    pub fn frame(self) -> RealAddr {
        debug_assert!(self.is_resident());
        self.0 & PAGE_MASK
    }

    /// The backing-store block number of a swapped-out entry
    #[inline]
    pub fn block(self) -> u32 {
        debug_assert!(!self.is_resident() && !self.is_empty());
        self.0 >> BLOCK_SHIFT
    }

    /// Rewrite the entry to name a backing-store block, clearing
    /// RESIDENT and keeping the remaining status bits.
    pub fn swapped_out(self, block: u32) -> Self {
        assert!(
            block >= 1 && block <= MAX_BLOCK_NUMBER,
            "block number {block} out of encodable range"
        );
        let status = self.0 & STATUS_MASK & !PteFlags::RESIDENT.bits();
        PageTableEntry(status | (block << BLOCK_SHIFT))
    }

    /// Rewrite the entry to name a real frame again, setting RESIDENT
    /// and keeping the remaining status bits.
    pub fn swapped_in(self, frame: RealAddr) -> Self {
        assert_eq!(frame & OFFSET_MASK, 0, "frame {frame:#x} is not page-aligned");
        let status = self.0 & STATUS_MASK;
        PageTableEntry(status | frame | PteFlags::RESIDENT.bits())
    }

    /// Mark the entry accessed, and dirty if the access is a write
    #[inline]
    pub fn touched(self, is_write: bool) -> Self {
        let mut flags = PteFlags::REFERENCED;
        if is_write {
            flags |= PteFlags::DIRTY;
        }
        PageTableEntry(self.0 | flags.bits())
    }

    /// Give the page a second chance: clear REFERENCED
    #[inline]
    pub fn second_chance(self) -> Self {
        PageTableEntry(self.0 & !PteFlags::REFERENCED.bits())
    }
}

impl std::fmt::Display for PageTableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "pte(empty)")
        } else if self.is_resident() {
            write!(f, "pte(frame={:#x}, {:?})", self.frame(), self.flags())
        } else {
            write!(f, "pte(block={}, {:?})", self.block(), self.flags())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decomposition_round_trip() {
        for &raw in &[0u32, 0x1000, 0x0040_3fff, 0x7fff_ffff, 0xffff_ffff] {
            let sim = SimulatedAddress::from_raw(raw);
            let rebuilt = (sim.upper << UPPER_SHIFT) | (sim.lower << LOWER_SHIFT) | sim.offset;
            assert_eq!(rebuilt, raw, "failed for {raw:#x}");
        }
    }

    #[test]
    fn test_decomposition_fields() {
        // upper=3, lower=5, offset=10
        let raw = (3 << UPPER_SHIFT) | (5 << LOWER_SHIFT) | 10;
        let sim = SimulatedAddress::from_raw(raw);

        assert_eq!(sim.upper, 3);
        assert_eq!(sim.lower, 5);
        assert_eq!(sim.offset, 10);
        assert_eq!(sim.page_base(), raw & !0xfff);
    }

    #[test]
    fn test_decomposition_extremes() {
        let sim = SimulatedAddress::from_raw(0);
        assert_eq!((sim.upper, sim.lower, sim.offset), (0, 0, 0));

        let sim = SimulatedAddress::from_raw(u32::MAX);
        assert_eq!((sim.upper, sim.lower, sim.offset), (1023, 1023, 4095));
    }

    #[test]
    fn test_display() {
        let sim = SimulatedAddress::from_raw((3 << UPPER_SHIFT) | (5 << LOWER_SHIFT) | 10);
        let display = format!("{}", sim);
        assert!(display.contains("upper=3"));
        assert!(display.contains("lower=5"));
    }

    #[test]
    fn test_empty_entry() {
        assert!(PageTableEntry::EMPTY.is_empty());
        assert!(!PageTableEntry::EMPTY.is_resident());
        assert_eq!(PageTableEntry::EMPTY.flags(), PteFlags::empty());
    }

    #[test]
    fn test_resident_entry() {
        let pte = PageTableEntry::resident(0x0040_1000);
        assert!(pte.is_resident());
        assert!(!pte.is_referenced());
        assert!(!pte.is_dirty());
        assert_eq!(pte.frame(), 0x0040_1000);
    }

    #[test]
    fn test_touched_sets_bits() {
        let pte = PageTableEntry::resident(0x2000);

        let read = pte.touched(false);
        assert!(read.is_referenced());
        assert!(!read.is_dirty());
        assert_eq!(read.frame(), 0x2000);

        let written = pte.touched(true);
        assert!(written.is_referenced());
        assert!(written.is_dirty());
    }

    #[test]
    fn test_second_chance_clears_only_referenced() {
        let pte = PageTableEntry::resident(0x3000).touched(true).second_chance();
        assert!(!pte.is_referenced());
        assert!(pte.is_resident());
        assert!(pte.is_dirty());
        assert_eq!(pte.frame(), 0x3000);
    }

    #[test]
    fn test_swap_out_keeps_status_and_encodes_block() {
        let pte = PageTableEntry::resident(0x5000).touched(true).second_chance();
        let out = pte.swapped_out(42);

        assert!(!out.is_resident());
        assert!(!out.is_empty());
        assert!(out.is_dirty());
        assert_eq!(out.block(), 42);
    }

    #[test]
    fn test_swap_in_restores_frame() {
        let out = PageTableEntry::resident(0x5000).touched(true).swapped_out(7);
        let back = out.swapped_in(0x0040_2000);

        assert!(back.is_resident());
        assert_eq!(back.frame(), 0x0040_2000);
        // No trace of the old block number remains.
        assert_eq!(back.bits() & PAGE_MASK, 0x0040_2000);
    }

    #[test]
    fn test_swapped_out_entry_is_never_zero() {
        // Block numbers start at 1, so even a status-free entry stays
        // distinguishable from "unallocated".
        let out = PageTableEntry::resident(0x5000).swapped_out(1);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_table_entry() {
        let upper = PageTableEntry::table(0x1000);
        assert_eq!(upper.table_base(), 0x1000);
        assert!(!upper.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_unaligned_frame_rejected() {
        PageTableEntry::resident(0x1234);
    }

    #[test]
    #[should_panic]
    fn test_block_zero_rejected() {
        PageTableEntry::resident(0x1000).swapped_out(0);
    }
}
