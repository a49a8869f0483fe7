use crate::constants::*;
use crate::memory::{BackingStore, RealMemory};
use crate::translation::{PageTableEntry, RealAddr, SimAddr, SimulatedAddress};

/// Environment variable overriding the real-memory region size in bytes
pub const REAL_MEM_SIZE_VAR: &str = "VMSIM_REAL_MEM_SIZE";
/// Environment variable overriding the backing-store size in bytes
pub const BS_SIZE_VAR: &str = "VMSIM_BS_SIZE";

// A single fault installs whatever the walk was missing, so two
// attempts settle every access.  More means the tables are corrupt.
const MAX_TRANSLATE_ATTEMPTS: usize = 4;

/// Region sizes, captured exactly once when the simulator is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub real_memory_size: usize,
    pub backing_store_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            real_memory_size: DEFAULT_REAL_MEMORY_SIZE,
            backing_store_size: DEFAULT_BACKING_STORE_SIZE,
        }
    }
}

impl VmConfig {
    /// Default sizes, with environment overrides applied when present.
    /// A malformed override is a configuration defect and fatal.
    pub fn from_env() -> Self {
        let mut config = VmConfig::default();
        if let Ok(value) = std::env::var(REAL_MEM_SIZE_VAR) {
            config.real_memory_size = parse_size(REAL_MEM_SIZE_VAR, &value);
        }
        if let Ok(value) = std::env::var(BS_SIZE_VAR) {
            config.backing_store_size = parse_size(BS_SIZE_VAR, &value);
        }
        config
    }
}

fn parse_size(var: &str, value: &str) -> usize {
    value
        .trim()
        .parse()
        .unwrap_or_else(|_| panic!("{var} is not a byte count: {value:?}"))
}

/// Running counters over the simulator's lifetime.  Purely
/// observational; nothing reads them back to make decisions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VmStats {
    pub faults: u64,
    pub tables_allocated: u64,
    pub pages_created: u64,
    pub evictions: u64,
    pub loads: u64,
}

/// The demand-paged virtual memory simulator.
///
/// Owns both simulated regions and every piece of mutable bookkeeping:
/// the two-level page tables (stored inside real memory), the three
/// bump cursors, the clock hand, and the resident-page directory.
/// Single-threaded by design; callers serialize access externally if
/// they need to share one instance.
pub struct VmSim {
    real: RealMemory,
    store: BackingStore,

    /// Real base address of the upper page table
    upper_table: RealAddr,
    /// Next free page in the reserved page-table area
    table_cursor: RealAddr,
    /// Next never-used frame in the general pool
    pool_cursor: RealAddr,
    /// Next free simulated address
    sim_cursor: SimAddr,
    /// Next never-used backing-store block; 0 is reserved for "none"
    next_block: u32,

    /// Pool-frame number -> real address of the owning lower-table
    /// slot.  The clock scans frames in this fixed physical order and
    /// needs the real->simulated back reference the tables lack.
    resident: Vec<Option<RealAddr>>,
    clock_hand: usize,

    stats: VmStats,
}

impl VmSim {
    /// Build the simulator: materialize both regions and the root
    /// page table.  Fatal if the sizes leave no room for a general
    /// pool or are not page-aligned.
    pub fn new(config: VmConfig) -> Self {
        let VmConfig { real_memory_size, backing_store_size } = config;
        assert!(
            real_memory_size % PAGE_SIZE == 0,
            "real memory size {real_memory_size} is not page-aligned"
        );
        assert!(
            real_memory_size > PT_AREA_SIZE,
            "real memory size {real_memory_size} leaves no general pool past the table area"
        );
        assert!(
            backing_store_size >= 2 * BLOCK_SIZE,
            "backing store of {backing_store_size} bytes cannot hold block 1"
        );

        let pool_frames = (real_memory_size - PT_AREA_SIZE) / PAGE_SIZE;
        let mut vm = VmSim {
            real: RealMemory::new(real_memory_size),
            store: BackingStore::new(backing_store_size),
            upper_table: 0,
            // Real page 0 is never handed out, so address 0 always
            // means "absent" inside an entry.
            table_cursor: PAGE_SIZE as RealAddr,
            pool_cursor: PT_AREA_SIZE as RealAddr,
            // Simulated page 0 is reserved as well.
            sim_cursor: PAGE_SIZE as SimAddr,
            next_block: 1,
            resident: vec![None; pool_frames],
            clock_hand: 0,
            stats: VmStats::default(),
        };
        vm.upper_table = vm.allocate_table();
        vm
    }

    /// Counters accumulated so far
    #[inline]
    pub fn stats(&self) -> VmStats {
        self.stats
    }

    /// Number of frames in the general pool
    #[inline]
    pub fn pool_frames(&self) -> usize {
        self.resident.len()
    }

    // ---------------------------------------------------------------
    // Bump allocators
    // ---------------------------------------------------------------

    /// Take a zeroed page from the reserved table area.  The area is
    /// sized for every table the pool can require, so running out of
    /// it is fatal.
    fn allocate_table(&mut self) -> RealAddr {
        let addr = self.table_cursor;
        assert!(
            addr as usize + PAGE_SIZE <= PT_AREA_SIZE,
            "page-table area exhausted at {addr:#x}"
        );
        self.table_cursor += PAGE_SIZE as RealAddr;
        self.real.zero(addr, PAGE_SIZE);
        self.stats.tables_allocated += 1;
        addr
    }

    /// Take a zeroed frame from the general pool.  When the pool is
    /// exhausted this evicts a victim and returns its frame instead.
    fn allocate_pool_frame(&mut self) -> RealAddr {
        let addr = self.pool_cursor;
        if addr as usize + PAGE_SIZE > self.real.size() {
            let victim_slot = self.find_victim();
            return self.evict(victim_slot);
        }
        self.pool_cursor += PAGE_SIZE as RealAddr;
        self.real.zero(addr, PAGE_SIZE);
        addr
    }

    // ---------------------------------------------------------------
    // Page-table plumbing
    // ---------------------------------------------------------------

    fn read_pte(&self, slot: RealAddr) -> PageTableEntry {
        let mut raw = [0u8; PTE_SIZE];
        self.real.read(&mut raw, slot);
        PageTableEntry::from_bits(u32::from_le_bytes(raw))
    }

    fn write_pte(&mut self, slot: RealAddr, pte: PageTableEntry) {
        self.real.write(&pte.bits().to_le_bytes(), slot);
    }

    fn upper_slot(&self, sim: &SimulatedAddress) -> RealAddr {
        self.upper_table + sim.upper * PTE_SIZE as u32
    }

    fn lower_slot(table: RealAddr, sim: &SimulatedAddress) -> RealAddr {
        table + sim.lower * PTE_SIZE as u32
    }

    /// Pool-frame number of a frame address, as the clock counts them
    fn frame_number(&self, frame: RealAddr) -> usize {
        debug_assert!(frame as usize >= PT_AREA_SIZE);
        debug_assert_eq!(frame & OFFSET_MASK, 0);
        (frame as usize - PT_AREA_SIZE) / PAGE_SIZE
    }

    fn register_resident(&mut self, frame: RealAddr, slot: RealAddr) {
        let number = self.frame_number(frame);
        self.resident[number] = Some(slot);
    }

    // ---------------------------------------------------------------
    // Translation and fault handling
    // ---------------------------------------------------------------

    /// Map a simulated address to a real one, faulting in whatever the
    /// walk is missing.  A successful walk marks the page referenced,
    /// and dirty on writes.
    pub fn translate(&mut self, sim_addr: SimAddr, is_write: bool) -> RealAddr {
        let sim = SimulatedAddress::from_raw(sim_addr);
        for _ in 0..MAX_TRANSLATE_ATTEMPTS {
            let upper = self.read_pte(self.upper_slot(&sim));
            if upper.is_empty() {
                self.handle_fault(&sim);
                continue;
            }

            let lower_slot = Self::lower_slot(upper.table_base(), &sim);
            let lower = self.read_pte(lower_slot);
            if lower.is_empty() || !lower.is_resident() {
                self.handle_fault(&sim);
                continue;
            }

            self.write_pte(lower_slot, lower.touched(is_write));
            let real_addr = lower.frame() | sim.offset;
            log::trace!("translate: {sim} -> {real_addr:#x}");
            return real_addr;
        }
        panic!("translation of {sim} did not settle after {MAX_TRANSLATE_ATTEMPTS} faults");
    }

    /// Resolve a failed translation: install the missing table, back a
    /// never-seen page with a fresh frame, or swap an evicted page
    /// back in.
    fn handle_fault(&mut self, sim: &SimulatedAddress) {
        self.stats.faults += 1;
        log::debug!("page fault: {sim}");

        let upper_slot = self.upper_slot(sim);
        let mut upper = self.read_pte(upper_slot);
        if upper.is_empty() {
            let table = self.allocate_table();
            upper = PageTableEntry::table(table);
            self.write_pte(upper_slot, upper);
            log::debug!("installed lower table {table:#x} for upper index {}", sim.upper);
        }

        let lower_slot = Self::lower_slot(upper.table_base(), sim);
        let lower = self.read_pte(lower_slot);
        if lower.is_empty() {
            // First touch of this page ever: back it with a pool
            // frame, evicting if the pool is already full.
            let frame = self.allocate_pool_frame();
            self.write_pte(lower_slot, PageTableEntry::resident(frame));
            self.register_resident(frame, lower_slot);
            self.stats.pages_created += 1;
            return;
        }
        if !lower.is_resident() {
            // Previously evicted: trade places with a victim frame.
            let victim_slot = self.find_victim();
            let freed = self.evict(victim_slot);
            self.load(lower_slot, freed);
        }
    }

    // ---------------------------------------------------------------
    // Second-chance replacement and swap
    // ---------------------------------------------------------------

    /// Advance the clock to the first resident page without its
    /// REFERENCED bit, clearing the bit on every page passed over.
    /// The hand is left ON the victim so the next scan resumes there.
    /// Returns the victim's lower-table slot address.
    fn find_victim(&mut self) -> RealAddr {
        let mut inspected = 0;
        loop {
            // A full sweep clears every REFERENCED bit it passes, so a
            // full pool must yield a victim within N+1 inspections.
            assert!(
                inspected <= self.resident.len(),
                "clock scan found no unreferenced resident page"
            );
            inspected += 1;

            let Some(slot) = self.resident[self.clock_hand] else {
                self.clock_hand = (self.clock_hand + 1) % self.resident.len();
                continue;
            };
            let pte = self.read_pte(slot);
            if pte.is_referenced() {
                self.write_pte(slot, pte.second_chance());
                self.clock_hand = (self.clock_hand + 1) % self.resident.len();
                continue;
            }
            return slot;
        }
    }

    /// Push the page owning `victim_slot` out to a fresh backing-store
    /// block and return its zeroed frame.  The entry, the frame, and
    /// the resident directory change together.
    fn evict(&mut self, victim_slot: RealAddr) -> RealAddr {
        let pte = self.read_pte(victim_slot);
        debug_assert!(pte.is_resident());
        let frame = pte.frame();
        let block = self.next_block;

        if let Err(e) = self.store.write_block(&self.real, frame, block) {
            panic!("backing store exhausted while evicting frame {frame:#x}: {e}");
        }
        self.next_block += 1;

        self.write_pte(victim_slot, pte.swapped_out(block));
        self.real.zero(frame, PAGE_SIZE);
        let number = self.frame_number(frame);
        self.resident[number] = None;
        self.stats.evictions += 1;
        log::debug!("evicted frame {frame:#x} to block {block}");
        frame
    }

    /// Pull the page owning `slot` back from its backing-store block
    /// into the freed `frame` and re-register it as resident.
    fn load(&mut self, slot: RealAddr, frame: RealAddr) {
        let pte = self.read_pte(slot);
        let block = pte.block();
        if let Err(e) = self.store.read_block(&mut self.real, frame, block) {
            panic!("backing store cannot produce block {block}: {e}");
        }
        self.write_pte(slot, pte.swapped_in(frame));
        self.register_resident(frame, slot);
        self.stats.loads += 1;
        log::debug!("loaded block {block} into frame {frame:#x}");
    }

    // ---------------------------------------------------------------
    // Public byte-level operations
    // ---------------------------------------------------------------

    /// Copy `buffer.len()` bytes out of simulated memory.  The copy is
    /// split at page boundaries with one translation per page, so it
    /// may span any number of pages.
    pub fn read(&mut self, buffer: &mut [u8], sim_addr: SimAddr) {
        let mut done = 0;
        while done < buffer.len() {
            let addr = sim_addr + done as SimAddr;
            let real_addr = self.translate(addr, false);
            let span = Self::span_within_page(addr, buffer.len() - done);
            self.real.read(&mut buffer[done..done + span], real_addr);
            done += span;
        }
    }

    /// Copy `buffer` into simulated memory, splitting at page
    /// boundaries like [`VmSim::read`].
    pub fn write(&mut self, buffer: &[u8], sim_addr: SimAddr) {
        let mut done = 0;
        while done < buffer.len() {
            let addr = sim_addr + done as SimAddr;
            let real_addr = self.translate(addr, true);
            let span = Self::span_within_page(addr, buffer.len() - done);
            self.real.write(&buffer[done..done + span], real_addr);
            done += span;
        }
    }

    fn span_within_page(addr: SimAddr, remaining: usize) -> usize {
        let to_page_end = PAGE_SIZE - (addr & OFFSET_MASK) as usize;
        remaining.min(to_page_end)
    }

    /// Reserve `size` bytes of simulated address space.
    /// Pointer-bumping with no reclamation; never fails.
    pub fn alloc(&mut self, size: usize) -> SimAddr {
        let addr = self.sim_cursor;
        self.sim_cursor += size as SimAddr;
        addr
    }

    /// No reclamation of simulated space, so nothing to do
    pub fn free(&mut self, _sim_addr: SimAddr) {}

    /// Read directly from the real-memory region, bounds-asserted
    pub fn read_real(&self, buffer: &mut [u8], real_addr: RealAddr) {
        self.real.read(buffer, real_addr);
    }

    /// Write directly into the real-memory region, bounds-asserted
    pub fn write_real(&mut self, buffer: &[u8], real_addr: RealAddr) {
        self.real.write(buffer, real_addr);
    }

    /// Walk the tables for `sim_addr` without faulting and without
    /// touching any status bits.  Returns the lower-table entry if the
    /// page has ever existed.
    pub fn probe(&self, sim_addr: SimAddr) -> Option<PageTableEntry> {
        let sim = SimulatedAddress::from_raw(sim_addr);
        let upper = self.read_pte(self.upper_slot(&sim));
        if upper.is_empty() {
            return None;
        }
        let lower = self.read_pte(Self::lower_slot(upper.table_base(), &sim));
        if lower.is_empty() { None } else { Some(lower) }
    }
}
