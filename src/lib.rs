pub mod constants;
pub mod memory;
pub mod translation;
pub mod vm_manager;

// Re-export commonly used items for convenience
pub use constants::*;
pub use memory::{BackingStore, BackingStoreError, RealMemory};
pub use translation::{PageTableEntry, PteFlags, RealAddr, SimAddr, SimulatedAddress};
pub use vm_manager::{VmConfig, VmSim, VmStats};
