pub const PAGE_BITS: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_BITS; // 4KiB
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Number of general purpose registers carried by the REC run page.
pub const NR_GPRS: usize = 31;
pub const GICV3_NUM_LRS: usize = 16;

/// Architectural limit on auxiliary planes per realm.
pub const MAX_AUX_PLANES: usize = 3;

/// IPA width bounds accepted for a realm, 52 bits needing LPA2.
pub const MIN_S2SZ: u8 = 32;
pub const MAX_S2SZ: u8 = 52;

pub const DEFAULT_S2SZ: u8 = 40;
pub const DEFAULT_NUM_RECS: usize = 1;

pub fn is_page_aligned(addr: usize) -> bool {
    addr & PAGE_MASK == 0
}
