pub mod error;
pub mod features;
pub mod rec;
pub mod rtt;

use crate::define_interface;
use crate::realm::Plane;
use crate::rmi::error::Error;
use crate::rmi::rec::run::Run;

define_interface! {
    command {
        Features             => "RMI_FEATURES",
        RealmCreate          => "RMI_REALM_CREATE",
        RealmActivate        => "RMI_REALM_ACTIVATE",
        RealmDestroy         => "RMI_REALM_DESTROY",
        RecCreate            => "RMI_REC_CREATE",
        RecDestroy           => "RMI_REC_DESTROY",
        RecEnter             => "RMI_REC_ENTER",
        DataCreate           => "RMI_DATA_CREATE",
        DataCreateUnknown    => "RMI_DATA_CREATE_UNKNOWN",
        RttCreate            => "RMI_RTT_CREATE",
        RttAuxCreate         => "RMI_RTT_AUX_CREATE",
        RttInitRipas         => "RMI_RTT_INIT_RIPAS",
        RttSetRipas          => "RMI_RTT_SET_RIPAS",
        RttSetS2ap           => "RMI_RTT_SET_S2AP",
        RttMapUnprotected    => "RMI_RTT_MAP_UNPROTECTED",
        RttAuxUnmapProtected => "RMI_RTT_AUX_UNMAP_PROTECTED",
    }
}

pub const SUCCESS: usize = 0;
pub const ERROR_INPUT: usize = 1;
pub const ERROR_REALM: usize = 2;
pub const ERROR_REC: usize = 3;
pub const ERROR_RTT: usize = 4;
pub const ERROR_NOT_SUPPORTED: usize = 5;
pub const ERROR_DEVICE: usize = 6;
pub const ERROR_RTT_AUX: usize = 7;

pub const EXIT_SYNC: u8 = 0;
pub const EXIT_IRQ: u8 = 1;
pub const EXIT_FIQ: u8 = 2;
pub const EXIT_PSCI: u8 = 3;
pub const EXIT_RIPAS_CHANGE: u8 = 4;
pub const EXIT_HOST_CALL: u8 = 5;
pub const EXIT_SERROR: u8 = 6;
pub const EXIT_S2AP_CHANGE: u8 = 7;

pub mod ripas {
    pub const EMPTY: u8 = 0;
    pub const RAM: u8 = 1;
}

/// The RMI surface the driver consumes.
///
/// Every call is synchronous. `rec_enter` is the only one that runs realm
/// code; it returns once the REC has exited and `run`'s exit half has been
/// written. Handles (`rd`, `rec`) are the physical addresses of the
/// corresponding granules.
pub trait Monitor {
    /// RMI_FEATURES: returns the feature register selected by `index`.
    fn features(&mut self, index: usize) -> Result<u64, Error>;

    fn rec_enter(&mut self, rec: usize, run: &mut Run) -> Result<(), Error>;

    /// RMI_RTT_SET_RIPAS over `[base, top)`. Returns `out_top`, the top of
    /// the region actually processed.
    fn rtt_set_ripas(&mut self, rd: usize, rec: usize, base: usize, top: usize)
        -> Result<usize, Error>;

    /// RMI_RTT_SET_S2AP over `[base, top)`. Returns the continuation cursor.
    fn rtt_set_s2ap(&mut self, rd: usize, rec: usize, base: usize, top: usize)
        -> Result<usize, Error>;

    /// Creates the missing translation tables covering `ipa` in the tree of
    /// `plane` (RMI_RTT_CREATE for the primary plane, RMI_RTT_AUX_CREATE
    /// otherwise).
    fn rtt_create(&mut self, rd: usize, ipa: usize, plane: Plane) -> Result<(), Error>;

    /// Unmaps the protected page at `ipa` from the tree of an auxiliary
    /// `plane` (RMI_RTT_AUX_UNMAP_PROTECTED).
    fn rtt_unmap(&mut self, rd: usize, ipa: usize, plane: Plane) -> Result<(), Error>;
}

/// Exit reason name used in logs.
pub fn exit_to_str(exit_reason: u8) -> &'static str {
    match exit_reason {
        EXIT_SYNC => "RMI_EXIT_SYNC",
        EXIT_IRQ => "RMI_EXIT_IRQ",
        EXIT_FIQ => "RMI_EXIT_FIQ",
        EXIT_PSCI => "RMI_EXIT_PSCI",
        EXIT_RIPAS_CHANGE => "RMI_EXIT_RIPAS_CHANGE",
        EXIT_HOST_CALL => "RMI_EXIT_HOST_CALL",
        EXIT_SERROR => "RMI_EXIT_SERROR",
        EXIT_S2AP_CHANGE => "RMI_EXIT_S2AP_CHANGE",
        _ => "RMI_EXIT_UNKNOWN",
    }
}
