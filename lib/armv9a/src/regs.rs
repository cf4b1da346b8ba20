#![allow(unused_attributes)]

mod cnt_ctl;
mod hpfar_el2;
mod ich_lr_el2;

pub use cnt_ctl::CNT_CTL;
pub use hpfar_el2::{fault_ipa, HPFAR_EL2};
pub use ich_lr_el2::ICH_LR_EL2;

define_bits!(
    EsrEl2,
    // Exception Class.
    EC[31 - 26],
    // Instruction Length for synchronous exceptions.
    IL[25 - 25],
    // Instruction syndrome valid.
    ISV[24 - 24],
    // Syndrome Access Size (ISV == '1')
    SAS[23 - 22],
    // Syndrome Sign Extend (ISV == '1')
    SSE[21 - 21],
    // Syndrome Register Transfer (ISV == '1')
    SRT[20 - 16],
    // Width of the register accessed by the instruction is Sixty-Four (ISV == '1')
    SF[15 - 15],
    // Acquire/Release. (ISV == '1')
    AR[14 - 14],
    // Indicates that the fault came from use of VNCR_EL2 register by EL1 code.
    VNCR[13 - 13],
    // Synchronous Error Type
    SET[12 - 11],
    // FAR not Valid
    FNV[10 - 10],
    // External Abort type
    EA[9 - 9],
    // Cache Maintenance
    CM[8 - 8],
    S1PTW[7 - 7],
    // Write not Read.
    WNR[6 - 6],
    DFSC[5 - 0]
);

impl EsrEl2 {
    pub fn ec(&self) -> u64 {
        self.get_masked_value(EsrEl2::EC)
    }

    pub fn is_data_abort(&self) -> bool {
        self.ec() == ESR_EL2_EC_DATA_ABORT
    }

    pub fn is_inst_abort(&self) -> bool {
        self.ec() == ESR_EL2_EC_INST_ABORT
    }

    /// Fault status code: DFSC for data aborts, IFSC for instruction aborts.
    pub fn fsc(&self) -> u64 {
        self.get_masked_value(EsrEl2::DFSC)
    }

    pub fn is_write(&self) -> bool {
        self.get_masked(EsrEl2::WNR) != 0
    }

    pub fn is_syndrome_valid(&self) -> bool {
        self.get_masked(EsrEl2::ISV) != 0
    }
}

pub const ESR_EL2_EC_HVC: u64 = 22;
pub const ESR_EL2_EC_INST_ABORT: u64 = 32;
pub const ESR_EL2_EC_DATA_ABORT: u64 = 36;

// Fault status codes, level encoded in the low two bits.
pub const FSC_TRANSLATION_FAULT: u64 = 0b000100;
pub const FSC_TRANSLATION_FAULT_L3: u64 = FSC_TRANSLATION_FAULT | 3;

pub const NON_EMULATABLE_ABORT_MASK: u64 =
    EsrEl2::EC | EsrEl2::SET | EsrEl2::FNV | EsrEl2::EA | EsrEl2::DFSC;
pub const EMULATABLE_ABORT_MASK: u64 =
    NON_EMULATABLE_ABORT_MASK | EsrEl2::ISV | EsrEl2::SAS | EsrEl2::SF | EsrEl2::WNR;
pub const INST_ABORT_MASK: u64 = EsrEl2::EC | EsrEl2::SET | EsrEl2::EA | EsrEl2::DFSC;
