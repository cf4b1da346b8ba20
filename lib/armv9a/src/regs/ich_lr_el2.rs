// SPDX-License-Identifier: Apache-2.0 OR MIT
//

//! Interrupt Controller List Registers - EL2
//!
//! The host hands virtual interrupts to a REC through `rec_entry.gicv3_lrs`
//! using this layout.

use tock_registers::register_bitfields;

register_bitfields! {u64,
    pub ICH_LR_EL2 [
        STATE OFFSET(62) NUMBITS(2) [
            Invalid = 0b00,
            Pending = 0b01,
            Active = 0b10,
            PendingActive = 0b11,
        ],
        /// Virtual interrupt maps to a physical one. Must be 0 for realms.
        HW OFFSET(61) NUMBITS(1) [],
        GROUP OFFSET(60) NUMBITS(1) [],
        PRIORITY OFFSET(48) NUMBITS(8) [],
        PINTID OFFSET(32) NUMBITS(13) [],
        VINTID OFFSET(0) NUMBITS(32) [],
    ]
}
