// SPDX-License-Identifier: Apache-2.0 OR MIT
//

//! Hypervisor IPA Fault Address Register - EL2
//!
//! Holds the faulting IPA for stage 2 aborts, as reported in `rec_exit.hpfar`.

use tock_registers::{interfaces::Readable, register_bitfields, registers::InMemoryRegister};

register_bitfields! {u64,
    pub HPFAR_EL2 [
        /// Faulting IPA is in the Non-secure address space.
        NS OFFSET(63) NUMBITS(1) [],
        /// Faulting Intermediate Physical Address, bits [55:12].
        FIPA OFFSET(4) NUMBITS(44) [],
    ]
}

/// Page-aligned IPA of the fault described by an HPFAR_EL2 value.
pub fn fault_ipa(hpfar: u64) -> u64 {
    let hpfar: InMemoryRegister<u64, HPFAR_EL2::Register> = InMemoryRegister::new(hpfar);
    hpfar.read(HPFAR_EL2::FIPA) << 12
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fipa_to_ipa() {
        // FIPA holds IPA[55:12] starting at bit 4
        assert_eq!(fault_ipa(0x1000 >> 8), 0x1000);
        assert_eq!(fault_ipa((0x80_0000_2000 >> 8) | 0xf), 0x80_0000_2000);
    }
}
