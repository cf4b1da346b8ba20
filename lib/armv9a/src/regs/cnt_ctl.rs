// SPDX-License-Identifier: Apache-2.0 OR MIT
//

//! Counter-timer Control Register (CNTP_CTL_EL0 / CNTV_CTL_EL0)
//!
//! Both the physical and the virtual timer control values in the REC exit
//! record share this layout.

use tock_registers::register_bitfields;

register_bitfields! {u64,
    pub CNT_CTL [
        /// The timer condition is met.
        ISTATUS OFFSET(2) NUMBITS(1) [],
        /// Timer interrupt is masked.
        IMASK OFFSET(1) NUMBITS(1) [],
        ENABLE OFFSET(0) NUMBITS(1) [],
    ]
}
