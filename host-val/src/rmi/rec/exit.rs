//! Interpretation of the exit half of the run page.
//!
//! The monitor fills every exit field on each REC exit but only those of the
//! reported reason are meaningful. [`RecExit`] carries exactly those.

use super::run::Run;
use crate::rmi;
use crate::rmi::rtt::{self, IpaRange};

use armv9a::{fault_ipa, EsrEl2};
use serde::Deserialize;

/// Exit categories, as named by scenario fixtures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    HostCall,
    RipasChange,
    S2apChange,
    DataAbort,
    InstructionAbort,
    Irq,
    Sync,
    Fiq,
    Psci,
    Serror,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortKind {
    /// ESR.ISV is set, the host may emulate the access.
    Emulatable,
    NonEmulatable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataAbort {
    esr: EsrEl2,
    far: u64,
    hpfar: u64,
}

impl DataAbort {
    pub fn esr(&self) -> EsrEl2 {
        self.esr
    }

    pub fn far(&self) -> u64 {
        self.far
    }

    pub fn fault_ipa(&self) -> usize {
        fault_ipa(self.hpfar) as usize
    }

    pub fn dfsc(&self) -> u64 {
        self.esr.fsc()
    }

    pub fn kind(&self) -> AbortKind {
        if self.esr.is_syndrome_valid() {
            AbortKind::Emulatable
        } else {
            AbortKind::NonEmulatable
        }
    }

    /// WnR only survives the monitor's ESR mask for emulatable aborts.
    pub fn access(&self) -> Option<Access> {
        match self.kind() {
            AbortKind::Emulatable if self.esr.is_write() => Some(Access::Write),
            AbortKind::Emulatable => Some(Access::Read),
            AbortKind::NonEmulatable => None,
        }
    }

    pub fn matches(&self, ipa: usize, dfsc: u64, kind: AbortKind, access: Access) -> bool {
        if self.fault_ipa() != ipa || self.dfsc() != dfsc || self.kind() != kind {
            return false;
        }
        match self.access() {
            Some(observed) => observed == access,
            None => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecExit {
    HostCall { imm: u16 },
    RipasChange { range: IpaRange, ripas: u8 },
    S2apChange { range: IpaRange },
    DataAbort(DataAbort),
    InstructionAbort { esr: EsrEl2, far: u64, fault_ipa: usize },
    Irq,
    Other(u8),
}

impl RecExit {
    /// Decodes the latest exit. A RIPAS or S2AP request carrying a range
    /// that is not page granular, or inverted, is rejected.
    pub fn classify(run: &Run) -> Result<Self, rtt::Error> {
        let exit = match run.exit_reason() {
            rmi::EXIT_HOST_CALL => RecExit::HostCall { imm: run.imm() },
            rmi::EXIT_RIPAS_CHANGE => RecExit::RipasChange {
                range: IpaRange::new(run.ripas_base() as usize, run.ripas_top() as usize)?,
                ripas: run.ripas_value(),
            },
            rmi::EXIT_S2AP_CHANGE => RecExit::S2apChange {
                range: IpaRange::new(run.s2ap_base() as usize, run.s2ap_top() as usize)?,
            },
            rmi::EXIT_IRQ => RecExit::Irq,
            rmi::EXIT_SYNC => {
                let esr = EsrEl2::new(run.esr());
                if esr.is_data_abort() {
                    RecExit::DataAbort(DataAbort {
                        esr,
                        far: run.far(),
                        hpfar: run.hpfar(),
                    })
                } else if esr.is_inst_abort() {
                    RecExit::InstructionAbort {
                        esr,
                        far: run.far(),
                        fault_ipa: fault_ipa(run.hpfar()) as usize,
                    }
                } else {
                    RecExit::Other(rmi::EXIT_SYNC)
                }
            }
            reason => RecExit::Other(reason),
        };
        Ok(exit)
    }

    pub fn kind(&self) -> ExitKind {
        match self {
            RecExit::HostCall { .. } => ExitKind::HostCall,
            RecExit::RipasChange { .. } => ExitKind::RipasChange,
            RecExit::S2apChange { .. } => ExitKind::S2apChange,
            RecExit::DataAbort(_) => ExitKind::DataAbort,
            RecExit::InstructionAbort { .. } => ExitKind::InstructionAbort,
            RecExit::Irq => ExitKind::Irq,
            RecExit::Other(rmi::EXIT_SYNC) => ExitKind::Sync,
            RecExit::Other(rmi::EXIT_FIQ) => ExitKind::Fiq,
            RecExit::Other(rmi::EXIT_PSCI) => ExitKind::Psci,
            RecExit::Other(rmi::EXIT_SERROR) => ExitKind::Serror,
            RecExit::Other(_) => ExitKind::Unknown,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::*;
    use armv9a::{bits_in_reg, ESR_EL2_EC_DATA_ABORT, FSC_TRANSLATION_FAULT_L3};

    #[test]
    fn host_call() {
        let run = host_call_exit(&[]);
        assert_eq!(RecExit::classify(&run).unwrap().kind(), ExitKind::HostCall);
    }

    #[test]
    fn misaligned_s2ap_range_is_rejected() {
        let mut run = Run::default();
        run.set_exit_reason(rmi::EXIT_S2AP_CHANGE);
        run.set_s2ap(0x1000, 0x1800);
        assert!(RecExit::classify(&run).is_err());

        run.set_s2ap(0x3000, 0x1000);
        assert!(RecExit::classify(&run).is_err());
    }

    #[test]
    fn ripas_change_range() {
        let mut run = Run::default();
        run.set_exit_reason(rmi::EXIT_RIPAS_CHANGE);
        run.set_ripas(0x1000, 0x2000, rmi::ripas::EMPTY);

        match RecExit::classify(&run).unwrap() {
            RecExit::RipasChange { range, ripas } => {
                assert_eq!(range.base(), 0x1000);
                assert_eq!(range.top(), 0x2000);
                assert_eq!(ripas, rmi::ripas::EMPTY);
            }
            other => panic!("unexpected exit {:?}", other),
        }
    }

    #[test]
    fn non_emulatable_data_abort() {
        let run = data_abort_exit(0x1000, FSC_TRANSLATION_FAULT_L3, false, true);
        let da = match RecExit::classify(&run).unwrap() {
            RecExit::DataAbort(da) => da,
            other => panic!("unexpected exit {:?}", other),
        };

        assert_eq!(da.fault_ipa(), 0x1000);
        assert_eq!(da.kind(), AbortKind::NonEmulatable);
        assert_eq!(da.access(), None);
        assert!(da.matches(0x1000, FSC_TRANSLATION_FAULT_L3, AbortKind::NonEmulatable, Access::Write));
        assert!(!da.matches(0x2000, FSC_TRANSLATION_FAULT_L3, AbortKind::NonEmulatable, Access::Write));
        assert!(!da.matches(0x1000, FSC_TRANSLATION_FAULT_L3, AbortKind::Emulatable, Access::Write));
    }

    #[test]
    fn emulatable_abort_checks_direction() {
        let run = data_abort_exit(0x4000, FSC_TRANSLATION_FAULT_L3, true, false);
        let da = match RecExit::classify(&run).unwrap() {
            RecExit::DataAbort(da) => da,
            other => panic!("unexpected exit {:?}", other),
        };

        assert_eq!(da.access(), Some(Access::Read));
        assert!(da.matches(0x4000, FSC_TRANSLATION_FAULT_L3, AbortKind::Emulatable, Access::Read));
        assert!(!da.matches(0x4000, FSC_TRANSLATION_FAULT_L3, AbortKind::Emulatable, Access::Write));
    }

    #[test]
    fn sync_without_abort() {
        let mut run = Run::default();
        run.set_exit_reason(rmi::EXIT_SYNC);
        run.set_esr(bits_in_reg(EsrEl2::EC, armv9a::ESR_EL2_EC_HVC));
        assert_eq!(RecExit::classify(&run).unwrap(), RecExit::Other(rmi::EXIT_SYNC));

        run.set_esr(bits_in_reg(EsrEl2::EC, ESR_EL2_EC_DATA_ABORT));
        assert_eq!(RecExit::classify(&run).unwrap().kind(), ExitKind::DataAbort);
    }
}
