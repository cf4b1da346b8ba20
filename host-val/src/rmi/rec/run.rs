use crate::config::{GICV3_NUM_LRS, NR_GPRS};
use crate::rmi::error::Error;

use armv9a::{define_bits, InMemoryRegister, Readable, ICH_LR_EL2};

define_bits!(
    EntryFlag,
    S2AP_RESPONSE[5 - 5],
    RIPAS_RESPONSE[4 - 4],
    TRAP_WFE[3 - 3],
    TRAP_WFI[2 - 2],
    INJECT_SEA[1 - 1],
    EMUL_MMIO[0 - 0]
);

/// The structure holds data passsed between the Host and the RMM
/// on Realm Execution Context (REC) entry and exit.
///
/// Only the exit fields that belong to the latest exit reason carry
/// meaning; the others keep whatever the monitor left there.
#[derive(Clone, Default)]
pub struct Run {
    entry: Entry,
    exit: Exit,
}

/// Data passsed from the Host to the RMM on REC entry.
#[derive(Clone, Default)]
struct Entry {
    flags: u64,
    gprs: [u64; NR_GPRS],
    gicv3_lrs: [u64; GICV3_NUM_LRS],
}

/// Data passsed from the RMM to the Host on REC exit.
#[derive(Clone, Default)]
struct Exit {
    exit_reason: u8,
    esr: u64,
    far: u64,
    hpfar: u64,
    gprs: [u64; NR_GPRS],
    cntp_ctl: u64,
    cntp_cval: u64,
    ripas_base: u64,
    ripas_top: u64,
    ripas_value: u8,
    s2ap_base: u64,
    s2ap_top: u64,
    imm: u16,
}

fn check_gpr(idx: usize) -> Result<(), Error> {
    if idx >= NR_GPRS {
        error!("out of index: {}", idx);
        return Err(Error::RmiErrorInput);
    }
    Ok(())
}

// Host side
impl Run {
    pub fn entry_flags(&self) -> EntryFlag {
        EntryFlag::new(self.entry.flags)
    }

    pub fn set_entry_flags(&mut self, flags: u64) {
        self.entry.flags = flags;
    }

    pub fn entry_gpr(&self, idx: usize) -> Result<u64, Error> {
        check_gpr(idx)?;
        Ok(self.entry.gprs[idx])
    }

    pub fn set_entry_gpr(&mut self, idx: usize, val: u64) -> Result<(), Error> {
        check_gpr(idx)?;
        self.entry.gprs[idx] = val;
        Ok(())
    }

    pub fn entry_gic_lrs(&self) -> &[u64; GICV3_NUM_LRS] {
        &self.entry.gicv3_lrs
    }

    pub fn set_entry_gic_lr(&mut self, idx: usize, val: u64) -> Result<(), Error> {
        if idx >= GICV3_NUM_LRS {
            error!("out of index: {}", idx);
            return Err(Error::RmiErrorInput);
        }
        self.entry.gicv3_lrs[idx] = val;
        Ok(())
    }

    pub fn exit_reason(&self) -> u8 {
        self.exit.exit_reason
    }

    pub fn esr(&self) -> u64 {
        self.exit.esr
    }

    pub fn far(&self) -> u64 {
        self.exit.far
    }

    pub fn hpfar(&self) -> u64 {
        self.exit.hpfar
    }

    pub fn exit_gpr(&self, idx: usize) -> Result<u64, Error> {
        check_gpr(idx)?;
        Ok(self.exit.gprs[idx])
    }

    pub fn cntp_ctl(&self) -> u64 {
        self.exit.cntp_ctl
    }

    pub fn cntp_cval(&self) -> u64 {
        self.exit.cntp_cval
    }

    pub fn ripas_base(&self) -> u64 {
        self.exit.ripas_base
    }

    pub fn ripas_top(&self) -> u64 {
        self.exit.ripas_top
    }

    pub fn ripas_value(&self) -> u8 {
        self.exit.ripas_value
    }

    pub fn s2ap_base(&self) -> u64 {
        self.exit.s2ap_base
    }

    pub fn s2ap_top(&self) -> u64 {
        self.exit.s2ap_top
    }

    pub fn imm(&self) -> u16 {
        self.exit.imm
    }

    /// A6.1 Realm interrupts: list registers handed in by the host must
    /// be purely virtual (HW == '0').
    pub fn validate(&self) -> bool {
        self.entry.gicv3_lrs.iter().all(|lr| {
            let lr: InMemoryRegister<u64, ICH_LR_EL2::Register> = InMemoryRegister::new(*lr);
            lr.read(ICH_LR_EL2::HW) == 0
        })
    }
}

// Monitor side
impl Run {
    pub fn reset_exit(&mut self) {
        self.exit = Exit::default();
    }

    pub fn set_exit_reason(&mut self, exit_reason: u8) {
        self.exit.exit_reason = exit_reason;
    }

    pub fn set_esr(&mut self, esr: u64) {
        self.exit.esr = esr;
    }

    pub fn set_far(&mut self, far: u64) {
        self.exit.far = far;
    }

    pub fn set_hpfar(&mut self, hpfar: u64) {
        self.exit.hpfar = hpfar;
    }

    pub fn set_gpr(&mut self, idx: usize, val: u64) -> Result<(), Error> {
        check_gpr(idx)?;
        self.exit.gprs[idx] = val;
        Ok(())
    }

    pub fn set_cntp_ctl(&mut self, val: u64) {
        self.exit.cntp_ctl = val;
    }

    pub fn set_cntp_cval(&mut self, val: u64) {
        self.exit.cntp_cval = val;
    }

    pub fn set_ripas(&mut self, base: u64, top: u64, state: u8) {
        self.exit.ripas_base = base;
        self.exit.ripas_top = top;
        self.exit.ripas_value = state;
    }

    pub fn set_s2ap(&mut self, base: u64, top: u64) {
        self.exit.s2ap_base = base;
        self.exit.s2ap_top = top;
    }

    pub fn set_imm(&mut self, imm: u16) {
        self.exit.imm = imm;
    }
}

impl core::fmt::Debug for Run {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("rec::Run")
            .field("entry::flags", &format_args!("{:#X}", &self.entry.flags))
            .field("entry::gprs", &self.entry.gprs)
            .field("entry::gicv3_lrs", &self.entry.gicv3_lrs)
            .field("exit::exit_reason", &self.exit.exit_reason)
            .field("exit::esr", &format_args!("{:#X}", &self.exit.esr))
            .field("exit::far", &format_args!("{:#X}", &self.exit.far))
            .field("exit::hpfar", &format_args!("{:#X}", &self.exit.hpfar))
            .field("exit::gprs", &self.exit.gprs)
            .field("exit::imm", &self.exit.imm)
            .field("exit::ripas_base", &format_args!("{:#X}", &self.exit.ripas_base))
            .field("exit::ripas_top", &format_args!("{:#X}", &self.exit.ripas_top))
            .field("exit::ripas_value", &self.exit.ripas_value)
            .field("exit::s2ap_base", &format_args!("{:#X}", &self.exit.s2ap_base))
            .field("exit::s2ap_top", &format_args!("{:#X}", &self.exit.s2ap_top))
            .field("exit::cntp_ctl", &self.exit.cntp_ctl)
            .field("exit::cntp_cval", &self.exit.cntp_cval)
            .finish()
    }
}
