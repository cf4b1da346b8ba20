//! Scripted monitor for development hosts.
//!
//! Replays a list of REC exits and keeps just enough RTT state to answer
//! the memory-state calls the way an RMM would: S2AP walks stop at pages
//! whose tables are missing, RIPAS changes are refused while auxiliary
//! trees still map the range.

use crate::config::{is_page_aligned, GICV3_NUM_LRS, NR_GPRS, PAGE_SIZE};
use crate::realm::{Plane, Provision, Realm, RealmParams, Rd, Rec};
use crate::rmi::error::Error;
use crate::rmi::features::{FeatureReg0, FEATURE_REGISTER_0_INDEX, RTT_PLANE_AUX_PER_PLANE};
use crate::rmi::rec::Run;
use crate::rmi::{self, Command, Monitor};

use armv9a::{
    bits_in_reg, EsrEl2, InMemoryRegister, Readable, Writeable, EMULATABLE_ABORT_MASK,
    ESR_EL2_EC_DATA_ABORT, ESR_EL2_EC_INST_ABORT, HPFAR_EL2, INST_ABORT_MASK,
    NON_EMULATABLE_ABORT_MASK,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const GRANULE_BASE: usize = 0x8800_0000;
const WALK_LEVEL: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ScriptedExit {
    HostCall {
        #[serde(default)]
        imm: u16,
        #[serde(default)]
        gprs: Vec<(usize, u64)>,
        #[serde(default)]
        cntp_ctl: u64,
        #[serde(default)]
        cntp_cval: u64,
    },
    RipasChange {
        base: usize,
        top: usize,
        #[serde(default)]
        ripas: u8,
    },
    S2apChange {
        base: usize,
        top: usize,
    },
    DataAbort {
        ipa: usize,
        dfsc: u64,
        #[serde(default)]
        emulatable: bool,
        #[serde(default)]
        write: bool,
    },
    InstructionAbort {
        ipa: usize,
        ifsc: u64,
    },
    Irq,
}

impl ScriptedExit {
    pub fn host_call() -> Self {
        ScriptedExit::HostCall {
            imm: 0,
            gprs: Vec::new(),
            cntp_ctl: 0,
            cntp_cval: 0,
        }
    }

    /// Host call reporting `cval` both in `cntp_cval` and in `x{gpr}`.
    pub fn timer(cval: u64, gpr: usize) -> Self {
        ScriptedExit::HostCall {
            imm: 0,
            gprs: vec![(gpr, cval)],
            cntp_ctl: 1,
            cntp_cval: cval,
        }
    }

    pub fn ripas_change(base: usize, top: usize, ripas: u8) -> Self {
        ScriptedExit::RipasChange { base, top, ripas }
    }

    pub fn s2ap_change(base: usize, top: usize) -> Self {
        ScriptedExit::S2apChange { base, top }
    }

    pub fn data_abort(ipa: usize, dfsc: u64, emulatable: bool, write: bool) -> Self {
        ScriptedExit::DataAbort {
            ipa,
            dfsc,
            emulatable,
            write,
        }
    }

    /// Adds (or overrides) an exit GPR of a host call.
    pub fn with_gpr(mut self, idx: usize, val: u64) -> Self {
        if let ScriptedExit::HostCall { ref mut gprs, .. } = self {
            gprs.push((idx, val));
        }
        self
    }

    pub(crate) fn apply(&self, run: &mut Run) -> Result<(), Error> {
        run.reset_exit();
        match *self {
            ScriptedExit::HostCall {
                imm,
                ref gprs,
                cntp_ctl,
                cntp_cval,
            } => {
                run.set_exit_reason(rmi::EXIT_HOST_CALL);
                run.set_imm(imm);
                for &(idx, val) in gprs {
                    run.set_gpr(idx, val)?;
                }
                run.set_cntp_ctl(cntp_ctl);
                run.set_cntp_cval(cntp_cval);
            }
            ScriptedExit::RipasChange { base, top, ripas } => {
                run.set_exit_reason(rmi::EXIT_RIPAS_CHANGE);
                run.set_ripas(base as u64, top as u64, ripas);
            }
            ScriptedExit::S2apChange { base, top } => {
                run.set_exit_reason(rmi::EXIT_S2AP_CHANGE);
                run.set_s2ap(base as u64, top as u64);
            }
            ScriptedExit::DataAbort {
                ipa,
                dfsc,
                emulatable,
                write,
            } => {
                let mut esr = EsrEl2::new(bits_in_reg(EsrEl2::EC, ESR_EL2_EC_DATA_ABORT));
                esr.set_masked_value(EsrEl2::DFSC, dfsc);
                if write {
                    esr.set_bits(EsrEl2::WNR);
                }
                let mask = match emulatable {
                    true => {
                        esr.set_bits(EsrEl2::ISV);
                        run.set_far(ipa as u64);
                        EMULATABLE_ABORT_MASK
                    }
                    false => NON_EMULATABLE_ABORT_MASK,
                };
                run.set_exit_reason(rmi::EXIT_SYNC);
                run.set_esr(esr.get() & mask);
                run.set_hpfar(hpfar(ipa));
            }
            ScriptedExit::InstructionAbort { ipa, ifsc } => {
                let mut esr = EsrEl2::new(bits_in_reg(EsrEl2::EC, ESR_EL2_EC_INST_ABORT));
                esr.set_masked_value(EsrEl2::DFSC, ifsc);
                run.set_exit_reason(rmi::EXIT_SYNC);
                run.set_esr(esr.get() & INST_ABORT_MASK);
                run.set_hpfar(hpfar(ipa));
            }
            ScriptedExit::Irq => run.set_exit_reason(rmi::EXIT_IRQ),
        }
        Ok(())
    }
}

fn hpfar(ipa: usize) -> u64 {
    let hpfar: InMemoryRegister<u64, HPFAR_EL2::Register> = InMemoryRegister::new(0);
    hpfar.write(HPFAR_EL2::FIPA.val((ipa >> 12) as u64));
    hpfar.get()
}

/// Behaviour of the scripted monitor, loadable from a fixture.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Script {
    pub max_aux_planes: usize,
    /// RTT_PLANE field of feature register 0.
    pub rtt_plane: u64,
    pub s2sz: u8,
    pub setup_fails: bool,
    /// Pages processed per RMI_RTT_SET_S2AP; the whole range when unset.
    pub s2ap_chunk: Option<usize>,
    pub ripas_chunk: Option<usize>,
    /// RMI_RTT_SET_S2AP returns its input base.
    pub s2ap_stall: bool,
    /// RTT creation succeeds but the tables stay missing.
    pub sticky_missing: bool,
    /// Raw status returned by every RMI_RTT_SET_S2AP.
    pub s2ap_error: Option<usize>,
    pub missing_rtt: BTreeSet<usize>,
    /// Page to auxiliary planes whose tables are missing there.
    pub missing_aux: BTreeMap<usize, Vec<usize>>,
    pub exits: VecDeque<ScriptedExit>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            max_aux_planes: 3,
            rtt_plane: RTT_PLANE_AUX_PER_PLANE,
            s2sz: 48,
            setup_fails: false,
            s2ap_chunk: None,
            ripas_chunk: None,
            s2ap_stall: false,
            sticky_missing: false,
            s2ap_error: None,
            missing_rtt: BTreeSet::new(),
            missing_aux: BTreeMap::new(),
            exits: VecDeque::new(),
        }
    }
}

/// Entry half of the run page as seen by one `rec_enter`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub flags: u64,
    pub gprs: [u64; NR_GPRS],
    pub gicv3_lrs: [u64; GICV3_NUM_LRS],
}

impl Entry {
    fn capture(run: &Run) -> Result<Self, Error> {
        let mut gprs = [0; NR_GPRS];
        for (idx, gpr) in gprs.iter_mut().enumerate() {
            *gpr = run.entry_gpr(idx)?;
        }
        Ok(Self {
            flags: run.entry_flags().get(),
            gprs,
            gicv3_lrs: *run.entry_gic_lrs(),
        })
    }
}

#[derive(Debug, Default)]
pub struct Mock {
    script: Script,
    next_granule: usize,
    calls: Vec<Command>,
    entries: Vec<Entry>,
    created: Vec<(usize, Plane)>,
    unmapped: Vec<(usize, Plane)>,
    aux_mapped: BTreeSet<(usize, usize)>,
    protected: BTreeSet<usize>,
    unprotected: BTreeSet<usize>,
    s2ap_set: BTreeMap<usize, usize>,
    ripas_set: BTreeMap<usize, usize>,
}

impl Mock {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            next_granule: GRANULE_BASE,
            ..Default::default()
        }
    }

    pub fn script_mut(&mut self) -> &mut Script {
        &mut self.script
    }

    pub fn push_exit(&mut self, exit: ScriptedExit) {
        self.script.exits.push_back(exit);
    }

    /// Marks `ipa` as mapped in the tree of aux plane `plane`.
    pub fn map_aux(&mut self, ipa: usize, plane: usize) {
        self.aux_mapped.insert((ipa, plane));
    }

    pub fn calls(&self) -> &[Command] {
        &self.calls
    }

    pub fn count(&self, cmd: Command) -> usize {
        self.calls.iter().filter(|&&c| c == cmd).count()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn created(&self) -> &[(usize, Plane)] {
        &self.created
    }

    pub fn unmapped(&self) -> &[(usize, Plane)] {
        &self.unmapped
    }

    pub fn s2ap_count(&self, ipa: usize) -> usize {
        self.s2ap_set.get(&ipa).copied().unwrap_or(0)
    }

    pub fn ripas_count(&self, ipa: usize) -> usize {
        self.ripas_set.get(&ipa).copied().unwrap_or(0)
    }

    pub fn is_protected(&self, ipa: usize) -> bool {
        self.protected.contains(&ipa)
    }

    pub fn is_unprotected(&self, ipa: usize) -> bool {
        self.unprotected.contains(&ipa)
    }

    pub fn remaining_exits(&self) -> usize {
        self.script.exits.len()
    }

    fn call(&mut self, cmd: Command) {
        trace!("mock: {}", cmd);
        self.calls.push(cmd);
    }

    fn granule(&mut self) -> usize {
        let addr = self.next_granule;
        self.next_granule += PAGE_SIZE;
        addr
    }

    fn aux_missing(&self, ipa: usize) -> bool {
        self.script
            .missing_aux
            .get(&ipa)
            .map_or(false, |planes| !planes.is_empty())
    }

    fn pages(ipa: usize, size: usize) -> Result<impl Iterator<Item = usize>, Error> {
        if !is_page_aligned(ipa) || !is_page_aligned(size) {
            return Err(Error::RmiErrorInput);
        }
        let top = ipa.checked_add(size).ok_or(Error::RmiErrorInput)?;
        Ok((ipa..top).step_by(PAGE_SIZE))
    }
}

impl Monitor for Mock {
    fn features(&mut self, index: usize) -> Result<u64, Error> {
        self.call(Command::Features);
        if index != FEATURE_REGISTER_0_INDEX {
            return Err(Error::RmiErrorInput);
        }
        let mut reg = FeatureReg0::new(0);
        reg.set_masked_value(FeatureReg0::S2SZ, self.script.s2sz as u64)
            .set_masked_value(FeatureReg0::MAX_NUM_AUX_PLANES, self.script.max_aux_planes as u64)
            .set_masked_value(FeatureReg0::RTT_PLANE, self.script.rtt_plane)
            .set_masked_value(FeatureReg0::GICV3_NUM_LRS, (GICV3_NUM_LRS - 1) as u64);
        Ok(reg.get())
    }

    fn rec_enter(&mut self, _rec: usize, run: &mut Run) -> Result<(), Error> {
        self.call(Command::RecEnter);
        self.entries.push(Entry::capture(run)?);

        if !run.validate() {
            return Err(Error::RmiErrorRec);
        }
        match self.script.exits.pop_front() {
            Some(exit) => exit.apply(run),
            None => {
                warn!("mock: no exit left to replay");
                Err(Error::RmiErrorRec)
            }
        }
    }

    fn rtt_set_ripas(&mut self, _rd: usize, _rec: usize, base: usize, top: usize) -> Result<usize, Error> {
        self.call(Command::RttSetRipas);
        if base >= top || !is_page_aligned(base) || !is_page_aligned(top) {
            return Err(Error::RmiErrorInput);
        }
        let end = match self.script.ripas_chunk {
            Some(chunk) => base.checked_add(chunk).map_or(top, |end| top.min(end)),
            None => top,
        };
        let range = base..end;
        if self.aux_mapped.iter().any(|(ipa, _)| range.contains(ipa)) {
            return Err(Error::RmiErrorRttAux(WALK_LEVEL));
        }
        for ipa in range.step_by(PAGE_SIZE) {
            *self.ripas_set.entry(ipa).or_insert(0) += 1;
        }
        Ok(end)
    }

    fn rtt_set_s2ap(&mut self, _rd: usize, _rec: usize, base: usize, top: usize) -> Result<usize, Error> {
        self.call(Command::RttSetS2ap);
        if let Some(err) = self.script.s2ap_error.and_then(Error::from_status) {
            return Err(err);
        }
        if self.script.s2ap_stall {
            return Ok(base);
        }

        let end = match self.script.s2ap_chunk {
            Some(chunk) => base.checked_add(chunk).map_or(top, |end| top.min(end)),
            None => top,
        };
        let mut ipa = base;
        while ipa < end {
            let missing = if self.script.missing_rtt.contains(&ipa) {
                Some(Error::RmiErrorRtt(WALK_LEVEL))
            } else if self.aux_missing(ipa) {
                Some(Error::RmiErrorRttAux(WALK_LEVEL))
            } else {
                None
            };
            match missing {
                Some(err) if ipa == base => return Err(err),
                Some(_) => break,
                None => {}
            }
            *self.s2ap_set.entry(ipa).or_insert(0) += 1;
            ipa += PAGE_SIZE;
        }
        Ok(ipa)
    }

    fn rtt_create(&mut self, _rd: usize, ipa: usize, plane: Plane) -> Result<(), Error> {
        match plane.is_primary() {
            true => self.call(Command::RttCreate),
            false => self.call(Command::RttAuxCreate),
        }
        if plane.index() > self.script.max_aux_planes {
            return Err(Error::RmiErrorInput);
        }
        self.created.push((ipa, plane));
        if self.script.sticky_missing {
            return Ok(());
        }

        if plane.is_primary() {
            self.script.missing_rtt.remove(&ipa);
        } else if let Some(planes) = self.script.missing_aux.get_mut(&ipa) {
            planes.retain(|&p| p != plane.index());
            if planes.is_empty() {
                self.script.missing_aux.remove(&ipa);
            }
        }
        Ok(())
    }

    fn rtt_unmap(&mut self, _rd: usize, ipa: usize, plane: Plane) -> Result<(), Error> {
        self.call(Command::RttAuxUnmapProtected);
        if plane.is_primary() || !is_page_aligned(ipa) {
            return Err(Error::RmiErrorInput);
        }
        self.unmapped.push((ipa, plane));
        self.aux_mapped.remove(&(ipa, plane.index()));
        Ok(())
    }
}

impl Provision for Mock {
    fn realm_setup(&mut self, params: &RealmParams) -> Result<Realm, Error> {
        params.validate()?;

        self.call(Command::RealmCreate);
        if self.script.setup_fails {
            return Err(Error::RmiErrorRealm(0));
        }
        if params.num_aux_planes > self.script.max_aux_planes {
            return Err(Error::RmiErrorInput);
        }

        let rd = Rd {
            addr: self.granule(),
            num_aux_planes: params.num_aux_planes,
            rtt_tree_pp: params.rtt_tree_pp(),
            s2sz: params.s2sz,
        };

        for region in &params.ripas_init {
            for _ in Self::pages(region.ipa, region.size)? {
                self.call(Command::RttInitRipas);
            }
        }
        for region in &params.data {
            for ipa in Self::pages(region.ipa, region.size)? {
                self.call(Command::DataCreate);
                self.protected.insert(ipa);
                if rd.rtt_tree_pp {
                    for plane in rd.aux_planes() {
                        self.aux_mapped.insert((ipa, plane.index()));
                    }
                }
            }
        }

        let mut recs = Vec::with_capacity(params.num_recs);
        for _ in 0..params.num_recs {
            self.call(Command::RecCreate);
            recs.push(Rec {
                handle: self.granule(),
                run: Run::default(),
            });
        }
        self.call(Command::RealmActivate);

        Ok(Realm { rd, recs })
    }

    fn realm_destroy(&mut self, realm: Realm) -> Result<(), Error> {
        for _ in &realm.recs {
            self.call(Command::RecDestroy);
        }
        self.call(Command::RealmDestroy);
        Ok(())
    }

    fn map_unprotected(&mut self, rd: &Rd, offset: usize, size: usize) -> Result<usize, Error> {
        let base = rd
            .unprotected_base()
            .and_then(|base| base.checked_add(offset))
            .ok_or(Error::RmiErrorInput)?;
        for ipa in Self::pages(base, size)? {
            self.call(Command::RttMapUnprotected);
            self.unprotected.insert(ipa);
        }
        Ok(base)
    }

    fn map_protected_unknown(&mut self, _rd: &Rd, ipa: usize, size: usize) -> Result<(), Error> {
        for ipa in Self::pages(ipa, size)? {
            self.call(Command::DataCreateUnknown);
            self.protected.insert(ipa);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rmi::features::Features;
    use crate::rmi::rec::{ExitKind, RecExit};

    #[test]
    fn features_reflect_script() {
        let mut mock = Mock::new(Script {
            max_aux_planes: 0,
            ..Default::default()
        });
        let feat = Features::query(&mut mock).unwrap();
        assert!(!feat.supports_planes());
        assert_eq!(mock.features(1), Err(Error::RmiErrorInput));
    }

    #[test]
    fn replays_exits_in_order() {
        let mut mock = Mock::new(Script::default());
        mock.push_exit(ScriptedExit::s2ap_change(0x1000, 0x2000));
        mock.push_exit(ScriptedExit::host_call().with_gpr(1, 7));

        let mut run = Run::default();
        mock.rec_enter(0, &mut run).unwrap();
        assert_eq!(RecExit::classify(&run).unwrap().kind(), ExitKind::S2apChange);

        mock.rec_enter(0, &mut run).unwrap();
        assert_eq!(RecExit::classify(&run).unwrap().kind(), ExitKind::HostCall);
        assert_eq!(run.exit_gpr(1), Ok(7));
        // previous exit fields do not leak
        assert_eq!(run.s2ap_top(), 0);

        assert_eq!(mock.rec_enter(0, &mut run), Err(Error::RmiErrorRec));
    }

    #[test]
    fn s2ap_stops_before_missing_tables() {
        let mut mock = Mock::new(Script::default());
        mock.script_mut().missing_rtt.insert(0x2000);

        assert_eq!(mock.rtt_set_s2ap(0, 0, 0x1000, 0x3000), Ok(0x2000));
        assert_eq!(mock.rtt_set_s2ap(0, 0, 0x2000, 0x3000), Err(Error::RmiErrorRtt(3)));
        mock.rtt_create(0, 0x2000, Plane::PRIMARY).unwrap();
        assert_eq!(mock.rtt_set_s2ap(0, 0, 0x2000, 0x3000), Ok(0x3000));
    }

    #[test]
    fn setup_populates_and_activates() {
        let mut mock = Mock::new(Script::default());
        let params = RealmParams {
            num_aux_planes: 1,
            num_recs: 2,
            data: vec![crate::realm::Region {
                ipa: 0x1000,
                size: 0x1000,
            }],
            ..Default::default()
        };

        let realm = mock.realm_setup(&params).unwrap();
        assert_eq!(realm.recs.len(), 2);
        assert!(realm.rd.rtt_tree_pp);
        assert!(mock.is_protected(0x1000));
        assert_eq!(mock.calls().last(), Some(&Command::RealmActivate));

        let ipa = mock.map_unprotected(&realm.rd, 0x1000, 0x1000).unwrap();
        assert_eq!(ipa, (1 << 39) + 0x1000);
        assert!(mock.is_unprotected(ipa));

        mock.realm_destroy(realm).unwrap();
        assert_eq!(mock.count(Command::RecDestroy), 2);
    }

    #[test]
    fn address_overflow_is_rejected() {
        let mut mock = Mock::new(Script {
            s2ap_chunk: Some(usize::MAX),
            ..Default::default()
        });
        let rd = Rd {
            addr: 0,
            num_aux_planes: 0,
            rtt_tree_pp: false,
            s2sz: 48,
        };
        let near_top = usize::MAX & !crate::config::PAGE_MASK;

        assert_eq!(mock.map_unprotected(&rd, near_top, 0x1000), Err(Error::RmiErrorInput));
        assert_eq!(mock.map_protected_unknown(&rd, near_top, 0x2000), Err(Error::RmiErrorInput));
        // the chunk saturates at the requested top
        assert_eq!(mock.rtt_set_s2ap(0, 0, 0x1000, 0x3000), Ok(0x3000));

        let wide = Rd { s2sz: 70, ..rd };
        assert_eq!(mock.map_unprotected(&wide, 0, 0x1000), Err(Error::RmiErrorInput));
    }

    #[test]
    fn exits_from_json() {
        let exits: Vec<ScriptedExit> = serde_json::from_str(
            r#"[
                { "reason": "host_call", "gprs": [[1, 16]] },
                { "reason": "data_abort", "ipa": 4096, "dfsc": 7, "write": true },
                { "reason": "irq" }
            ]"#,
        )
        .unwrap();
        assert_eq!(exits[0], ScriptedExit::host_call().with_gpr(1, 16));
        assert_eq!(exits[1], ScriptedExit::data_abort(0x1000, 7, false, true));
        assert_eq!(exits[2], ScriptedExit::Irq);
    }
}
