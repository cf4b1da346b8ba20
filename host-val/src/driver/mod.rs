//! Resume/exit loop of a single REC.
//!
//! A [`Driver`] resumes the REC once per [`Step`], classifies the exit,
//! completes the architected host side of it (RIPAS assignment, S2AP
//! propagation, abort fix-ups, interrupt delivery) and records every
//! decision in the [`Ledger`].

use crate::checkpoint::{Checkpoint, Ledger};
use crate::error::Error;
use crate::realm::{Provision, Rd, Rec};
use crate::rmi::rec::{ExitKind, RecExit};
use crate::rmi::rtt::{self, IpaRange};
use crate::rmi::{exit_to_str, Command, Monitor};
use crate::scenario::{HostAction, Step, TimerExpect};

use armv9a::{InMemoryRegister, Readable, Writeable, CNT_CTL, ICH_LR_EL2};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Running,
    AwaitingHostAction,
    Terminal,
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Fail(Checkpoint),
    Skip,
}

pub struct Driver<'a, M> {
    monitor: &'a mut M,
    rd: Rd,
    rec: &'a mut Rec,
    ledger: &'a mut Ledger,
    state: State,
    resumes: usize,
}

impl<'a, M: Monitor + Provision> Driver<'a, M> {
    pub fn new(monitor: &'a mut M, rd: Rd, rec: &'a mut Rec, ledger: &'a mut Ledger) -> Self {
        Self {
            monitor,
            rd,
            rec,
            ledger,
            state: State::Running,
            resumes: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn resumes(&self) -> usize {
        self.resumes
    }

    /// Drives `steps` in order until one of them fails or reaches a
    /// terminal exit.
    pub fn run(&mut self, steps: &[Step]) -> Outcome {
        for step in steps {
            for _ in 0..step.repeat {
                match self.run_step(step) {
                    Outcome::Continue => {}
                    outcome => return outcome,
                }
                if self.state == State::Terminal {
                    return Outcome::Continue;
                }
            }
        }
        Outcome::Continue
    }

    pub fn run_step(&mut self, step: &Step) -> Outcome {
        match self.try_step(step) {
            Ok(()) => Outcome::Continue,
            Err(point) => {
                self.state = State::Aborted;
                Outcome::Fail(point)
            }
        }
    }

    fn try_step(&mut self, step: &Step) -> Result<(), Checkpoint> {
        if self.state != State::Running {
            error!("REC {:#x} resumed in state {:?}", self.rec.handle, self.state);
            return self.verify(false);
        }

        if let Some(flags) = step.flags {
            self.rec.run.set_entry_flags(flags);
        }
        self.resume()?;

        let exit = self.classify(step.expect)?;
        self.state = State::AwaitingHostAction;

        match exit {
            RecExit::RipasChange { range, ripas } => {
                debug!("RIPAS change to {} over {}", ripas, range);
                self.on_ripas_change(step, range)?;
            }
            RecExit::S2apChange { range } => {
                debug!("S2AP change over {}", range);
                self.on_s2ap_change(range)?;
            }
            RecExit::DataAbort(da) => {
                if let Some(expect) = step.abort {
                    let ok = da.matches(expect.ipa, expect.dfsc, expect.kind, expect.access);
                    if !ok {
                        error!(
                            "REC exit DA mismatch: ipa {:#x} dfsc {:#x} {:?} {:?}",
                            da.fault_ipa(),
                            da.dfsc(),
                            da.kind(),
                            da.access()
                        );
                    }
                    self.verify(ok)?;
                }
            }
            RecExit::HostCall { imm } => {
                trace!("host call imm {:#x}", imm);
                if let Some(timer) = step.timer {
                    self.on_timer_check(timer)?;
                }
            }
            _ => {}
        }

        for action in &step.actions {
            self.perform(action)?;
        }

        self.state = match step.terminal {
            true => State::Terminal,
            false => State::Running,
        };
        Ok(())
    }

    fn resume(&mut self) -> Result<(), Checkpoint> {
        let handle = self.rec.handle;
        let ret = self.monitor.rec_enter(handle, &mut self.rec.run);
        self.resumes += 1;
        trace!("{} {:#x} -> {:?}", Command::RecEnter, handle, ret);
        self.check("Rec enter failed", ret)
    }

    fn classify(&mut self, expect: ExitKind) -> Result<RecExit, Checkpoint> {
        let run = &self.rec.run;
        let exit = match RecExit::classify(run) {
            Ok(exit) => exit,
            Err(err) => {
                error!("{} carries a bad range: {}", exit_to_str(run.exit_reason()), err);
                return Err(self.fail());
            }
        };

        if exit.kind() != expect {
            error!(
                "Unexpected REC exit, {} ({:?}), expected {:?}. ESR: {:#x}",
                exit_to_str(run.exit_reason()),
                exit.kind(),
                expect,
                run.esr()
            );
            debug!("{:?}", run);
            return Err(self.fail());
        }
        self.verify(true)?;
        Ok(exit)
    }

    fn on_ripas_change(&mut self, step: &Step, range: IpaRange) -> Result<(), Checkpoint> {
        if let Some(expect) = step.ripas_range {
            let ok = range.base() == expect.base && range.top() == expect.top;
            if !ok {
                error!("Ripas return params mismatch: {}", range);
            }
            self.verify(ok)?;
        }

        let rd = self.rd;
        if rd.needs_aux_unmap() {
            let ret = rtt::unmap_aux(&mut *self.monitor, &rd, range);
            self.check("RTT_AUX_UNMAP_PROTECTED failed", ret)?;
        }

        let ret = rtt::set_ripas(&mut *self.monitor, &rd, self.rec.handle, range, step.ripas_policy);
        self.check("RMI_RTT_SET_RIPAS failed", ret)
    }

    fn on_s2ap_change(&mut self, range: IpaRange) -> Result<(), Checkpoint> {
        let rd = self.rd;
        let ret = rtt::set_s2ap(&mut *self.monitor, &rd, self.rec.handle, range);
        let report = self.check("RMI_RTT_SET_S2AP failed", ret)?;
        debug!("{} converged: {:?}", Command::RttSetS2ap, report);
        Ok(())
    }

    fn on_timer_check(&mut self, timer: TimerExpect) -> Result<(), Checkpoint> {
        let run = &self.rec.run;
        let ctl: InMemoryRegister<u64, CNT_CTL::Register> = InMemoryRegister::new(run.cntp_ctl());
        if let Some(enabled) = timer.enabled {
            if ctl.is_set(CNT_CTL::ENABLE) != enabled {
                error!("cntp_ctl {:#x}, expected enabled {}", ctl.get(), enabled);
                return self.verify(false);
            }
        }

        let gpr = timer.cval_gpr;
        let cval = run.cntp_cval();
        let ok = match run.exit_gpr(gpr) {
            Ok(expected) if expected == cval => true,
            Ok(expected) => {
                error!("Unexpected Timer value {:#x}. Expected {:#x}", cval, expected);
                false
            }
            Err(err) => {
                error!("timer expectation names x{}: {}", gpr, err);
                false
            }
        };
        self.verify(ok)
    }

    fn perform(&mut self, action: &HostAction) -> Result<(), Checkpoint> {
        let rd = self.rd;
        match *action {
            HostAction::SetGprs { ref gprs } => {
                let ret = gprs
                    .iter()
                    .try_for_each(|&(idx, val)| self.rec.run.set_entry_gpr(idx, val));
                self.check("failed to write entry gprs", ret)
            }
            HostAction::MapUnprotected {
                offset,
                size,
                reply,
            } => {
                let ret = self.monitor.map_unprotected(&rd, offset, size);
                let ipa = self.check("failed to map unprotected region", ret)?;
                if reply {
                    let run = &mut self.rec.run;
                    let ret = run.set_entry_gpr(1, ipa as u64).and_then(|_| run.set_entry_gpr(2, size as u64));
                    self.check("failed to write entry gprs", ret)?;
                }
                Ok(())
            }
            HostAction::MapProtectedUnknown { ipa, size } => {
                let ret = self.monitor.map_protected_unknown(&rd, ipa, size);
                self.check("DATA_CREATE_UNKNOWN failed", ret)
            }
            HostAction::InjectVirtualInterrupt {
                lr,
                intid,
                group1,
                priority,
            } => {
                let val: InMemoryRegister<u64, ICH_LR_EL2::Register> = InMemoryRegister::new(0);
                val.write(
                    ICH_LR_EL2::STATE::Pending
                        + ICH_LR_EL2::HW::CLEAR
                        + ICH_LR_EL2::GROUP.val(group1 as u64)
                        + ICH_LR_EL2::PRIORITY.val(priority)
                        + ICH_LR_EL2::VINTID.val(intid),
                );
                debug!("inject vINTID {} through LR{}", intid, lr);
                let ret = self.rec.run.set_entry_gic_lr(lr, val.get());
                self.check("failed to inject virtual interrupt", ret)
            }
        }
    }

    fn verify(&mut self, ok: bool) -> Result<(), Checkpoint> {
        self.ledger.check(ok).map(|_| ())
    }

    fn fail(&mut self) -> Checkpoint {
        match self.ledger.check(false) {
            Ok(point) | Err(point) => point,
        }
    }

    fn check<T, E: Into<Error>>(&mut self, what: &str, ret: Result<T, E>) -> Result<T, Checkpoint> {
        match ret {
            Ok(val) => {
                self.verify(true)?;
                Ok(val)
            }
            Err(err) => {
                let err: Error = err.into();
                error!("{}: {}", what, err);
                Err(self.fail())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checkpoint::Verdict;
    use crate::mock::{Mock, ScriptedExit};
    use crate::rmi::rec::{AbortKind, Access};
    use crate::scenario::{AbortExpect, RangeExpect};
    use crate::test_utils::*;

    use armv9a::FSC_TRANSLATION_FAULT_L3;

    fn drive(mock: &mut Mock, rd: Rd, steps: &[Step]) -> (Outcome, State, Ledger) {
        let mut rec = rec();
        let mut ledger = Ledger::new();
        let mut driver = Driver::new(mock, rd, &mut rec, &mut ledger);
        let outcome = driver.run(steps);
        let state = driver.state();
        (outcome, state, ledger)
    }

    #[test]
    fn host_call_reply_reaches_the_realm() {
        let (mut mock, rd) = mock_with_rd(1, true);
        mock.push_exit(ScriptedExit::host_call());
        mock.push_exit(ScriptedExit::host_call());

        let steps = [
            Step::new(ExitKind::HostCall).action(HostAction::SetGprs {
                gprs: vec![(1, 0x1000), (2, 0x1000)],
            }),
            Step::new(ExitKind::HostCall).terminal(),
        ];
        let (outcome, state, ledger) = drive(&mut mock, rd, &steps);

        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(state, State::Terminal);
        assert_eq!(ledger.verdict(), Verdict::Pass);
        assert_eq!(mock.entries()[1].gprs[1], 0x1000);
        assert_eq!(mock.entries()[1].gprs[2], 0x1000);
    }

    #[test]
    fn unexpected_exit_aborts() {
        let (mut mock, rd) = mock_with_rd(0, false);
        mock.push_exit(ScriptedExit::data_abort(0x1000, FSC_TRANSLATION_FAULT_L3, false, true));
        mock.push_exit(ScriptedExit::host_call());

        let steps = [Step::new(ExitKind::HostCall), Step::new(ExitKind::HostCall).terminal()];
        let (outcome, state, ledger) = drive(&mut mock, rd, &steps);

        // checkpoint 1 is the resume, 2 the exit check
        assert_eq!(outcome, Outcome::Fail(Checkpoint::new(2)));
        assert_eq!(state, State::Aborted);
        assert_eq!(ledger.verdict(), Verdict::Fail(Checkpoint::new(2)));
        assert_eq!(mock.count(Command::RecEnter), 1);
    }

    #[test]
    fn failed_resume_is_fatal() {
        let (mut mock, rd) = mock_with_rd(0, false);

        let (outcome, _, _) = drive(&mut mock, rd, &[Step::new(ExitKind::HostCall)]);
        assert_eq!(outcome, Outcome::Fail(Checkpoint::new(1)));
    }

    #[test]
    fn ripas_change_unmaps_aux_first() {
        let (mut mock, rd) = mock_with_rd(1, true);
        mock.map_aux(0x1000, 1);
        mock.push_exit(ScriptedExit::ripas_change(0x1000, 0x2000, 0));

        let mut step = Step::new(ExitKind::RipasChange);
        step.ripas_range = Some(RangeExpect {
            base: 0x1000,
            top: 0x2000,
        });
        let (outcome, _, _) = drive(&mut mock, rd, &[step]);

        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(
            mock.calls(),
            &[Command::RecEnter, Command::RttAuxUnmapProtected, Command::RttSetRipas]
        );
    }

    #[test]
    fn ripas_range_mismatch() {
        let (mut mock, rd) = mock_with_rd(0, false);
        mock.push_exit(ScriptedExit::ripas_change(0x1000, 0x3000, 0));

        let mut step = Step::new(ExitKind::RipasChange);
        step.ripas_range = Some(RangeExpect {
            base: 0x1000,
            top: 0x2000,
        });
        let (outcome, _, _) = drive(&mut mock, rd, &[step]);

        assert_eq!(outcome, Outcome::Fail(Checkpoint::new(3)));
        assert_eq!(mock.count(Command::RttSetRipas), 0);
    }

    #[test]
    fn ripas_without_unmap_is_refused() {
        let (mut mock, rd) = mock_with_rd(1, true);
        mock.map_aux(0x1000, 1);
        mock.push_exit(ScriptedExit::ripas_change(0x1000, 0x2000, 0));

        // a shared tree skips the unmap, the monitor then refuses the change
        let rd = Rd {
            rtt_tree_pp: false,
            ..rd
        };
        let (outcome, _, _) = drive(&mut mock, rd, &[Step::new(ExitKind::RipasChange)]);
        assert!(matches!(outcome, Outcome::Fail(_)));
    }

    #[test]
    fn abort_fixup_and_interrupt() {
        let (mut mock, rd) = mock_with_rd(1, true);
        mock.push_exit(ScriptedExit::data_abort(0x1000, FSC_TRANSLATION_FAULT_L3, false, true));
        mock.push_exit(ScriptedExit::host_call());

        let mut abort = Step::new(ExitKind::DataAbort)
            .action(HostAction::MapProtectedUnknown {
                ipa: 0x1000,
                size: 0x1000,
            })
            .action(HostAction::InjectVirtualInterrupt {
                lr: 0,
                intid: 27,
                group1: true,
                priority: 0,
            });
        abort.abort = Some(AbortExpect {
            ipa: 0x1000,
            dfsc: FSC_TRANSLATION_FAULT_L3,
            kind: AbortKind::NonEmulatable,
            access: Access::Write,
        });
        let steps = [abort, Step::new(ExitKind::HostCall).terminal()];
        let (outcome, state, _) = drive(&mut mock, rd, &steps);

        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(state, State::Terminal);
        assert!(mock.is_protected(0x1000));

        let lr: InMemoryRegister<u64, ICH_LR_EL2::Register> =
            InMemoryRegister::new(mock.entries()[1].gicv3_lrs[0]);
        assert!(lr.matches_all(ICH_LR_EL2::STATE::Pending + ICH_LR_EL2::GROUP::SET));
        assert_eq!(lr.read(ICH_LR_EL2::HW), 0);
        assert_eq!(lr.read(ICH_LR_EL2::VINTID), 27);
    }

    #[test]
    fn abort_expectation_mismatch() {
        let (mut mock, rd) = mock_with_rd(0, false);
        mock.push_exit(ScriptedExit::data_abort(0x2000, FSC_TRANSLATION_FAULT_L3, false, true));

        let mut step = Step::new(ExitKind::DataAbort);
        step.abort = Some(AbortExpect {
            ipa: 0x1000,
            dfsc: FSC_TRANSLATION_FAULT_L3,
            kind: AbortKind::NonEmulatable,
            access: Access::Write,
        });
        let (outcome, _, _) = drive(&mut mock, rd, &[step]);
        assert_eq!(outcome, Outcome::Fail(Checkpoint::new(3)));
    }

    #[test]
    fn timer_state_matches_gpr() {
        let (mut mock, rd) = mock_with_rd(1, true);
        mock.push_exit(ScriptedExit::timer(0x1234, 1));
        mock.push_exit(ScriptedExit::timer(0x4321, 2).with_gpr(2, 0x1111));

        let mut step = Step::new(ExitKind::HostCall);
        step.timer = Some(TimerExpect {
            cval_gpr: 1,
            enabled: Some(true),
        });
        let mut wrong = step.clone();
        wrong.timer = Some(TimerExpect {
            cval_gpr: 2,
            enabled: None,
        });
        let (outcome, _, ledger) = drive(&mut mock, rd, &[step, wrong]);

        assert_eq!(outcome, Outcome::Fail(Checkpoint::new(6)));
        assert_eq!(ledger.last(), Some(Checkpoint::new(6)));
    }

    #[test]
    fn resume_after_terminal_fails() {
        let (mut mock, rd) = mock_with_rd(0, false);
        mock.push_exit(ScriptedExit::host_call());
        mock.push_exit(ScriptedExit::host_call());

        let mut rec = rec();
        let mut ledger = Ledger::new();
        let mut driver = Driver::new(&mut mock, rd, &mut rec, &mut ledger);
        assert_eq!(driver.run_step(&Step::new(ExitKind::HostCall).terminal()), Outcome::Continue);
        assert!(matches!(driver.run_step(&Step::new(ExitKind::HostCall)), Outcome::Fail(_)));
        assert_eq!(driver.resumes(), 1);
    }

    #[test]
    fn disabled_timer_is_reported() {
        let (mut mock, rd) = mock_with_rd(0, false);
        mock.push_exit(ScriptedExit::host_call().with_gpr(1, 0));

        let mut step = Step::new(ExitKind::HostCall);
        step.timer = Some(TimerExpect {
            cval_gpr: 1,
            enabled: Some(true),
        });
        let (outcome, _, _) = drive(&mut mock, rd, &[step]);
        assert_eq!(outcome, Outcome::Fail(Checkpoint::new(3)));
    }
}
