use crate::rmi::rec::{AbortKind, Access, ExitKind};
use crate::rmi::rtt::RipasPolicy;

use serde::Deserialize;

fn one() -> usize {
    1
}

fn yes() -> bool {
    true
}

/// One resume of the REC and what the host does about the resulting exit.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub expect: ExitKind,
    /// Number of identical resumes described by this step.
    #[serde(default = "one")]
    pub repeat: usize,
    /// Value written to `entry.flags` before resuming.
    #[serde(default)]
    pub flags: Option<u64>,
    #[serde(default)]
    pub ripas_range: Option<RangeExpect>,
    #[serde(default)]
    pub ripas_policy: RipasPolicy,
    #[serde(default)]
    pub abort: Option<AbortExpect>,
    #[serde(default)]
    pub timer: Option<TimerExpect>,
    #[serde(default)]
    pub actions: Vec<HostAction>,
    /// The exit ends the scenario.
    #[serde(default)]
    pub terminal: bool,
}

impl Step {
    pub fn new(expect: ExitKind) -> Self {
        Self {
            expect,
            repeat: 1,
            flags: None,
            ripas_range: None,
            ripas_policy: RipasPolicy::default(),
            abort: None,
            timer: None,
            actions: Vec::new(),
            terminal: false,
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn action(mut self, action: HostAction) -> Self {
        self.actions.push(action);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct RangeExpect {
    pub base: usize,
    pub top: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct AbortExpect {
    pub ipa: usize,
    pub dfsc: u64,
    pub kind: AbortKind,
    pub access: Access,
}

/// The exit's `cntp_cval` must equal the exit GPR at `cval_gpr`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct TimerExpect {
    pub cval_gpr: usize,
    /// Expected `cntp_ctl.ENABLE`, unchecked when absent.
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostAction {
    /// Reply to the realm through `entry.gprs`.
    SetGprs { gprs: Vec<(usize, u64)> },
    /// Map `size` bytes of NS memory at `offset` into the unprotected
    /// space. With `reply`, the IPA and size go back in x1 and x2.
    MapUnprotected {
        offset: usize,
        size: usize,
        #[serde(default)]
        reply: bool,
    },
    MapProtectedUnknown { ipa: usize, size: usize },
    /// Pending virtual interrupt in list register `lr`.
    InjectVirtualInterrupt {
        lr: usize,
        intid: u64,
        #[serde(default = "yes")]
        group1: bool,
        #[serde(default)]
        priority: u64,
    },
}
