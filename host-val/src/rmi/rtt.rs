//! Memory-state transitions the host performs on behalf of a REC.
//!
//! A RIPAS change is a single `RMI_RTT_SET_RIPAS` over the reported range.
//! An S2AP change is walked page by page with the cursor returned by the
//! monitor, creating translation tables only when the monitor reports them
//! missing.

use crate::config::{is_page_aligned, PAGE_SIZE};
use crate::realm::{Plane, Rd};
use crate::rmi::error::Error as RmiError;
use crate::rmi::{Command, Monitor};

use core::fmt;

/// Half-open, page granular `[base, top)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpaRange {
    base: usize,
    top: usize,
}

impl IpaRange {
    pub fn new(base: usize, top: usize) -> Result<Self, Error> {
        if !is_page_aligned(base) || !is_page_aligned(top) {
            return Err(Error::MisalignedRange { base, top });
        }
        if base > top {
            return Err(Error::InvertedRange { base, top });
        }
        Ok(Self { base, top })
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn size(&self) -> usize {
        self.top - self.base
    }

    pub fn pages(&self) -> usize {
        self.size() / PAGE_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.base == self.top
    }

    pub fn contains(&self, ipa: usize) -> bool {
        self.base <= ipa && ipa < self.top
    }

    pub fn iter_pages(&self) -> impl Iterator<Item = usize> {
        (self.base..self.top).step_by(PAGE_SIZE)
    }
}

impl fmt::Display for IpaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.base, self.top)
    }
}

/// Kind of translation table repaired during an S2AP walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repair {
    /// `ERROR_RTT`: a table of the primary tree was missing.
    Primary,
    /// `ERROR_RTT_AUX`: a table of some auxiliary tree was missing.
    Aux,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    Rmi { cmd: Command, ipa: usize, err: RmiError },
    MisalignedRange { base: usize, top: usize },
    InvertedRange { base: usize, top: usize },
    IncompleteRipas { top: usize, out_top: usize },
    NoProgress { base: usize, next: usize },
    RepeatedRepair { base: usize, repair: Repair },
    IterationLimit { limit: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Rmi { cmd, ipa, err } => write!(f, "{} at {:#x} failed: {}", cmd, ipa, err),
            Error::MisalignedRange { base, top } => {
                write!(f, "range [{:#x}, {:#x}) is not page aligned", base, top)
            }
            Error::InvertedRange { base, top } => {
                write!(f, "range [{:#x}, {:#x}) is inverted", base, top)
            }
            Error::IncompleteRipas { top, out_top } => {
                write!(f, "RIPAS set up to {:#x}, expected {:#x}", out_top, top)
            }
            Error::NoProgress { base, next } => {
                write!(f, "cursor moved from {:#x} to {:#x}", base, next)
            }
            Error::RepeatedRepair { base, repair } => {
                write!(f, "{:?} tables at {:#x} still missing after creation", repair, base)
            }
            Error::IterationLimit { limit } => write!(f, "walk exceeded {} iterations", limit),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RipasPolicy {
    /// One call must cover the whole range.
    #[default]
    SingleShot,
    /// Resume from `out_top` until the range is covered.
    Converge,
}

pub fn set_ripas<M: Monitor + ?Sized>(
    monitor: &mut M,
    rd: &Rd,
    rec: usize,
    range: IpaRange,
    policy: RipasPolicy,
) -> Result<(), Error> {
    let top = range.top();
    let mut base = range.base();

    while base != top {
        let out_top = monitor
            .rtt_set_ripas(rd.addr, rec, base, top)
            .map_err(|err| Error::Rmi {
                cmd: Command::RttSetRipas,
                ipa: base,
                err,
            })?;
        trace!("{} [{:#x}, {:#x}) -> {:#x}", Command::RttSetRipas, base, top, out_top);

        if out_top == top {
            break;
        }
        match policy {
            RipasPolicy::SingleShot => return Err(Error::IncompleteRipas { top, out_top }),
            RipasPolicy::Converge => {
                if out_top <= base || out_top > top {
                    return Err(Error::NoProgress {
                        base,
                        next: out_top,
                    });
                }
                base = out_top;
            }
        }
    }
    Ok(())
}

/// Removes the protected mappings of `range` from every auxiliary tree.
pub fn unmap_aux<M: Monitor + ?Sized>(monitor: &mut M, rd: &Rd, range: IpaRange) -> Result<(), Error> {
    for plane in rd.aux_planes() {
        for ipa in range.iter_pages() {
            monitor.rtt_unmap(rd.addr, ipa, plane).map_err(|err| Error::Rmi {
                cmd: Command::RttAuxUnmapProtected,
                ipa,
                err,
            })?;
        }
        trace!("{} {} {}", Command::RttAuxUnmapProtected, plane, range);
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct S2apReport {
    pub advances: usize,
    pub primary_repairs: usize,
    pub aux_repairs: usize,
    pub iterations: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkStep {
    Advanced { next: usize },
    Repaired(Repair),
    Done,
}

/// Cursor over an S2AP change request.
///
/// Every `step` issues one `RMI_RTT_SET_S2AP`. The cursor only moves forward
/// and each repair kind is allowed once per cursor value.
#[derive(Debug)]
pub struct S2apWalk {
    range: IpaRange,
    base: usize,
    limit: usize,
    repaired_primary: bool,
    repaired_aux: bool,
    report: S2apReport,
}

impl S2apWalk {
    pub fn new(range: IpaRange, num_aux_planes: usize) -> Self {
        Self {
            range,
            base: range.base(),
            limit: range.pages() * (2 + num_aux_planes),
            repaired_primary: false,
            repaired_aux: false,
            report: S2apReport::default(),
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_done(&self) -> bool {
        self.base == self.range.top()
    }

    pub fn report(&self) -> S2apReport {
        self.report
    }

    pub fn step<M: Monitor + ?Sized>(
        &mut self,
        monitor: &mut M,
        rd: &Rd,
        rec: usize,
    ) -> Result<WalkStep, Error> {
        if self.is_done() {
            return Ok(WalkStep::Done);
        }
        if self.report.iterations >= self.limit {
            return Err(Error::IterationLimit { limit: self.limit });
        }
        self.report.iterations += 1;

        let (base, top) = (self.base, self.range.top());
        match monitor.rtt_set_s2ap(rd.addr, rec, base, top) {
            Ok(next) => {
                if next <= base || next > top || !is_page_aligned(next) {
                    return Err(Error::NoProgress { base, next });
                }
                trace!("{} [{:#x}, {:#x}) -> {:#x}", Command::RttSetS2ap, base, top, next);
                self.base = next;
                self.repaired_primary = false;
                self.repaired_aux = false;
                self.report.advances += 1;
                Ok(WalkStep::Advanced { next })
            }
            Err(RmiError::RmiErrorRtt(level)) => {
                debug!("{} at {:#x}: missing RTT at level {}", Command::RttSetS2ap, base, level);
                if self.repaired_primary {
                    return Err(Error::RepeatedRepair {
                        base,
                        repair: Repair::Primary,
                    });
                }
                self.repaired_primary = true;
                monitor
                    .rtt_create(rd.addr, base, Plane::PRIMARY)
                    .map_err(|err| Error::Rmi {
                        cmd: Command::RttCreate,
                        ipa: base,
                        err,
                    })?;
                self.report.primary_repairs += 1;
                Ok(WalkStep::Repaired(Repair::Primary))
            }
            Err(err @ RmiError::RmiErrorRttAux(_)) if rd.num_aux_planes == 0 => {
                error!(
                    "{} at {:#x}: aux RTT missing in a realm without aux planes",
                    Command::RttSetS2ap,
                    base
                );
                Err(Error::Rmi {
                    cmd: Command::RttSetS2ap,
                    ipa: base,
                    err,
                })
            }
            Err(RmiError::RmiErrorRttAux(level)) => {
                debug!("{} at {:#x}: missing aux RTT at level {}", Command::RttSetS2ap, base, level);
                if self.repaired_aux {
                    return Err(Error::RepeatedRepair {
                        base,
                        repair: Repair::Aux,
                    });
                }
                self.repaired_aux = true;
                for plane in rd.aux_planes() {
                    monitor.rtt_create(rd.addr, base, plane).map_err(|err| Error::Rmi {
                        cmd: Command::RttAuxCreate,
                        ipa: base,
                        err,
                    })?;
                }
                self.report.aux_repairs += 1;
                Ok(WalkStep::Repaired(Repair::Aux))
            }
            Err(err) => Err(Error::Rmi {
                cmd: Command::RttSetS2ap,
                ipa: base,
                err,
            }),
        }
    }

    pub fn run<M: Monitor + ?Sized>(
        mut self,
        monitor: &mut M,
        rd: &Rd,
        rec: usize,
    ) -> Result<S2apReport, Error> {
        while self.step(monitor, rd, rec)? != WalkStep::Done {}
        Ok(self.report)
    }
}

pub fn set_s2ap<M: Monitor + ?Sized>(
    monitor: &mut M,
    rd: &Rd,
    rec: usize,
    range: IpaRange,
) -> Result<S2apReport, Error> {
    S2apWalk::new(range, rd.num_aux_planes).run(monitor, rd, rec)
}
