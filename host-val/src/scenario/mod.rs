//! Declarative scenarios and their runner.
//!
//! A scenario names the realm it needs and the ordered exits the REC is
//! expected to take. [`run`] checks capabilities, sets the realm up, drives
//! the steps and always tears the realm down again.

pub mod step;

pub use step::{AbortExpect, HostAction, RangeExpect, Step, TimerExpect};

use crate::checkpoint::{Checkpoint, Ledger, Verdict};
use crate::driver::{Driver, Outcome, State};
use crate::error::Error;
use crate::mock::{Mock, Script};
use crate::realm::{Provision, Realm, RealmParams};
use crate::rmi::features::Features;
use crate::rmi::rec::ExitKind;
use crate::rmi::Monitor;

use core::fmt;
use serde::Deserialize;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub realm: RealmParams,
    /// Index of the REC to drive.
    #[serde(default)]
    pub rec: usize,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidFixture(format!("{}: {}", self.name, msg)));

        if self.steps.is_empty() {
            return invalid("no steps".into());
        }
        if self.realm.validate().is_err() {
            return invalid(format!(
                "realm parameters out of range ({} aux planes, s2sz {}, {} REC(s))",
                self.realm.num_aux_planes, self.realm.s2sz, self.realm.num_recs
            ));
        }
        if self.rec >= self.realm.num_recs {
            return invalid(format!("REC {} out of {}", self.rec, self.realm.num_recs));
        }
        let last = self.steps.len() - 1;
        for (i, step) in self.steps.iter().enumerate() {
            if step.repeat == 0 {
                return invalid(format!("step {} repeats zero times", i));
            }
            if step.terminal && i != last {
                return invalid(format!("step {} is terminal but not last", i));
            }
            if step.abort.is_some() && step.expect != ExitKind::DataAbort {
                return invalid(format!("step {} checks an abort on {:?}", i, step.expect));
            }
            if step.ripas_range.is_some() && step.expect != ExitKind::RipasChange {
                return invalid(format!("step {} checks a RIPAS range on {:?}", i, step.expect));
            }
            if step.timer.is_some() && step.expect != ExitKind::HostCall {
                return invalid(format!("step {} checks the timer on {:?}", i, step.expect));
            }
        }
        Ok(())
    }
}

/// A scenario together with the scripted monitor it runs against on a
/// development host.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub scenario: Scenario,
    #[serde(default)]
    pub monitor: Script,
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let fixture: Fixture = serde_json::from_str(json)?;
        fixture.scenario.validate()?;
        Ok(fixture)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn run(&self) -> (Report, Mock) {
        let mut mock = Mock::new(self.monitor.clone());
        let report = run(&mut mock, &self.scenario);
        (report, mock)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub name: String,
    pub verdict: Verdict,
    pub last: Option<Checkpoint>,
    pub resumes: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.verdict)?;
        if let Some(last) = self.last {
            write!(f, " (last checkpoint {}, {} resume(s))", last, self.resumes)?;
        }
        Ok(())
    }
}

pub fn run<M: Monitor + Provision>(monitor: &mut M, scenario: &Scenario) -> Report {
    info!("{}: {}", scenario.name, scenario.description);

    let mut ledger = Ledger::new();
    let mut resumes = 0;

    match capabilities(monitor, &mut ledger, &scenario.realm) {
        Ok(params) => {
            let ret = monitor.with_realm(&params, |monitor, realm| {
                // realm setup
                ledger.mark(true);
                drive(monitor, realm, scenario, &mut ledger)
            });
            match ret {
                Ok(n) => resumes = n,
                Err(err) => {
                    error!("Realm setup failed: {}", err);
                    ledger.mark(false);
                }
            }
        }
        Err(Outcome::Skip) => ledger.skip(),
        Err(_) => {}
    }

    let report = Report {
        name: scenario.name.clone(),
        verdict: ledger.verdict(),
        last: ledger.last(),
        resumes,
    };
    info!("{}", report);
    report
}

/// Settles the realm parameters against the monitor's features. Planes the
/// monitor cannot provide skip the scenario before anything is created.
fn capabilities<M: Monitor>(
    monitor: &mut M,
    ledger: &mut Ledger,
    realm: &RealmParams,
) -> Result<RealmParams, Outcome> {
    let features = match Features::query(monitor) {
        Ok(features) => features,
        Err(err) => {
            error!("RMI_FEATURES failed: {}", err);
            let point = ledger.point();
            ledger.record(point, false);
            return Err(Outcome::Fail(point));
        }
    };

    if realm.needs_planes() && !features.supports_planes() {
        info!("Planes feature not supported");
        return Err(Outcome::Skip);
    }
    if !realm.supported_by(&features) {
        info!(
            "Realm not supported: {} aux plane(s) of {}, s2sz {} of {}, {:?} tree",
            realm.num_aux_planes,
            features.max_aux_planes(),
            realm.s2sz,
            features.s2sz(),
            realm.rtt_tree
        );
        return Err(Outcome::Skip);
    }

    let params = realm.resolve(&features);
    debug!("RTT tree per plane : {}", params.rtt_tree_pp());
    Ok(params)
}

fn drive<M: Monitor + Provision>(
    monitor: &mut M,
    realm: &mut Realm,
    scenario: &Scenario,
    ledger: &mut Ledger,
) -> usize {
    let rd = realm.rd;
    let rec = match realm.recs.get_mut(scenario.rec) {
        Some(rec) => rec,
        None => {
            error!("realm has no REC {}", scenario.rec);
            ledger.mark(false);
            return 0;
        }
    };

    let mut driver = Driver::new(monitor, rd, rec, ledger);
    let outcome = driver.run(&scenario.steps);
    let (state, resumes) = (driver.state(), driver.resumes());

    if outcome == Outcome::Continue && state != State::Terminal {
        error!("{} ended without a terminal exit", scenario.name);
        ledger.mark(false);
    }
    resumes
}
