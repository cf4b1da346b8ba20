use core::fmt;

/// Ordinal of a decision point within a scenario, starting from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(u32);

impl Checkpoint {
    pub const fn new(ordinal: u32) -> Self {
        Checkpoint(ordinal)
    }

    pub fn ordinal(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(Checkpoint),
    Skip,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail(point) => write!(f, "FAIL at checkpoint {}", point),
            Verdict::Skip => f.write_str("SKIP"),
        }
    }
}

/// Records the outcome of every decision point of one scenario.
///
/// The first failure wins: once a failure or a skip is recorded the ledger
/// is frozen and later records are ignored.
#[derive(Debug, Default)]
pub struct Ledger {
    next: u32,
    last: Option<Checkpoint>,
    verdict: Option<Verdict>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next checkpoint.
    pub fn point(&mut self) -> Checkpoint {
        self.next += 1;
        Checkpoint(self.next)
    }

    pub fn record(&mut self, point: Checkpoint, success: bool) {
        if self.verdict.is_some() {
            return;
        }
        self.last = Some(point);
        if !success {
            error!("checkpoint {} failed", point);
            self.verdict = Some(Verdict::Fail(point));
        }
    }

    /// Allocates a checkpoint and records it in one go.
    pub fn check(&mut self, success: bool) -> Result<Checkpoint, Checkpoint> {
        let point = self.point();
        self.record(point, success);
        match success {
            true => Ok(point),
            false => Err(point),
        }
    }

    /// Like [`Ledger::check`] for callers that only need the outcome recorded.
    pub fn mark(&mut self, success: bool) {
        let point = self.point();
        self.record(point, success);
    }

    pub fn skip(&mut self) {
        if self.verdict.is_none() {
            self.verdict = Some(Verdict::Skip);
        }
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict.unwrap_or(Verdict::Pass)
    }

    /// Last checkpoint recorded before the ledger froze.
    pub fn last(&self) -> Option<Checkpoint> {
        self.last
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_ledger_passes() {
        let ledger = Ledger::new();
        assert_eq!(ledger.verdict(), Verdict::Pass);
        assert_eq!(ledger.last(), None);
    }

    #[test]
    fn first_failure_wins() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.check(true), Ok(Checkpoint::new(1)));
        assert_eq!(ledger.check(false), Err(Checkpoint::new(2)));

        let p3 = ledger.point();
        ledger.record(p3, false);
        ledger.record(Checkpoint::new(4), true);
        ledger.skip();

        assert_eq!(ledger.verdict(), Verdict::Fail(Checkpoint::new(2)));
        assert_eq!(ledger.last(), Some(Checkpoint::new(2)));
    }

    #[test]
    fn mark_allocates_like_check() {
        let mut ledger = Ledger::new();
        ledger.mark(true);
        assert_eq!(ledger.last(), Some(Checkpoint::new(1)));
        ledger.mark(false);
        assert_eq!(ledger.check(true), Ok(Checkpoint::new(3)));
        assert_eq!(ledger.verdict(), Verdict::Fail(Checkpoint::new(2)));
    }

    #[test]
    fn skip_is_final() {
        let mut ledger = Ledger::new();
        ledger.skip();
        let point = ledger.point();
        ledger.record(point, false);

        assert_eq!(ledger.verdict(), Verdict::Skip);
        assert_eq!(ledger.last(), None);
    }

    #[test]
    fn points_are_ordinal() {
        let mut ledger = Ledger::new();
        let points: Vec<_> = (0..3).map(|_| ledger.point().ordinal()).collect();
        assert_eq!(points, vec![1, 2, 3]);
        assert_eq!(ledger.verdict(), Verdict::Pass);
    }
}
