//! Pass timing
//!
//! Each fixture owns a [`PassTimer`]. Passes open a [`TimingToken`] with
//! [`PassTimer::start`]; dropping the token charges the elapsed time to the
//! pass and subtracts it from the enclosing pass, so the report shows both the
//! total and the self time of nested passes. The collected [`PassTimes`] are
//! plain data and can be summed across fixtures by the runner.

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::AddAssign;
use std::time::{Duration, Instant};

/// A timed pass of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Pass {
    ProcessFile,
    ParseText,
    Verifier,
    Legalize,
    Abi,
    Regalloc,
    RaLiveness,
    RaCssa,
    RaCoalescing,
    RaSpilling,
    RaColoring,
    VerifyLocations,
    Filecheck,
}

impl Pass {
    pub const ALL: [Pass; 13] = [
        Pass::ProcessFile,
        Pass::ParseText,
        Pass::Verifier,
        Pass::Legalize,
        Pass::Abi,
        Pass::Regalloc,
        Pass::RaLiveness,
        Pass::RaCssa,
        Pass::RaCoalescing,
        Pass::RaSpilling,
        Pass::RaColoring,
        Pass::VerifyLocations,
        Pass::Filecheck,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn description(self) -> &'static str {
        match self {
            Pass::ProcessFile => "Processing test file",
            Pass::ParseText => "Parsing textual IR",
            Pass::Verifier => "Verify IR",
            Pass::Legalize => "Legalize for ISA",
            Pass::Abi => "Assign ABI locations",
            Pass::Regalloc => "Register allocation",
            Pass::RaLiveness => "RA liveness analysis",
            Pass::RaCssa => "RA conventional SSA",
            Pass::RaCoalescing => "RA copy coalescing",
            Pass::RaSpilling => "RA spill code",
            Pass::RaColoring => "RA coloring",
            Pass::VerifyLocations => "Verify value locations",
            Pass::Filecheck => "Run filecheck directives",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Accumulated time for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassTime {
    /// Duration of the pass, including nested passes.
    pub total: Duration,
    /// Time spent in nested passes.
    pub child: Duration,
}

impl PassTime {
    pub fn self_time(&self) -> Duration {
        self.total.saturating_sub(self.child)
    }
}

/// Per-pass times for a fixture or a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassTimes {
    pass: [PassTime; Pass::ALL.len()],
}

impl PassTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pass: Pass) -> PassTime {
        self.pass[pass.index()]
    }

    pub fn total(&self) -> Duration {
        self.pass.iter().map(|p| p.self_time()).sum()
    }

    /// Passes that actually ran, in pipeline order.
    pub fn entries(&self) -> impl Iterator<Item = (Pass, PassTime)> + '_ {
        Pass::ALL
            .iter()
            .map(move |&p| (p, self.get(p)))
            .filter(|(_, t)| t.total != Duration::ZERO)
    }
}

impl AddAssign<&PassTimes> for PassTimes {
    fn add_assign(&mut self, other: &PassTimes) {
        for (mine, theirs) in self.pass.iter_mut().zip(other.pass.iter()) {
            mine.total += theirs.total;
            mine.child += theirs.child;
        }
    }
}

impl fmt::Display for PassTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "======== ========  ==================================")?;
        writeln!(f, "   Total     Self  Pass")?;
        writeln!(f, "-------- --------  ----------------------------------")?;
        for (pass, time) in self.entries() {
            writeln!(
                f,
                "{:8.3} {:8.3}  {}",
                time.total.as_secs_f64(),
                time.self_time().as_secs_f64(),
                pass
            )?;
        }
        writeln!(f, "======== ========  ==================================")
    }
}

/// Collects pass times for one fixture. Not shared between threads.
#[derive(Debug)]
pub struct PassTimer {
    times: RefCell<PassTimes>,
    current: Cell<Option<Pass>>,
}

impl PassTimer {
    pub fn new() -> Self {
        Self {
            times: RefCell::new(PassTimes::new()),
            current: Cell::new(None),
        }
    }

    /// Start timing `pass`. The pass ends when the returned token is dropped.
    pub fn start(&self, pass: Pass) -> TimingToken<'_> {
        let prev = self.current.replace(Some(pass));
        TimingToken {
            timer: self,
            pass,
            prev,
            start: Instant::now(),
        }
    }

    /// Snapshot of the times collected so far.
    pub fn times(&self) -> PassTimes {
        self.times.borrow().clone()
    }

    pub fn into_times(self) -> PassTimes {
        self.times.into_inner()
    }
}

impl Default for PassTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Open timing scope for one pass.
#[must_use]
pub struct TimingToken<'a> {
    timer: &'a PassTimer,
    pass: Pass,
    prev: Option<Pass>,
    start: Instant,
}

impl Drop for TimingToken<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let mut times = self.timer.times.borrow_mut();
        times.pass[self.pass.index()].total += elapsed;
        if let Some(parent) = self.prev {
            times.pass[parent.index()].child += elapsed;
        }
        self.timer.current.set(self.prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn nested_passes_charge_child_time() {
        let timer = PassTimer::new();
        {
            let _outer = timer.start(Pass::Regalloc);
            let _inner = timer.start(Pass::RaLiveness);
            thread::sleep(Duration::from_millis(2));
        }
        let times = timer.into_times();
        let outer = times.get(Pass::Regalloc);
        let inner = times.get(Pass::RaLiveness);
        assert!(inner.total >= Duration::from_millis(2));
        assert_eq!(outer.child, inner.total);
        assert!(outer.total >= inner.total);
    }

    #[test]
    fn times_add_up_across_fixtures() {
        let timer = PassTimer::new();
        drop(timer.start(Pass::Legalize));
        let one = timer.into_times();

        let mut sum = PassTimes::new();
        sum += &one;
        sum += &one;
        assert_eq!(sum.get(Pass::Legalize).total, one.get(Pass::Legalize).total * 2);
    }

    #[test]
    fn report_lists_only_passes_that_ran() {
        let timer = PassTimer::new();
        {
            let _t = timer.start(Pass::ParseText);
            thread::sleep(Duration::from_millis(1));
        }
        let report = timer.into_times().to_string();
        assert!(report.contains("Parsing textual IR"));
        assert!(!report.contains("RA coloring"));
    }
}
