//! The RunControl state machine: `IDLE` / `RUNNING`, password
//! gated, fanning `SOR`/`EOR` out through synchronous signals.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use dqm_core::{Signal, Status};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::run::Run;

enum State {
    Idle,
    Running(Run),
}

/// Coordinates start-of-run / end-of-run across a fleet of analysis
/// modules. One instance is the run's single source of truth; subscribers
/// attach to [`RunControl::start_of_run`] / [`RunControl::end_of_run`].
pub struct RunControl {
    state: RwLock<State>,
    password: RwLock<Option<String>>,
    pub start_of_run: Signal<Run>,
    pub end_of_run: Signal<Run>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::Idle),
            password: RwLock::new(None),
            start_of_run: Signal::new(),
            end_of_run: Signal::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.read().unwrap(), State::Running(_))
    }

    pub fn current_run(&self) -> Option<Run> {
        match &*self.state.read().unwrap() {
            State::Running(run) => Some(run.clone()),
            State::Idle => None,
        }
    }

    /// Rejected with [`Error::NotAllowed`] while a run is active.
    pub fn set_password(&self, password: Option<String>) -> Result<()> {
        if self.is_running() {
            return Err(Error::NotAllowed);
        }
        *self.password.write().unwrap() = password;
        Ok(())
    }

    fn password_ok(&self, supplied: Option<&str>) -> bool {
        match &*self.password.read().unwrap() {
            None => true,
            Some(expected) => supplied == Some(expected.as_str()),
        }
    }

    /// `IDLE -> RUNNING` emits one `SOR`; `RUNNING -> RUNNING` finalizes the
    /// current run, emits its `EOR`, then the new run's `SOR`. A password
    /// mismatch returns `NOT_ALLOWED` and performs no transition.
    #[instrument(skip(self, run, password))]
    pub fn start_new_run(&self, run: Run, password: Option<&str>) -> Status {
        if !self.password_ok(password) {
            return Status::NotAllowed;
        }
        let previous = {
            let mut state = self.state.write().unwrap();
            std::mem::replace(&mut *state, State::Running(run.clone()))
        };
        if let State::Running(mut finished) = previous {
            finished.finalize(SystemTime::now());
            self.end_of_run.emit(&finished);
        }
        self.start_of_run.emit(&run);
        Status::Success
    }

    /// `RUNNING -> IDLE` merges `params` into the current run and emits its
    /// `EOR`. Called while `IDLE`, returns `UNCHANGED` and emits nothing.
    #[instrument(skip(self, params, password))]
    pub fn end_current_run(&self, params: HashMap<String, String>, password: Option<&str>) -> Status {
        if !self.password_ok(password) {
            return Status::NotAllowed;
        }
        let previous = {
            let mut state = self.state.write().unwrap();
            std::mem::replace(&mut *state, State::Idle)
        };
        match previous {
            State::Idle => Status::Unchanged,
            State::Running(mut run) => {
                run.merge_parameters(params);
                run.finalize(SystemTime::now());
                self.end_of_run.emit(&run);
                Status::Success
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn end_current_run_while_idle_is_unchanged_and_silent() {
        let rc = RunControl::new();
        let sor_count = Arc::new(AtomicUsize::new(0));
        let eor_count = Arc::new(AtomicUsize::new(0));
        let s = sor_count.clone();
        let e = eor_count.clone();
        rc.start_of_run.connect(move |_| { s.fetch_add(1, Ordering::SeqCst); });
        rc.end_of_run.connect(move |_| { e.fetch_add(1, Ordering::SeqCst); });

        assert_eq!(rc.end_current_run(HashMap::new(), None), Status::Unchanged);
        assert_eq!(sor_count.load(Ordering::SeqCst), 0);
        assert_eq!(eor_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn start_new_run_from_idle_emits_one_sor() {
        let rc = RunControl::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let s = seen.clone();
        rc.start_of_run.connect(move |run: &Run| s.write().unwrap().push(run.number()));

        let run = Run::new(42, "", "").unwrap();
        assert_eq!(rc.start_new_run(run, None), Status::Success);
        assert!(rc.is_running());
        assert_eq!(rc.current_run().unwrap().number(), 42);
        assert_eq!(*seen.read().unwrap(), vec![42]);
    }

    #[test]
    fn second_start_new_run_emits_eor_then_sor() {
        let rc = RunControl::new();
        let events = Arc::new(RwLock::new(Vec::new()));
        let e1 = events.clone();
        let e2 = events.clone();
        rc.start_of_run.connect(move |run: &Run| e1.write().unwrap().push(("SOR", run.number())));
        rc.end_of_run.connect(move |run: &Run| e2.write().unwrap().push(("EOR", run.number())));

        rc.start_new_run(Run::new(42, "", "").unwrap(), None);
        rc.start_new_run(Run::new(43, "", "").unwrap(), None);
        assert_eq!(*events.read().unwrap(), vec![("SOR", 42), ("EOR", 42), ("SOR", 43)]);
    }

    #[test]
    fn end_current_run_merges_params_and_emits_eor() {
        let rc = RunControl::new();
        let captured = Arc::new(RwLock::new(None));
        let c = captured.clone();
        rc.end_of_run.connect(move |run: &Run| *c.write().unwrap() = Some(run.clone()));

        rc.start_new_run(Run::new(1, "", "").unwrap(), None);
        let status = rc.end_current_run(HashMap::from([("beam".to_string(), "stable".to_string())]), None);
        assert_eq!(status, Status::Success);
        assert!(!rc.is_running());
        let finished = captured.read().unwrap().clone().unwrap();
        assert_eq!(finished.parameters().get("beam").map(String::as_str), Some("stable"));
        assert!(finished.is_finalized());
    }

    #[test]
    fn password_mismatch_is_not_allowed_and_suppresses_effects() {
        let rc = RunControl::new();
        rc.set_password(Some("secret".to_string())).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        rc.start_of_run.connect(move |_| { f.fetch_add(1, Ordering::SeqCst); });

        let status = rc.start_new_run(Run::new(1, "", "").unwrap(), Some("wrong"));
        assert_eq!(status, Status::NotAllowed);
        assert!(!rc.is_running());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let status = rc.start_new_run(Run::new(1, "", "").unwrap(), Some("secret"));
        assert_eq!(status, Status::Success);
    }

    #[test]
    fn set_password_is_rejected_while_running() {
        let rc = RunControl::new();
        rc.start_new_run(Run::new(1, "", "").unwrap(), None);
        assert!(matches!(rc.set_password(Some("x".to_string())), Err(Error::NotAllowed)));
    }
}
