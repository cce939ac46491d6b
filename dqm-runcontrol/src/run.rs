//! `Run`: an identified, time-bounded data-taking interval.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::error::{Error, Result};

/// A run becomes immutable the instant its end-of-run has been signaled;
/// [`RunControl`](crate::RunControl) is the only thing permitted to drive
/// that transition, via [`Run::finalize`].
#[derive(Debug, Clone)]
pub struct Run {
    number: i64,
    description: String,
    detector_name: String,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    parameters: HashMap<String, String>,
}

impl Run {
    pub fn new(number: i64, description: impl Into<String>, detector_name: impl Into<String>) -> Result<Self> {
        if number < 0 {
            return Err(Error::InvalidParameter(format!("run number must be >= 0, got {number}")));
        }
        Ok(Self {
            number,
            description: description.into(),
            detector_name: detector_name.into(),
            start_time: SystemTime::now(),
            end_time: None,
            parameters: HashMap::new(),
        })
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn detector_name(&self) -> &str {
        &self.detector_name
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    pub(crate) fn merge_parameters(&mut self, params: HashMap<String, String>) {
        self.parameters.extend(params);
    }

    pub(crate) fn finalize(&mut self, at: SystemTime) {
        self.end_time.get_or_insert(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_run_number_is_rejected() {
        assert!(Run::new(-1, "", "").is_err());
    }

    #[test]
    fn new_run_is_not_finalized() {
        let run = Run::new(1, "first run", "ECAL").unwrap();
        assert!(!run.is_finalized());
        assert!(run.end_time().is_none());
    }

    #[test]
    fn finalize_is_idempotent_on_end_time() {
        let mut run = Run::new(1, "", "").unwrap();
        let t1 = SystemTime::now();
        run.finalize(t1);
        let recorded = run.end_time().unwrap();
        run.finalize(SystemTime::now());
        assert_eq!(run.end_time().unwrap(), recorded);
    }

    #[test]
    fn merge_parameters_adds_and_overwrites() {
        let mut run = Run::new(1, "", "").unwrap();
        run.merge_parameters(HashMap::from([("a".to_string(), "1".to_string())]));
        run.merge_parameters(HashMap::from([("a".to_string(), "2".to_string()), ("b".to_string(), "3".to_string())]));
        assert_eq!(run.parameters().get("a").map(String::as_str), Some("2"));
        assert_eq!(run.parameters().get("b").map(String::as_str), Some("3"));
    }
}
