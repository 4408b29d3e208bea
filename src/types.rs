//! Trajectory data types.

use crate::behaviour::Behaviour;
use crate::binomial::Binomial;
use crate::model::{Snapshot, SurveyCounts};
use crate::policy::Policy;
use crate::population::Outbreak;
use crate::trigger::Trigger;
use serde::{Deserialize, Serialize};

/// Record of the simulation at a single period.
///
/// Contains the policy in force, the behaviour mix of the population, the raw
/// surveillance counts and the outbreak indicators the policy acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Current simulation period.
    pub time: usize,

    /// Policy variant in force during this period.
    pub policy: Policy,

    /// Persons behaving normally (including just released).
    pub n_normal: usize,

    /// Persons isolating on their own initiative.
    pub n_self_isolating: usize,

    /// Persons isolating under lockdown.
    pub n_isolating: usize,

    /// Surveillance counts for the period.
    pub counts: SurveyCounts,

    /// Infections since the start of the run, including the initial ones.
    pub cumulative_infections: u64,

    pub test_positivity: Binomial,
    pub screening_test_positivity: Binomial,
    pub test_count: Binomial,
    pub hospital_burden: Binomial,
}

impl Record {
    pub fn new(outbreak: &Outbreak) -> Self {
        let state = outbreak.state();

        let (mut n_normal, mut n_self_isolating, mut n_isolating) = (0, 0, 0);
        for person in outbreak.persons() {
            match person.state().behaviour() {
                Behaviour::Normal | Behaviour::Released => n_normal += 1,
                Behaviour::SelfIsolating => n_self_isolating += 1,
                Behaviour::Isolating => n_isolating += 1,
            }
        }

        Self {
            time: state.time(),
            policy: state.policy(),
            n_normal,
            n_self_isolating,
            n_isolating,
            counts: *state.counts(),
            cumulative_infections: state.cumulative_infections(),
            test_positivity: state.test_positivity(),
            screening_test_positivity: state.screening_test_positivity(),
            test_count: state.test_count(),
            hospital_burden: state.hospital_burden(),
        }
    }

    /// Indicator selected by `trigger`, as the policy saw it.
    pub fn indicator(&self, trigger: Trigger) -> Binomial {
        match trigger {
            Trigger::TestPositivity => self.test_positivity,
            Trigger::ScreeningTestPositivity => self.screening_test_positivity,
            Trigger::TestCount => self.test_count,
            Trigger::HospitalBurden => self.hospital_burden,
        }
    }
}
