use crate::binomial::Binomial;
use crate::model::OutbreakState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named selector of one outbreak indicator.
///
/// Names are part of the configuration format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    /// Positive symptomatic tests over symptomatic tests.
    TestPositivity,
    /// Positive screening tests over screening tests.
    ScreeningTestPositivity,
    /// Positive tests over the observed population.
    TestCount,
    /// Hospitalised persons over the hospital catchment.
    HospitalBurden,
}

impl Trigger {
    pub const ALL: [Trigger; 4] = [
        Trigger::TestPositivity,
        Trigger::ScreeningTestPositivity,
        Trigger::TestCount,
        Trigger::HospitalBurden,
    ];

    pub fn select(self, state: &OutbreakState) -> Binomial {
        match self {
            Trigger::TestPositivity => state.test_positivity(),
            Trigger::ScreeningTestPositivity => state.screening_test_positivity(),
            Trigger::TestCount => state.test_count(),
            Trigger::HospitalBurden => state.hospital_burden(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Trigger::TestPositivity => "TEST_POSITIVITY",
            Trigger::ScreeningTestPositivity => "SCREENING_TEST_POSITIVITY",
            Trigger::TestCount => "TEST_COUNT",
            Trigger::HospitalBurden => "HOSPITAL_BURDEN",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutbreakState, SurveyCounts};
    use crate::policy::Policy;

    fn state_with(counts: SurveyCounts) -> OutbreakState {
        let mut next = OutbreakState::initial(Policy::NoControl, counts.catchment, 0).builder();
        next.observe(counts, &[], 1).unwrap();
        next.build(Policy::NoControl)
    }

    #[test]
    fn selects_documented_fields() {
        let state = state_with(SurveyCounts {
            catchment: 100,
            tests: 20,
            test_positives: 4,
            screened: 10,
            screen_positives: 1,
            // one person was positive on both
            positive_persons: 4,
            hospitalised: 7,
            new_infections: 3,
            infectious: 9,
        });
        assert_eq!(
            Trigger::TestPositivity.select(&state),
            Binomial::new(4, 20).unwrap()
        );
        assert_eq!(
            Trigger::ScreeningTestPositivity.select(&state),
            Binomial::new(1, 10).unwrap()
        );
        assert_eq!(
            Trigger::TestCount.select(&state),
            Binomial::new(4, 100).unwrap()
        );
        assert_eq!(
            Trigger::HospitalBurden.select(&state),
            Binomial::new(7, 100).unwrap()
        );
    }

    #[test]
    fn hospital_burden_ignores_other_fields() {
        let base = SurveyCounts {
            catchment: 50,
            hospitalised: 5,
            ..SurveyCounts::default()
        };
        let noisy = SurveyCounts {
            tests: 40,
            test_positives: 30,
            screened: 12,
            screen_positives: 12,
            new_infections: 20,
            infectious: 25,
            ..base
        };
        assert_eq!(
            Trigger::HospitalBurden.select(&state_with(base)),
            Trigger::HospitalBurden.select(&state_with(noisy))
        );
    }

    #[test]
    fn names_round_trip_through_config_format() {
        for trigger in Trigger::ALL {
            let value: Trigger = toml::Value::String(trigger.name().to_string())
                .try_into()
                .unwrap();
            assert_eq!(value, trigger);
        }
    }
}
