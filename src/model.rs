//! Versioned state snapshots, history records and their builders.
//!
//! Every entity keeps an append-only [`Timeline`]. The snapshot for the next
//! period is assembled in a builder seeded from the current one and only
//! sealed and published once the period is complete.

use crate::behaviour::Behaviour;
use crate::binomial::Binomial;
use crate::epidemic::Infection;
use crate::error::ControlError;
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::iter;

pub trait Snapshot {
    fn time(&self) -> usize;
}

/// Append-only sequence of states and history records of one entity.
///
/// Holds exactly one state and one history record per period; the history
/// record at time `t` describes what happened while state `t - 1` was current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline<S, H> {
    states: Vec<S>,
    history: Vec<H>,
}

impl<S: Snapshot, H: Snapshot> Timeline<S, H> {
    pub fn new(state: S, history: H) -> Self {
        Self {
            states: vec![state],
            history: vec![history],
        }
    }

    /// The current (latest published) state.
    pub fn current(&self) -> &S {
        &self.states[self.states.len() - 1]
    }

    pub fn last_history(&self) -> &H {
        &self.history[self.history.len() - 1]
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn history(&self) -> &[H] {
        &self.history
    }

    pub fn publish(&mut self, state: S, history: H) {
        debug_assert_eq!(state.time(), self.current().time() + 1);
        debug_assert_eq!(history.time(), state.time());
        self.states.push(state);
        self.history.push(history);
    }
}

/// Raw surveillance counts for one period.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyCounts {
    /// Number of persons the hospital and test counts refer to.
    pub catchment: u64,
    pub tests: u64,
    pub test_positives: u64,
    pub screened: u64,
    pub screen_positives: u64,
    /// Persons with at least one positive test or screen.
    pub positive_persons: u64,
    pub hospitalised: u64,
    pub new_infections: u64,
    pub infectious: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutbreakState {
    time: usize,
    policy: Policy,
    counts: SurveyCounts,
    cumulative_infections: u64,
    test_positivity: Binomial,
    screening_test_positivity: Binomial,
    test_count: Binomial,
    hospital_burden: Binomial,
}

impl OutbreakState {
    pub fn initial(policy: Policy, catchment: u64, cumulative_infections: u64) -> Self {
        Self {
            time: 0,
            policy,
            counts: SurveyCounts {
                catchment,
                ..SurveyCounts::default()
            },
            cumulative_infections,
            test_positivity: Binomial::empty(),
            screening_test_positivity: Binomial::empty(),
            test_count: Binomial::empty(),
            hospital_burden: Binomial::empty(),
        }
    }

    pub fn builder(&self) -> OutbreakStateBuilder {
        OutbreakStateBuilder {
            state: Self {
                time: self.time + 1,
                ..self.clone()
            },
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn counts(&self) -> &SurveyCounts {
        &self.counts
    }

    pub fn cumulative_infections(&self) -> u64 {
        self.cumulative_infections
    }

    pub fn test_positivity(&self) -> Binomial {
        self.test_positivity
    }

    pub fn screening_test_positivity(&self) -> Binomial {
        self.screening_test_positivity
    }

    pub fn test_count(&self) -> Binomial {
        self.test_count
    }

    pub fn hospital_burden(&self) -> Binomial {
        self.hospital_burden
    }
}

impl Snapshot for OutbreakState {
    fn time(&self) -> usize {
        self.time
    }
}

pub struct OutbreakStateBuilder {
    state: OutbreakState,
}

impl OutbreakStateBuilder {
    pub fn time(&self) -> usize {
        self.state.time
    }

    /// Record this period's counts and derive the indicators.
    ///
    /// Positivity and test counts are summed over the last `window` periods,
    /// taking the earlier ones from `past`. Hospital burden is a point
    /// prevalence.
    pub fn observe(
        &mut self,
        counts: SurveyCounts,
        past: &[OutbreakState],
        window: usize,
    ) -> Result<(), ControlError> {
        let recent: Vec<&SurveyCounts> = iter::once(&counts)
            .chain(
                past.iter()
                    .rev()
                    .take(window.saturating_sub(1))
                    .map(|state| &state.counts),
            )
            .collect();
        let total = |f: fn(&SurveyCounts) -> u64| recent.iter().map(|c| f(c)).sum::<u64>();

        let state = &mut self.state;
        state.test_positivity = Binomial::new(total(|c| c.test_positives), total(|c| c.tests))?;
        state.screening_test_positivity =
            Binomial::new(total(|c| c.screen_positives), total(|c| c.screened))?;

        state.test_count =
            Binomial::new(total(|c| c.positive_persons), total(|c| c.catchment))?;

        state.hospital_burden = Binomial::new(counts.hospitalised, counts.catchment)?;

        state.cumulative_infections += counts.new_infections;
        state.counts = counts;
        Ok(())
    }

    pub fn build(self, policy: Policy) -> OutbreakState {
        OutbreakState {
            policy,
            ..self.state
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutbreakHistory {
    time: usize,
    screened: Vec<usize>,
}

impl OutbreakHistory {
    pub fn empty(time: usize) -> Self {
        Self {
            time,
            screened: Vec::new(),
        }
    }

    /// Ids of the persons screened during the period.
    pub fn screened(&self) -> &[usize] {
        &self.screened
    }
}

impl Snapshot for OutbreakHistory {
    fn time(&self) -> usize {
        self.time
    }
}

pub struct OutbreakHistoryBuilder {
    history: OutbreakHistory,
}

impl OutbreakHistoryBuilder {
    pub fn new(time: usize) -> Self {
        Self {
            history: OutbreakHistory::empty(time),
        }
    }

    pub fn screen(&mut self, mut ids: Vec<usize>) {
        ids.sort_unstable();
        self.history.screened = ids;
    }

    pub fn screened_mask(&self, n_persons: usize) -> Vec<bool> {
        let mut mask = vec![false; n_persons];
        for &id in &self.history.screened {
            if let Some(flag) = mask.get_mut(id) {
                *flag = true;
            }
        }
        mask
    }

    pub fn build(self) -> OutbreakHistory {
        self.history
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonState {
    id: usize,
    time: usize,
    behaviour: Behaviour,
    infection: Infection,
    symptom_onset: Option<usize>,
    hospitalised: bool,
    /// Days of infectious contacts still inside the risk kernel's support.
    contacts: Vec<usize>,
    exposure: f64,
    isolating_since: Option<usize>,
}

impl PersonState {
    pub fn initial(id: usize, behaviour: Behaviour, infection: Infection) -> Self {
        Self {
            id,
            time: 0,
            behaviour,
            infection,
            symptom_onset: None,
            hospitalised: false,
            contacts: Vec::new(),
            exposure: 0.0,
            isolating_since: None,
        }
    }

    pub fn builder(&self) -> PersonStateBuilder {
        PersonStateBuilder {
            state: Self {
                time: self.time + 1,
                ..self.clone()
            },
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn behaviour(&self) -> Behaviour {
        self.behaviour
    }

    pub fn infection(&self) -> Infection {
        self.infection
    }

    pub fn symptom_onset(&self) -> Option<usize> {
        self.symptom_onset
    }

    pub fn is_symptomatic(&self) -> bool {
        self.symptom_onset.is_some_and(|day| day <= self.time)
    }

    pub fn is_hospitalised(&self) -> bool {
        self.hospitalised
    }

    pub fn contacts(&self) -> &[usize] {
        &self.contacts
    }

    pub fn exposure(&self) -> f64 {
        self.exposure
    }

    pub fn isolating_since(&self) -> Option<usize> {
        self.isolating_since
    }
}

impl Snapshot for PersonState {
    fn time(&self) -> usize {
        self.time
    }
}

pub struct PersonStateBuilder {
    state: PersonState,
}

impl PersonStateBuilder {
    pub fn time(&self) -> usize {
        self.state.time
    }

    pub fn infection(&self) -> Infection {
        self.state.infection
    }

    pub fn is_symptomatic(&self) -> bool {
        self.state.is_symptomatic()
    }

    pub fn contacts(&self) -> &[usize] {
        &self.state.contacts
    }

    pub fn set_infection(&mut self, infection: Infection) {
        self.state.infection = infection;
    }

    pub fn set_symptom_onset(&mut self, day: Option<usize>) {
        self.state.symptom_onset = day;
    }

    pub fn set_hospitalised(&mut self, hospitalised: bool) {
        self.state.hospitalised = hospitalised;
    }

    pub fn push_contact(&mut self, day: usize) {
        self.state.contacts.push(day);
    }

    pub fn retain_contacts<F: FnMut(usize) -> bool>(&mut self, mut keep: F) {
        self.state.contacts.retain(|&day| keep(day));
    }

    pub fn set_exposure(&mut self, exposure: f64) {
        self.state.exposure = exposure;
    }

    pub fn set_isolating_since(&mut self, day: Option<usize>) {
        self.state.isolating_since = day;
    }

    pub fn build(self, behaviour: Behaviour) -> PersonState {
        PersonState {
            behaviour,
            ..self.state
        }
    }
}

/// Actions a person took during one period.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonHistory {
    time: usize,
    screened: bool,
    screen_positive: bool,
    tested: bool,
    test_positive: bool,
}

impl PersonHistory {
    pub fn empty(time: usize) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    pub fn screened(&self) -> bool {
        self.screened
    }

    pub fn screen_positive(&self) -> bool {
        self.screen_positive
    }

    pub fn tested(&self) -> bool {
        self.tested
    }

    /// Whether any test or screen of the period came back positive.
    pub fn is_positive(&self) -> bool {
        (self.tested && self.test_positive) || (self.screened && self.screen_positive)
    }

    pub fn test_positive(&self) -> bool {
        self.test_positive
    }
}

impl Snapshot for PersonHistory {
    fn time(&self) -> usize {
        self.time
    }
}

pub struct PersonHistoryBuilder {
    history: PersonHistory,
}

impl PersonHistoryBuilder {
    pub fn new(time: usize) -> Self {
        Self {
            history: PersonHistory::empty(time),
        }
    }

    pub fn record_screen(&mut self, positive: bool) {
        self.history.screened = true;
        self.history.screen_positive = positive;
    }

    pub fn record_test(&mut self, positive: bool) {
        self.history.tested = true;
        self.history.test_positive = positive;
    }

    pub fn build(self) -> PersonHistory {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(tests: u64, test_positives: u64, hospitalised: u64) -> SurveyCounts {
        SurveyCounts {
            catchment: 10,
            tests,
            test_positives,
            positive_persons: test_positives,
            hospitalised,
            new_infections: 1,
            ..SurveyCounts::default()
        }
    }

    fn advance(timeline: &mut Timeline<OutbreakState, OutbreakHistory>, c: SurveyCounts) {
        let mut next = timeline.current().builder();
        next.observe(c, timeline.states(), 3).unwrap();
        let history = OutbreakHistoryBuilder::new(next.time()).build();
        timeline.publish(next.build(Policy::NoControl), history);
    }

    #[test]
    fn timeline_keeps_one_record_per_period() {
        let mut timeline = Timeline::new(
            OutbreakState::initial(Policy::NoControl, 10, 0),
            OutbreakHistory::empty(0),
        );
        for _ in 0..4 {
            advance(&mut timeline, counts(2, 1, 0));
        }
        assert_eq!(timeline.states().len(), 5);
        assert_eq!(timeline.history().len(), 5);
        for (t, (state, history)) in timeline.states().iter().zip(timeline.history()).enumerate() {
            assert_eq!(state.time(), t);
            assert_eq!(history.time(), t);
        }
        assert_eq!(timeline.current().cumulative_infections(), 4);
    }

    #[test]
    fn indicators_sum_over_trailing_window() {
        let mut timeline = Timeline::new(
            OutbreakState::initial(Policy::NoControl, 10, 0),
            OutbreakHistory::empty(0),
        );
        advance(&mut timeline, counts(4, 4, 0));
        advance(&mut timeline, counts(2, 0, 1));
        advance(&mut timeline, counts(2, 1, 3));
        advance(&mut timeline, counts(2, 1, 2));

        let state = timeline.current();
        // window of three periods drops the first one
        assert_eq!(state.test_positivity(), Binomial::new(2, 6).unwrap());
        assert_eq!(state.test_count(), Binomial::new(2, 30).unwrap());
        assert_eq!(state.hospital_burden(), Binomial::new(2, 10).unwrap());
    }

    #[test]
    fn rejects_burden_above_catchment() {
        let state = OutbreakState::initial(Policy::NoControl, 10, 0);
        let mut next = state.builder();
        assert!(next.observe(counts(0, 0, 11), &[], 1).is_err());
    }

    #[test]
    fn person_positive_on_screen_and_test_counts_once() {
        let mut history = PersonHistoryBuilder::new(1);
        history.record_screen(true);
        history.record_test(true);
        assert!(history.build().is_positive());

        let mut history = PersonHistoryBuilder::new(1);
        history.record_screen(false);
        assert!(!history.build().is_positive());
        assert!(!PersonHistory::empty(1).is_positive());
    }

    #[test]
    fn test_count_rejects_more_positives_than_catchment() {
        let state = OutbreakState::initial(Policy::NoControl, 10, 0);
        let mut next = state.builder();
        let c = SurveyCounts {
            positive_persons: 11,
            ..counts(0, 0, 0)
        };
        assert!(next.observe(c, &[], 1).is_err());
    }

    #[test]
    fn person_builder_seals_a_new_version() {
        let state = PersonState::initial(3, Behaviour::Normal, Infection::Susceptible);
        let mut next = state.builder();
        next.push_contact(0);
        next.set_exposure(0.25);
        let sealed = next.build(Behaviour::SelfIsolating);

        assert_eq!(state.time(), 0);
        assert!(state.contacts().is_empty());
        assert_eq!(sealed.time(), 1);
        assert_eq!(sealed.id(), 3);
        assert_eq!(sealed.contacts(), &[0]);
        assert_eq!(sealed.behaviour(), Behaviour::SelfIsolating);
    }
}
