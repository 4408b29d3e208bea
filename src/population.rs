//! Outbreak and person entities and the per-period driver.

use crate::behaviour::{Behaviour, PersonContext};
use crate::config::{BehaviourConfig, PolicyConfig, TestingConfig};
use crate::epidemic::Epidemic;
use crate::error::ControlError;
use crate::kernel::Kernel;
use crate::machine::{Rng, StateMachine};
use crate::model::{
    OutbreakHistory, OutbreakHistoryBuilder, OutbreakState, PersonHistory, PersonHistoryBuilder,
    PersonState, Snapshot, Timeline,
};
use crate::policy::{OutbreakContext, Policy};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Resolved parameters shared by all entities during a period.
pub struct Settings<'a> {
    pub policy: &'a PolicyConfig,
    pub behaviour: &'a BehaviourConfig,
    pub testing: &'a TestingConfig,
    pub kernel: &'a Kernel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    id: usize,
    /// Active variant; differs from the sealed state's after a broadcast.
    behaviour: Behaviour,
    rng: Rng,
    timeline: Timeline<PersonState, PersonHistory>,
}

impl Person {
    pub fn new(state: PersonState, rng: Rng) -> Self {
        let history = PersonHistory::empty(state.time());
        Self {
            id: state.id(),
            behaviour: state.behaviour(),
            rng,
            timeline: Timeline::new(state, history),
        }
    }

    pub fn behaviour(&self) -> Behaviour {
        self.behaviour
    }

    pub fn state(&self) -> &PersonState {
        self.timeline.current()
    }

    pub fn timeline(&self) -> &Timeline<PersonState, PersonHistory> {
        &self.timeline
    }

    fn force(&mut self, behaviour: Behaviour) {
        self.behaviour = behaviour;
    }

    fn record_history(&mut self, ctx: &PersonContext<'_>) -> Result<PersonHistory, ControlError> {
        let current = self.timeline.current();
        let mut history = PersonHistoryBuilder::new(current.time() + 1);
        self.behaviour
            .update_history(&mut history, current, ctx, &mut self.rng)?;
        Ok(history.build())
    }

    fn next_state<E: Epidemic>(
        &mut self,
        ctx: &PersonContext<'_>,
        epidemic: &E,
        pressure: f64,
    ) -> Result<PersonState> {
        let current = self.timeline.current();
        let mut next = current.builder();
        epidemic
            .progress(
                current,
                self.behaviour,
                &mut next,
                pressure,
                ctx.behaviour,
                &mut self.rng,
            )
            .with_context(|| format!("failed to progress person {}", self.id))?;
        let transition = self
            .behaviour
            .next_state(&mut next, current, ctx, &mut self.rng)?;
        Ok(next.build(transition.next))
    }

    fn publish(&mut self, state: PersonState, history: PersonHistory) {
        self.behaviour = state.behaviour();
        self.timeline.publish(state, history);
    }
}

/// Top-level entity: the population, its policy and its surveillance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outbreak {
    policy: Policy,
    rng: Rng,
    timeline: Timeline<OutbreakState, OutbreakHistory>,
    persons: Vec<Person>,
}

impl Outbreak {
    pub fn new(state: OutbreakState, persons: Vec<Person>, rng: Rng) -> Self {
        let history = OutbreakHistory::empty(state.time());
        Self {
            policy: state.policy(),
            rng,
            timeline: Timeline::new(state, history),
            persons,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn state(&self) -> &OutbreakState {
        self.timeline.current()
    }

    pub fn time(&self) -> usize {
        self.state().time()
    }

    pub fn timeline(&self) -> &Timeline<OutbreakState, OutbreakHistory> {
        &self.timeline
    }

    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    /// Advance the outbreak and every person by one period.
    ///
    /// All history records are built before any transition is computed. A
    /// broadcast from the policy is applied to every person before any person
    /// transitions. New snapshots are published only once everything is built.
    pub fn advance<E: Epidemic>(&mut self, settings: &Settings<'_>, epidemic: &E) -> Result<()> {
        let Outbreak {
            policy,
            rng,
            timeline,
            persons,
        } = self;
        let current = timeline.current();
        let time = current.time();

        // Phase 1: history.
        let mut outbreak_history = OutbreakHistoryBuilder::new(time + 1);
        let outbreak_ctx = OutbreakContext {
            policy: settings.policy,
            persons: persons.as_slice(),
        };
        policy
            .update_history(&mut outbreak_history, current, &outbreak_ctx, rng)
            .context("failed to update outbreak history")?;

        let screened = outbreak_history.screened_mask(persons.len());
        let person_ctx = PersonContext {
            behaviour: settings.behaviour,
            testing: settings.testing,
            kernel: settings.kernel,
            screened: &screened,
        };
        let histories = persons
            .par_iter_mut()
            .map(|person| person.record_history(&person_ctx))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to update person history")?;

        // Phase 2: transitions.
        let mut next = current.builder();
        let outbreak_ctx = OutbreakContext {
            policy: settings.policy,
            persons: persons.as_slice(),
        };
        let transition = policy
            .next_state(&mut next, current, &outbreak_ctx, rng)
            .context("failed to transition policy")?;

        if let Some(forced) = transition.broadcast {
            log::info!("period {}: forcing {} persons into {forced:?}", time + 1, persons.len());
            persons.iter_mut().for_each(|person| person.force(forced));
        }

        let pressure = epidemic.pressure(persons, settings.behaviour);
        let states = persons
            .par_iter_mut()
            .map(|person| person.next_state(&person_ctx, epidemic, pressure))
            .collect::<Result<Vec<_>>>()
            .context("failed to transition persons")?;

        // Publish.
        for ((person, state), history) in persons.iter_mut().zip(states).zip(histories) {
            person.publish(state, history);
        }

        let counts = epidemic.survey(persons);
        next.observe(counts, timeline.states(), settings.policy.trigger_window())
            .context("failed to observe outbreak")?;

        log::debug!(
            "period {}: {:?}, {} infectious, {} hospitalised",
            time + 1,
            transition.next,
            counts.infectious,
            counts.hospitalised
        );

        timeline.publish(next.build(transition.next), outbreak_history.build());
        *policy = transition.next;

        Ok(())
    }
}
