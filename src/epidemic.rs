//! Transmission and surveillance collaborators feeding the control loop.
//!
//! The control loop only sees what an [`Epidemic`] writes into person
//! builders and the counts it reports; [`ContactModel`] is a simple
//! fully-connected stochastic implementation.

use crate::behaviour::Behaviour;
use crate::config::{BehaviourConfig, ModelConfig};
use crate::machine::Rng;
use crate::model::{PersonState, PersonStateBuilder, Snapshot, SurveyCounts};
use crate::population::Person;
use anyhow::Result;
use rand::Rng as _;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Infection {
    Susceptible,
    Infected {
        /// Period of infection.
        day: usize,
        symptomatic: bool,
        severe: bool,
    },
    Recovered,
}

impl Infection {
    pub fn is_active(&self) -> bool {
        matches!(self, Infection::Infected { .. })
    }
}

pub trait Epidemic: Sync {
    /// Force of infection per unit of contact for the coming period.
    ///
    /// Called once per period, after any policy broadcast was applied.
    fn pressure(&self, persons: &[Person], behaviour: &BehaviourConfig) -> f64;

    /// Advance one person's infection into the next-state builder.
    fn progress(
        &self,
        current: &PersonState,
        active: Behaviour,
        next: &mut PersonStateBuilder,
        pressure: f64,
        behaviour: &BehaviourConfig,
        rng: &mut Rng,
    ) -> Result<()>;

    /// Surveillance counts for the period that just ended.
    ///
    /// Persons have published their new state and history at this point.
    fn survey(&self, persons: &[Person]) -> SurveyCounts {
        SurveyCounts::collect(persons)
    }
}

impl SurveyCounts {
    /// Count tests, screens, hospitalisations and infections over the population.
    pub fn collect(persons: &[Person]) -> Self {
        let mut counts = SurveyCounts {
            catchment: persons.len() as u64,
            ..SurveyCounts::default()
        };
        for person in persons {
            let state = person.state();
            let history = person.timeline().last_history();

            counts.tests += history.tested() as u64;
            counts.test_positives += (history.tested() && history.test_positive()) as u64;
            counts.screened += history.screened() as u64;
            counts.screen_positives += (history.screened() && history.screen_positive()) as u64;
            counts.positive_persons += history.is_positive() as u64;
            counts.hospitalised += state.is_hospitalised() as u64;

            if let Infection::Infected { day, .. } = state.infection() {
                counts.infectious += 1;
                counts.new_infections += (day + 1 == state.time()) as u64;
            }
        }
        counts
    }
}

/// Fully-connected stochastic transmission model.
#[derive(Debug, Clone)]
pub struct ContactModel {
    cfg: ModelConfig,
}

impl ContactModel {
    pub fn new(cfg: ModelConfig) -> Self {
        Self { cfg }
    }

    /// Draw the course of a new infection acquired on `day`.
    pub fn infect(&self, day: usize, rng: &mut Rng) -> Infection {
        let symptomatic = rng.random_bool(self.cfg.prob_symptomatic);
        let severe = symptomatic && rng.random_bool(self.cfg.prob_severe);
        Infection::Infected {
            day,
            symptomatic,
            severe,
        }
    }

    fn is_infectious(&self, state: &PersonState, time: usize) -> bool {
        match state.infection() {
            Infection::Infected { day, .. } => {
                let elapsed = time - day;
                elapsed >= self.cfg.latent_period
                    && elapsed < self.cfg.latent_period + self.cfg.infectious_period
            }
            _ => false,
        }
    }
}

impl Epidemic for ContactModel {
    fn pressure(&self, persons: &[Person], behaviour: &BehaviourConfig) -> f64 {
        if persons.len() < 2 {
            return 0.0;
        }
        let infectious: f64 = persons
            .iter()
            .filter(|person| {
                let state = person.state();
                !state.is_hospitalised() && self.is_infectious(state, state.time())
            })
            .map(|person| person.behaviour().contact_factor(behaviour))
            .sum();
        infectious / (persons.len() - 1) as f64
    }

    fn progress(
        &self,
        current: &PersonState,
        active: Behaviour,
        next: &mut PersonStateBuilder,
        pressure: f64,
        behaviour: &BehaviourConfig,
        rng: &mut Rng,
    ) -> Result<()> {
        let today = current.time();
        let now = next.time();

        match current.infection() {
            Infection::Susceptible => {
                let rate = self.cfg.contact_rate * active.contact_factor(behaviour) * pressure;
                if rate <= 0.0 {
                    return Ok(());
                }
                let n_contacts = Poisson::new(rate)?.sample(rng) as usize;
                let mut infected = false;
                for _ in 0..n_contacts {
                    next.push_contact(today);
                    infected |= rng.random_bool(self.cfg.prob_transmission);
                }
                if infected {
                    next.set_infection(self.infect(today, rng));
                }
            }
            Infection::Infected {
                day,
                symptomatic,
                severe,
            } => {
                let elapsed = now - day;
                if elapsed >= self.cfg.latent_period + self.cfg.infectious_period {
                    next.set_infection(Infection::Recovered);
                    next.set_symptom_onset(None);
                    next.set_hospitalised(false);
                } else if symptomatic && elapsed == self.cfg.incubation_period {
                    next.set_symptom_onset(Some(now));
                    next.set_hospitalised(severe);
                }
            }
            Infection::Recovered => {}
        }

        Ok(())
    }
}
