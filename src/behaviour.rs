use crate::config::{BehaviourConfig, TestingConfig};
use crate::error::ControlError;
use crate::kernel::Kernel;
use crate::machine::{Rng, StateMachine, Transition, undefined};
use crate::model::{PersonHistoryBuilder, PersonState, PersonStateBuilder, Snapshot};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// Individual conduct, the person's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Behaviour {
    Normal,
    /// Isolating on own initiative (symptoms or high exposure).
    SelfIsolating,
    /// Isolating because a lockdown is in force.
    Isolating,
    /// Just released from lockdown.
    Released,
}

impl Behaviour {
    /// Variant forced on everybody when a lockdown starts.
    pub const ISOLATE: Behaviour = Behaviour::Isolating;
    /// Variant forced on everybody when a lockdown ends.
    pub const RELEASE: Behaviour = Behaviour::Released;

    pub fn contact_factor(&self, cfg: &BehaviourConfig) -> f64 {
        match self {
            Behaviour::Normal | Behaviour::Released => 1.0,
            Behaviour::SelfIsolating => cfg.isolation_contact_factor,
            Behaviour::Isolating => cfg.lockdown_contact_factor,
        }
    }
}

/// Read-only view shared with every person during a period.
pub struct PersonContext<'a> {
    pub behaviour: &'a BehaviourConfig,
    pub testing: &'a TestingConfig,
    pub kernel: &'a Kernel,
    /// Persons selected for screening by the outbreak's policy, by id.
    pub screened: &'a [bool],
}

impl StateMachine for Behaviour {
    type State = PersonState;
    type StateBuilder = PersonStateBuilder;
    type HistoryBuilder = PersonHistoryBuilder;
    type Context<'a> = PersonContext<'a>;
    type Broadcast = Infallible;

    fn update_history(
        &self,
        history: &mut PersonHistoryBuilder,
        current: &PersonState,
        ctx: &PersonContext<'_>,
        rng: &mut Rng,
    ) -> Result<(), ControlError> {
        let test = |rng: &mut Rng| {
            current.infection().is_active() && rng.random_bool(ctx.testing.test_sensitivity)
        };

        if ctx.screened.get(current.id()).copied().unwrap_or(false) {
            let positive = test(rng);
            history.record_screen(positive);
        }

        let onset_today = current.symptom_onset() == Some(current.time());
        if onset_today && rng.random_bool(ctx.testing.prob_test_symptomatic) {
            let positive = test(rng);
            history.record_test(positive);
        }

        Ok(())
    }

    fn next_state(
        &self,
        next: &mut PersonStateBuilder,
        current: &PersonState,
        ctx: &PersonContext<'_>,
        rng: &mut Rng,
    ) -> Result<Transition<Behaviour, Infallible>, ControlError> {
        let now = next.time();
        let kernel = ctx.kernel;
        next.retain_contacts(|day| kernel.is_live(day, now));
        let exposure = kernel.convolve(next.contacts(), now);
        next.set_exposure(exposure);

        let cfg = ctx.behaviour;
        let symptomatic = next.is_symptomatic();

        let variant = match self {
            Behaviour::Normal | Behaviour::Released => {
                let exposed = exposure >= cfg.self_isolation_exposure
                    && exposure > 0.0
                    && rng.random_bool(cfg.prob_compliance);
                if symptomatic || exposed {
                    next.set_isolating_since(Some(now));
                    Behaviour::SelfIsolating
                } else {
                    next.set_isolating_since(None);
                    Behaviour::Normal
                }
            }
            Behaviour::SelfIsolating => {
                let since = current
                    .isolating_since()
                    .ok_or_else(|| undefined(*self, "no isolation start recorded"))?;
                if !symptomatic && now - since >= cfg.self_isolation_period {
                    next.set_isolating_since(None);
                    Behaviour::Normal
                } else {
                    Behaviour::SelfIsolating
                }
            }
            // Only the policy lifts a lockdown.
            Behaviour::Isolating => {
                next.set_isolating_since(None);
                Behaviour::Isolating
            }
        };

        Ok(Transition::to(variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::config;
    use crate::epidemic::Infection;
    use rand::SeedableRng;

    struct Fixture {
        behaviour: BehaviourConfig,
        testing: TestingConfig,
        kernel: Kernel,
        screened: Vec<bool>,
    }

    impl Fixture {
        fn new() -> Self {
            let cfg = config();
            Self {
                behaviour: BehaviourConfig {
                    prob_compliance: 1.0,
                    ..cfg.behaviour
                },
                testing: TestingConfig {
                    prob_test_symptomatic: 1.0,
                    test_sensitivity: 1.0,
                },
                kernel: cfg.kernel.build().unwrap(),
                screened: vec![false; 4],
            }
        }

        fn ctx(&self) -> PersonContext<'_> {
            PersonContext {
                behaviour: &self.behaviour,
                testing: &self.testing,
                kernel: &self.kernel,
                screened: &self.screened,
            }
        }
    }

    fn step(variant: Behaviour, current: &PersonState, fixture: &Fixture) -> (Behaviour, PersonState) {
        let mut rng = Rng::seed_from_u64(1);
        let mut next = current.builder();
        let transition = variant
            .next_state(&mut next, current, &fixture.ctx(), &mut rng)
            .unwrap();
        assert_eq!(transition.broadcast, None);
        (transition.next, next.build(transition.next))
    }

    #[test]
    fn records_screening_results() {
        let mut fixture = Fixture::new();
        fixture.screened[2] = true;
        let infected = Infection::Infected {
            day: 0,
            symptomatic: false,
            severe: false,
        };
        let mut rng = Rng::seed_from_u64(3);

        for (id, infection, screened, positive) in [
            (2, infected, true, true),
            (2, Infection::Susceptible, true, false),
            (1, infected, false, false),
        ] {
            let state = PersonState::initial(id, Behaviour::Normal, infection);
            let mut history = PersonHistoryBuilder::new(1);
            Behaviour::Normal
                .update_history(&mut history, &state, &fixture.ctx(), &mut rng)
                .unwrap();
            let history = history.build();
            assert_eq!(history.screened(), screened);
            assert_eq!(history.screen_positive(), positive);
            assert!(!history.tested());
        }
    }

    #[test]
    fn high_exposure_leads_to_self_isolation() {
        let fixture = Fixture::new();
        let state = PersonState::initial(0, Behaviour::Normal, Infection::Susceptible);
        let mut next = state.builder();
        next.push_contact(1);
        next.push_contact(1);
        let current = next.build(Behaviour::Normal);

        // two contacts at lag one weigh 2 * 0.4
        let (variant, sealed) = step(Behaviour::Normal, &current, &fixture);
        assert_eq!(variant, Behaviour::SelfIsolating);
        assert!((sealed.exposure() - 0.8).abs() < 1e-12);
        assert_eq!(sealed.isolating_since(), Some(2));
    }

    #[test]
    fn self_isolation_ends_after_its_period() {
        let fixture = Fixture::new();
        let mut current = PersonState::initial(0, Behaviour::SelfIsolating, Infection::Susceptible);
        let mut builder = current.builder();
        builder.set_isolating_since(Some(1));
        current = builder.build(Behaviour::SelfIsolating);

        let mut variant = Behaviour::SelfIsolating;
        let mut released_at = None;
        for _ in 0..10 {
            let (next_variant, next_state) = step(variant, &current, &fixture);
            if next_variant == Behaviour::Normal && released_at.is_none() {
                released_at = Some(next_state.time());
            }
            variant = next_variant;
            current = next_state;
        }
        assert_eq!(released_at, Some(1 + fixture.behaviour.self_isolation_period));
    }

    #[test]
    fn self_isolation_without_start_is_undefined() {
        let fixture = Fixture::new();
        let current = PersonState::initial(0, Behaviour::SelfIsolating, Infection::Susceptible);
        let mut rng = Rng::seed_from_u64(1);
        let error = Behaviour::SelfIsolating
            .next_state(&mut current.builder(), &current, &fixture.ctx(), &mut rng)
            .unwrap_err();
        assert!(matches!(error, ControlError::UndefinedTransition { .. }));
    }

    #[test]
    fn lockdown_isolation_only_ends_by_release() {
        let fixture = Fixture::new();
        let current = PersonState::initial(0, Behaviour::Normal, Infection::Susceptible);
        let (variant, _) = step(Behaviour::Isolating, &current, &fixture);
        assert_eq!(variant, Behaviour::Isolating);
        let (variant, _) = step(Behaviour::Released, &current, &fixture);
        assert_eq!(variant, Behaviour::Normal);
    }
}
