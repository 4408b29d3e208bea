use crate::behaviour::Behaviour;
use crate::config::{LockdownConfig, PolicyConfig};
use crate::error::ControlError;
use crate::machine::{Rng, StateMachine, Transition, undefined};
use crate::model::{OutbreakHistoryBuilder, OutbreakState, OutbreakStateBuilder};
use crate::population::Person;
use rand::seq::index;
use serde::{Deserialize, Serialize};

/// Population-wide control policy, the outbreak's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// Baseline arm: never intervenes.
    NoControl,
    ReactiveLockdown(Phase),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Monitor,
    Lockdown,
}

impl Policy {
    pub fn initial(cfg: &PolicyConfig) -> Self {
        match cfg {
            PolicyConfig::NoControl => Policy::NoControl,
            PolicyConfig::ReactiveLockdown(_) => Policy::ReactiveLockdown(Phase::Monitor),
        }
    }

    pub fn is_lockdown(&self) -> bool {
        matches!(self, Policy::ReactiveLockdown(Phase::Lockdown))
    }
}

/// Read-only view shared with the outbreak's policy during a period.
pub struct OutbreakContext<'a> {
    pub policy: &'a PolicyConfig,
    pub persons: &'a [Person],
}

impl<'a> OutbreakContext<'a> {
    fn lockdown(&self, variant: Policy) -> Result<&'a LockdownConfig, ControlError> {
        self.policy
            .lockdown()
            .ok_or_else(|| undefined(variant, "no lockdown parameters configured"))
    }
}

impl StateMachine for Policy {
    type State = OutbreakState;
    type StateBuilder = OutbreakStateBuilder;
    type HistoryBuilder = OutbreakHistoryBuilder;
    type Context<'a> = OutbreakContext<'a>;
    type Broadcast = Behaviour;

    fn update_history(
        &self,
        history: &mut OutbreakHistoryBuilder,
        _current: &OutbreakState,
        ctx: &OutbreakContext<'_>,
        rng: &mut Rng,
    ) -> Result<(), ControlError> {
        match self {
            Policy::NoControl => Ok(()),
            // Screening carries on under lockdown.
            Policy::ReactiveLockdown(_) => {
                let lockdown = ctx.lockdown(*self)?;
                screen(history, ctx.persons.len(), lockdown.screening_sample_size, rng);
                Ok(())
            }
        }
    }

    fn next_state(
        &self,
        next: &mut OutbreakStateBuilder,
        current: &OutbreakState,
        ctx: &OutbreakContext<'_>,
        _rng: &mut Rng,
    ) -> Result<Transition<Policy, Behaviour>, ControlError> {
        let phase = match self {
            Policy::NoControl => return Ok(Transition::to(Policy::NoControl)),
            Policy::ReactiveLockdown(phase) => *phase,
        };

        let lockdown = ctx.lockdown(*self)?;
        let trigger = lockdown.lockdown_trigger_value;
        let observed = trigger.select(current);

        let transition = match phase {
            Phase::Monitor => {
                if observed.confidently_greater_than(
                    lockdown.lockdown_start_trigger,
                    lockdown.confidence,
                ) {
                    log::info!(
                        "period {}: {trigger} {}/{} confidently above {}, starting lockdown",
                        next.time(),
                        observed.successes(),
                        observed.trials(),
                        lockdown.lockdown_start_trigger
                    );
                    Transition::broadcasting(
                        Policy::ReactiveLockdown(Phase::Lockdown),
                        Behaviour::ISOLATE,
                    )
                } else {
                    Transition::to(*self)
                }
            }
            Phase::Lockdown => {
                if observed.confidently_less_than(
                    lockdown.lockdown_release_trigger,
                    lockdown.confidence,
                ) {
                    log::info!(
                        "period {}: {trigger} {}/{} confidently below {}, releasing lockdown",
                        next.time(),
                        observed.successes(),
                        observed.trials(),
                        lockdown.lockdown_release_trigger
                    );
                    Transition::broadcasting(
                        Policy::ReactiveLockdown(Phase::Monitor),
                        Behaviour::RELEASE,
                    )
                } else {
                    Transition::to(*self)
                }
            }
        };

        Ok(transition)
    }
}

/// Sample persons for routine screening.
fn screen(history: &mut OutbreakHistoryBuilder, n_persons: usize, sample_size: usize, rng: &mut Rng) {
    let amount = sample_size.min(n_persons);
    if amount == 0 {
        return;
    }
    history.screen(index::sample(rng, n_persons, amount).into_vec());
}
