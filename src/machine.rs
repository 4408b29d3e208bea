//! Two-phase state-machine protocol shared by policies and behaviours.
//!
//! Each period the driver calls, for every entity, [`StateMachine::update_history`]
//! against the current variant and then [`StateMachine::next_state`] to pick
//! the variant for the following period. A variant is stateless: everything
//! it needs comes from the current snapshot, the context and the random
//! stream it is handed.

use crate::error::ControlError;
use rand_chacha::ChaCha12Rng;
use std::fmt::Debug;

/// Random stream owned by one entity.
pub type Rng = ChaCha12Rng;

/// Outcome of [`StateMachine::next_state`].
///
/// `broadcast` asks the driver to force every person into the given variant
/// before any person computes its own transition for the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<M, B> {
    pub next: M,
    pub broadcast: Option<B>,
}

impl<M, B> Transition<M, B> {
    pub fn to(next: M) -> Self {
        Self {
            next,
            broadcast: None,
        }
    }

    pub fn broadcasting(next: M, broadcast: B) -> Self {
        Self {
            next,
            broadcast: Some(broadcast),
        }
    }
}

pub trait StateMachine: Copy + Eq + Debug + Send + Sync {
    type State;
    type StateBuilder;
    type HistoryBuilder;
    type Context<'a>;
    type Broadcast;

    /// Record the actions taken during the period.
    ///
    /// Must not depend on anything computed by [`StateMachine::next_state`].
    fn update_history(
        &self,
        _history: &mut Self::HistoryBuilder,
        _current: &Self::State,
        _ctx: &Self::Context<'_>,
        _rng: &mut Rng,
    ) -> Result<(), ControlError> {
        Ok(())
    }

    /// Choose the variant for the next period, returning `self` to stay.
    fn next_state(
        &self,
        next: &mut Self::StateBuilder,
        current: &Self::State,
        ctx: &Self::Context<'_>,
        rng: &mut Rng,
    ) -> Result<Transition<Self, Self::Broadcast>, ControlError>;
}

pub(crate) fn undefined<M: Debug>(variant: M, reason: &'static str) -> ControlError {
    ControlError::UndefinedTransition {
        variant: format!("{variant:?}"),
        reason,
    }
}
