// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Ordered candidate chains over an API surface whose exact shape is unknown.

use crate::sandbox::{SandboxError, SandboxResult};
use std::fmt::Display;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum Outcome<T> {
    /// A candidate completed without raising.
    Accepted(T),
    /// No candidate was accepted. Carries the error that ended the chain early, if any.
    Exhausted(Option<SandboxError>),
}

impl<T> Outcome<T> {
    pub fn accepted(self) -> Option<T> {
        match self {
            Outcome::Accepted(v) => Some(v),
            Outcome::Exhausted(_) => None,
        }
    }
}

/// What a raised exception other than a shape mismatch does to a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnRaise {
    /// The exception is a genuine library error and ends the chain.
    Stop,
    /// Every raised exception is logged and the next candidate runs.
    Continue,
}

/// Runs `attempt` over `candidates` until one is accepted.
///
/// `Ok(None)` from an attempt means the candidate does not apply (for example a missing
/// method) and the next one is tried. A shape mismatch moves on as well. Any other raised
/// exception is a genuine library error and ends the chain; transport faults propagate.
pub fn first_accepted<C, T, F>(
    what: &str,
    candidates: &[C],
    attempt: F,
) -> SandboxResult<Outcome<T>>
where
    C: Display,
    F: FnMut(&C) -> SandboxResult<Option<T>>,
{
    first_accepted_with(OnRaise::Stop, what, candidates, attempt)
}

/// [`first_accepted`] with an explicit policy for raised exceptions.
///
/// Under [`OnRaise::Continue`] an exhausted chain carries the last raised exception.
pub fn first_accepted_with<C, T, F>(
    on_raise: OnRaise,
    what: &str,
    candidates: &[C],
    mut attempt: F,
) -> SandboxResult<Outcome<T>>
where
    C: Display,
    F: FnMut(&C) -> SandboxResult<Option<T>>,
{
    let mut last_raised = None;
    for candidate in candidates {
        debug!("{}: trying {}", what, candidate);
        match attempt(candidate) {
            Ok(Some(value)) => {
                debug!("{}: accepted {}", what, candidate);
                return Ok(Outcome::Accepted(value));
            }
            Ok(None) => debug!("{}: {} not applicable", what, candidate),
            Err(e) if e.is_shape_mismatch() => {
                debug!("{}: {} rejected: {}", what, candidate, e);
            }
            Err(e) if e.is_raised() => {
                warn!("{}: {} failed: {}", what, candidate, e);
                if on_raise == OnRaise::Stop {
                    return Ok(Outcome::Exhausted(Some(e)));
                }
                last_raised = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    debug!("{}: no candidate accepted", what);
    Ok(Outcome::Exhausted(last_raised))
}
