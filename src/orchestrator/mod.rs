//! Run orchestration.
//!
//! The controller drives one run through its states; polling and
//! post-download processing live in their own modules so the CLI only deals
//! with [`Orchestrator`] and [`RunRequest`].

mod controller;
#[cfg(test)]
mod fakes;
mod poll;
mod post_process;

pub(crate) use controller::{Orchestrator, RunRequest};
