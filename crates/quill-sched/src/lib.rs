//! Serial single-worker task lanes.
//!
//! A [`Lane`] is a strictly-serial executor: tasks submitted to it run one
//! at a time, in submission order, on a dedicated worker task. Lanes accept
//! one-shot tasks ([`Lane::submit`]), delayed tasks ([`Lane::schedule`]) and
//! fixed-rate periodic tasks ([`Lane::schedule_at_fixed_rate`]), and support
//! graceful ([`Lane::shutdown`]) and forced ([`Lane::shutdown_now`])
//! termination with a bounded [`Lane::await_termination`] wait.
//!
//! A task failing (or panicking) never takes the lane down; the worker
//! logs it and moves on to the next task.

mod lane;

pub use lane::{Lane, RejectedError, TaskCancelled, TaskHandle};

#[cfg(test)]
mod tests;
