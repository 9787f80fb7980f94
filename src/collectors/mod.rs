//! Fixed batteries of remote probes. Each collector drives a
//! [`CommandRunner`](crate::runner::CommandRunner) and never fails as a whole:
//! a probe that yields nothing leaves its slot empty.

pub mod cron;
pub mod stats;
