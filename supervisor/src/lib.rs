//! Library surface for the `supd` binary, split out the same way as
//! `broker` so integration tests can drive real `WorkerPool`s.

pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod pool;
pub mod worker;
