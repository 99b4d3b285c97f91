//! Inference executor: consumes jobs from the bus, builds an execution
//! context (files, model, memory, tools, prompt), runs the agent loop or
//! a single completion, publishes results, honors fanout cancellation,
//! and feeds the memory-update loop.

pub mod build;
pub mod cancel;
pub mod job;
pub mod listener;
pub mod publisher;
pub mod run;
pub mod worker;
