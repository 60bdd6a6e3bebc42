// Batch worker: runs the one or two passes of every item in order, threading
// captured statistics from a first pass into the second, and reports every
// step through an EventSink.
//
// - job: batch items, per-mode PassPlan hooks, the cancel flag
// - engine: the Sequencer state machine
// - report: what the batch produced and the end-of-batch summary

pub mod engine;
pub mod job;
pub mod report;

pub use engine::*;
pub use job::*;
pub use report::*;
