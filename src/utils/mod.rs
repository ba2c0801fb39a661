//! utils is a tool module that provides ready-made task bodies, a backoff
//! policy, and a hand-driven scheduler for deterministic tests.
pub mod backoff;
pub mod convenience;
pub mod manual;

cfg_status_report!(
    pub mod status_report;
    pub use status_report::StatusReporter;
);

pub use backoff::LinearBackoff;
pub use convenience::functions;
pub use manual::ManualScheduler;
