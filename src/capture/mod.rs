//! Radar capture: browser control, orchestration, and post-processing.

pub mod browser;
pub mod orchestrator;
pub mod postprocess;
pub mod target;

pub use orchestrator::run;
pub use target::PageInfo;
