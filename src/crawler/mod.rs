//! The crawl engine
//!
//! Frontier and visited bookkeeping, the worker pool with its
//! fetch/extract/enqueue cycle, the progress-event bus, job lifecycle, and
//! the multi-scope scheduler.

mod events;
mod frontier;
mod job;
mod multi;
mod registry;
mod types;
mod worker;

pub use events::{JobEvent, MultiJobEvent, PageCompleted, ProgressBus, SUBSCRIBER_BUFFER};
pub use frontier::{Admission, Frontier, FrontierEntry, Pop};
pub use job::{Job, ScopeTag, BOT_USER_AGENT};
pub use multi::{MultiScopeJob, ScopeStartInfo};
pub use registry::{JobEvents, JobOutput, JobOverview, JobRegistry, MultiJobStartInfo};
pub use types::{
    CrawlResult, DepthStats, FailureInfo, FailurePhase, FailureType, JobSnapshot, JobState,
    MultiCrawlResult, MultiJobSnapshot, PageCategory, PageResult, PageStatus, PageTiming,
    SkipReason, TimingMetrics,
};
