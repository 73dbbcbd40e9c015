mod copy;
mod session;
mod stats;

pub use copy::{copy_oneway, CopyOutcome, IdleWatch, COPY_BUF_SIZE};
pub use session::{Session, SessionSummary};
pub use stats::{
    rate_per_second, RelayStat, RelayStatInner, SessionStat, StatGuard, StatSample, StatSampler,
    StatsReporter,
};
