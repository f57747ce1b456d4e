//! Change classification for normal vs. fault statistics
//!
//! Two tiers:
//! - coarse: aggregate golden signals go to a pluggable shortlist delegate
//! - fine: single resource metrics are judged by a fixed ratio band
//!
//! In both tiers a metric missing either side's statistics is never
//! reported as changed.

mod llm;
mod ratio;
mod shortlist;

pub use llm::{parse_metric_list, HttpShortlist, HttpShortlistConfig};
pub use ratio::{Classification, RatioBand, Verdict, EPSILON};
pub use shortlist::{
    accept_shortlist, ShortlistDelegate, StatisticalShortlist, StatsMap,
};
