//! # Cache Module
//!
//! In-memory knowledge the bot accumulates while it plays music.
//!
//! ## Contents
//!
//! - **Duration Learner** ([`DurationLearner`]): per-video observations of how
//!   long a track actually played, with a confidence score that grows as
//!   observations agree. Trusted observations override the duration reported
//!   by the platform.
//! - **Play History** ([`PlayHistory`]): bounded log of completed plays, used
//!   by the `!ai` report.
//!
//! ## Configuration
//!
//! ```env
//! DURATION_CACHE_CAPACITY=1000   # Size that triggers trimming
//! DURATION_CACHE_TRIM=800        # Size kept after trimming
//! ```
//!
//! Nothing here is persisted; a restart starts from an empty cache.

pub mod analytics;
pub mod duration;

pub use analytics::{HistorySummary, PlayHistory, PlayReport};
pub use duration::{DurationLearner, DurationRecord};
