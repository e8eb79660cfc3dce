//! Analyzer results and the per-message processor result holding them.

pub mod bounce;
pub mod default;
pub mod processor;
pub mod status;

pub use bounce::BounceAnalyzerResult;
pub use default::{Account, Context, DefaultAnalyzerResult};
pub use processor::{AnalyzerResult, LogEntry, ProcessorResult, Summary};
pub use status::DsnStatus;
