//! Human-readable bounce reason from the first part of a DSN.

use super::Analyzer;
use crate::error::Result;
use crate::mime::MimeEntity;
use crate::result::{BounceAnalyzerResult, ProcessorResult};

pub const PLUGIN_ID: &str = "dsn_reason";

#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDsnReasonAnalyzer;

impl Analyzer for StandardDsnReasonAnalyzer {
    fn analyze(&self, message: &MimeEntity, result: &mut ProcessorResult) -> Result<()> {
        let Some(dsn) = message.as_dsn() else {
            return Ok(());
        };
        let Some(human_part) = dsn.human_part() else {
            return Ok(());
        };

        let reason = human_part
            .decoded_body()
            .unwrap_or_else(|| human_part.body().to_string());
        result
            .ensure_analyzer_result(BounceAnalyzerResult::TOPIC, BounceAnalyzerResult::new)?
            .set_reason(reason.trim());
        Ok(())
    }
}
