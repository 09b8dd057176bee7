//! 一括処理の結果

use serde::Serialize;

use crate::types::{FailureRecord, SelectionResult};

/// 一括処理の結果（成功と失敗をそれぞれ入力順に保持）
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub successes: Vec<SelectionResult>,
    pub failures: Vec<FailureRecord>,
}

impl BulkOutcome {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_all_success(&self) -> bool {
        self.failures.is_empty()
    }
}
