//! Status - Polling service の集計値
//!
//! ループ 1 本につき 1 つ。`WorkerService::counts()` で参照する。
//! CLI は停止時に JSON で出力する。

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceCounts {
    /// Messages handed out by the backend.
    pub received: usize,
    pub succeeded: usize,
    /// Any execution error, including panics. Broken down below.
    pub failed: usize,
    pub execution_failed: usize,
    pub invalid_message: usize,
    pub max_retries_reached: usize,
    pub panicked: usize,
    /// Queue / registry errors surfaced while executing.
    pub other_errors: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    pub listener_failures: usize,
    /// Receive / delete / resolution failures.
    pub queue_errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_serialize_with_field_names() {
        let counts = ServiceCounts {
            received: 3,
            succeeded: 1,
            failed: 2,
            invalid_message: 1,
            panicked: 1,
            deleted: 3,
            ..ServiceCounts::default()
        };

        let value = serde_json::to_value(&counts).unwrap();
        assert_eq!(value["received"], json!(3));
        assert_eq!(value["invalid_message"], json!(1));
        assert_eq!(value["panicked"], json!(1));
        assert_eq!(value["execution_failed"], json!(0));
    }
}
