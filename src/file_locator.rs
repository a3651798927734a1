use crate::models::FileLocation;

/// Produces the reserved output-file handles a worker writes results to.
/// Pure and deterministic: the same `(task_id, user_id, submission_order,
/// test_case_order)` must always yield the same three locations, so the
/// listener can persist what the worker reports verbatim without looking
/// anything up first.
pub trait FileLocator: Send + Sync {
    fn reserve_result_files(
        &self,
        task_id: u64,
        user_id: u64,
        submission_order: u32,
        test_case_order: u32,
    ) -> (FileLocation, FileLocation, FileLocation);
}

/// Deterministic bucket-path layout: `results/{task}/{user}/{order}/{case}.{kind}`.
pub struct DeterministicFileLocator {
    pub server_type: String,
    pub bucket: String,
}

impl FileLocator for DeterministicFileLocator {
    fn reserve_result_files(
        &self,
        task_id: u64,
        user_id: u64,
        submission_order: u32,
        test_case_order: u32,
    ) -> (FileLocation, FileLocation, FileLocation) {
        let base = format!(
            "results/{}/{}/{}/{}",
            task_id, user_id, submission_order, test_case_order
        );
        let make = |kind: &str| FileLocation {
            server_type: self.server_type.clone(),
            bucket: self.bucket.clone(),
            path: format!("{}.{}", base, kind),
        };
        (make("stdout"), make("stderr"), make("diff"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_yield_identical_locations() {
        let locator = DeterministicFileLocator {
            server_type: "s3".to_string(),
            bucket: "judge-results".to_string(),
        };
        let a = locator.reserve_result_files(42, 7, 1, 2);
        let b = locator.reserve_result_files(42, 7, 1, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_test_case_orders_yield_distinct_locations() {
        let locator = DeterministicFileLocator {
            server_type: "s3".to_string(),
            bucket: "judge-results".to_string(),
        };
        let a = locator.reserve_result_files(42, 7, 1, 1);
        let b = locator.reserve_result_files(42, 7, 1, 2);
        assert_ne!(a, b);
    }
}
