use crate::{
    constants::{
        DEFAULT_FAIL_IF_UPDATING, DEFAULT_SEGMENT_SIZE, DEFAULT_SIZE_PER_COLUMN_PARTITION,
        DEFAULT_STRICT_HEADERS, DEFAULT_USE_SAMPLES_IN_ORDER,
    },
    core::{interval::Interval, registry::SampleOrder},
    error::VarstoreError,
    store::ArrayTarget,
    utils::util::Result,
};
use std::path::PathBuf;

/// Flush thresholds, in buffered bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    pub size_per_column_partition: u64,
    pub segment_size: u64,
}

impl BatchLimits {
    pub fn new(size_per_column_partition: u64, segment_size: u64) -> Result<Self> {
        if size_per_column_partition == 0 {
            return Err(VarstoreError::message(
                "size-per-column-partition must be >= 1",
            ));
        }
        if segment_size == 0 {
            return Err(VarstoreError::message("segment-size must be >= 1"));
        }
        Ok(Self {
            size_per_column_partition,
            segment_size,
        })
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            size_per_column_partition: DEFAULT_SIZE_PER_COLUMN_PARTITION,
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub target: ArrayTarget,
    pub limits: BatchLimits,
    pub use_samples_in_order: bool,
    pub fail_if_updating: bool,
    pub strict_headers: bool,
}

impl ImportConfig {
    pub fn new(
        workspace: impl Into<PathBuf>,
        array: &str,
        interval: Interval,
        limits: BatchLimits,
    ) -> Result<Self> {
        if array.is_empty() {
            return Err(VarstoreError::message("array name must not be empty"));
        }
        if array == "." || array == ".." || array.contains(['/', '\\']) {
            return Err(VarstoreError::message(format!(
                "array name `{array}` must be a single path component"
            )));
        }
        Ok(Self {
            target: ArrayTarget::new(workspace, array, interval),
            limits,
            use_samples_in_order: DEFAULT_USE_SAMPLES_IN_ORDER,
            fail_if_updating: DEFAULT_FAIL_IF_UPDATING,
            strict_headers: DEFAULT_STRICT_HEADERS,
        })
    }

    pub fn with_samples_in_order(mut self, use_samples_in_order: bool) -> Self {
        self.use_samples_in_order = use_samples_in_order;
        self
    }

    pub fn with_fail_if_updating(mut self, fail_if_updating: bool) -> Self {
        self.fail_if_updating = fail_if_updating;
        self
    }

    pub fn with_strict_headers(mut self, strict_headers: bool) -> Self {
        self.strict_headers = strict_headers;
        self
    }

    pub fn sample_order(&self) -> SampleOrder {
        SampleOrder::from_use_samples_in_order(self.use_samples_in_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_limits_reject_zero() {
        let err = BatchLimits::new(0, 10).expect_err("zero column limit should be rejected");
        assert!(err.to_string().contains("size-per-column-partition"));
        let err = BatchLimits::new(10, 0).expect_err("zero segment size should be rejected");
        assert!(err.to_string().contains("segment-size"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let limits = BatchLimits::default();
        assert_eq!(limits.size_per_column_partition, 1000);
        assert_eq!(limits.segment_size, 1_048_576);

        let config = ImportConfig::new(
            "/ws",
            "arr",
            Interval::new("chr1", 1, 10).unwrap(),
            limits,
        )
        .unwrap();
        assert!(!config.fail_if_updating);
        assert!(!config.strict_headers);
        assert_eq!(config.sample_order(), SampleOrder::Canonical);
        assert_eq!(
            config.with_samples_in_order(true).sample_order(),
            SampleOrder::InputOrder
        );
    }

    #[test]
    fn array_name_must_be_a_path_component() {
        let interval = Interval::new("chr1", 1, 10).unwrap();
        for name in ["", "..", "a/b"] {
            assert!(
                ImportConfig::new("/ws", name, interval.clone(), BatchLimits::default()).is_err()
            );
        }
    }
}
