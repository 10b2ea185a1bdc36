pub const DEFAULT_SIZE_PER_COLUMN_PARTITION: u64 = 1000;
pub const DEFAULT_SEGMENT_SIZE: u64 = 1_048_576;
pub const DEFAULT_USE_SAMPLES_IN_ORDER: bool = false;
pub const DEFAULT_FAIL_IF_UPDATING: bool = false;
pub const DEFAULT_STRICT_HEADERS: bool = false;

// Fixed per-record cost added to the variable-length fields when sizing batches.
pub const RECORD_OVERHEAD_BYTES: u64 = 32;

pub const MANIFEST_FILE_NAME: &str = "__array.json";
pub const LOCK_FILE_NAME: &str = "__array.lock";
pub const FRAGMENT_PREFIX: &str = "fragment_";
pub const FRAGMENT_SUFFIX: &str = ".jsonl.gz";
pub const MANIFEST_VERSION: u32 = 1;
