pub const SUCCESS: i32 = 0;
/// Missing or unsupported input file, invalid configuration
pub const INPUT_ERROR: i32 = 1;
pub const EXECUTION_ERROR: i32 = 2;
/// A model command could not be started
pub const MODEL_ERROR: i32 = 3;
/// Batch finished with some files failed or skipped
pub const PARTIAL_FAILURE: i32 = 4;
