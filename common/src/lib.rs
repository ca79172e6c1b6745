pub mod bit_buffer2;
pub mod buffer2;
pub mod file_utils;
pub mod log_setup;
pub mod test_utils;

pub const EPSILON: f64 = 1e-6;
