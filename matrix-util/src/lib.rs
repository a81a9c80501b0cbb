pub mod common_io;
pub mod ndarray_stat;
pub mod tensor_util;
pub mod traits;
