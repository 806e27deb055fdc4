pub mod task_result_util;
pub mod var_util;
