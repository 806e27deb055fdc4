// newsletter-sdk: Foundation layer for the newsletter runner.
// This crate has no dependencies on other runner crates and provides the
// process, trace and filesystem primitives used by every other layer.

pub mod io_util;
pub mod path_util;
pub mod process_invoker;
pub mod string_util;
pub mod trace;
pub mod which_util;

// Re-export commonly used items at crate root
pub use io_util::IOUtil;
pub use path_util::PathUtil;
pub use process_invoker::{
    CapturedOutput, ProcessDataReceivedEventArgs, ProcessExitCodeError, ProcessInvoker,
};
pub use string_util::StringUtil;
pub use trace::TraceWriter;
pub use which_util::WhichUtil;
