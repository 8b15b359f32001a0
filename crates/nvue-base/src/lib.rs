pub mod cancel;
pub mod clock;
pub mod logging;

pub use cancel::CancelToken;
pub use clock::{FILE_STAMP_FORMAT, format_file_stamp, format_timestamp, format_today};
pub use logging::{FileLogger, StdoutLogger, init_file_logger, init_stdout_logger};

// Re-export log crate so downstream crates can use nvue_base::log::*
pub use log;
