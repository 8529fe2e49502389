mod logger;
pub use logger::*;

mod status;
pub use status::{StatusLog, log_status, message_for};
