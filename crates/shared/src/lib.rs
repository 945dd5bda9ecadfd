pub mod domain;
pub mod error;
pub mod protocol;

pub use error::{AppError, ErrorCode};
pub use protocol::{BackendEvent, CommandResult, BACKEND_EVENT_CHANNEL};
