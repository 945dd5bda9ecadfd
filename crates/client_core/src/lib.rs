//! Effect runtime: reducers describe remote calls and event subscriptions as
//! data, and this crate executes them against a backend [`Transport`].

pub mod command;
pub mod config;
pub mod dispatch;
pub mod interpreter;
pub mod normalize;
pub mod staleness;
pub mod subscriptions;
pub mod transport;

pub use command::{Command, EventCallback, Invoke, Subscription};
pub use config::{load_settings, load_settings_from, settings_path, RuntimeSettings};
pub use dispatch::{Dispatcher, Runtime};
pub use interpreter::{CustomHandler, Interpreter};
pub use normalize::{decode, normalize, normalize_error, normalize_error_code, normalize_event};
pub use staleness::{RequestSeq, RequestToken, SharedRequestSeq};
pub use subscriptions::{SubscriptionHandle, SubscriptionManager};
pub use transport::{EventSource, HttpTransport, Transport, TransportError};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
