use std::{any::Any, error::Error, sync::Arc};

use thiserror::Error;

/// Shared, type-erased error delivered to an observer's `error` callback.
pub type ErrorPayload = Arc<dyn Error + Send + Sync>;

/// Errors signalled by the operators and factories of this crate.
#[derive(Debug, Error)]
pub enum ObservableError {
    /// A user callback panicked inside an operator. The panic was caught and
    /// turned into an error signal for the downstream observer.
    #[error("{operator} callback panicked: {message}")]
    CallbackPanicked {
        operator: &'static str,
        message: String,
    },

    /// The future behind `from_future` resolved to an error.
    #[error("error in the resolution of the future")]
    FutureRejected {
        #[source]
        source: ErrorPayload,
    },

    /// An asynchronous factory was subscribed outside of a Tokio runtime.
    #[error("observable requires a Tokio runtime but none is running")]
    NoRuntime,

    /// `interval` was created with a zero period.
    #[error("interval period must be greater than zero")]
    InvalidPeriod,
}

impl ObservableError {
    /// Builds a `CallbackPanicked` error from a payload returned by
    /// `std::panic::catch_unwind`.
    pub(crate) fn from_panic(operator: &'static str, panic: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        ObservableError::CallbackPanicked { operator, message }
    }

    /// Wraps this error into the shared payload observers receive.
    #[must_use]
    pub fn into_payload(self) -> ErrorPayload {
        Arc::new(self)
    }
}
