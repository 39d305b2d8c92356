//! Error values produced by the library itself.
//!
//! Errors travel through a pipeline as opaque `Arc<dyn Error + Send + Sync>`
//! values. The variants of [`ObservableError`] are what the creation operators
//! and the operator failure boundaries put on the wire; user producers are free
//! to signal any other error type.

mod observable_errors;

pub use observable_errors::*;
