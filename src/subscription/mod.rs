//! Provides the observer and subscription plumbing.
//!
//! This module includes `Subscriber`, the closure-backed observer handed to
//! producers, and `Subscription`, the handle returned by `subscribe` for
//! tearing a running producer down or awaiting it.
pub mod subscribe;
