//! The sink side of a stream.

use crate::errors::ErrorPayload;

/// Receives the signals pushed by a producer: any number of `next` calls
/// followed by at most one `error` or `complete`.
pub trait Observer {
    type NextFnType;

    fn next(&mut self, _: Self::NextFnType);
    fn complete(&mut self);
    fn error(&mut self, _: ErrorPayload);
}
