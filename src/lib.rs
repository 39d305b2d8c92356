//! `rxmini` is a minimal implementation of push-based reactive streams.
//!
//! An [`Observable`] wraps a producer: a closure that pushes values into a
//! [`Subscriber`](subscribe::Subscriber) and signals completion or an error.
//! Observables are lazy and cold. Building a pipeline does nothing; each
//! `subscribe` call runs the whole chain again, independently of any other
//! subscription.
//!
//! Pipelines start from a factory such as [`Observable::of`],
//! [`Observable::from`] or [`Observable::interval`] and are extended with the
//! operators of [`ObservableExt`]:
//!
//! ```no_run
//! use rxmini::{of, subscribe::Subscriber, ObservableExt, Subscribeable};
//!
//! of![1, 2, 3, 4, 5]
//!     .filter(|v| v % 2 == 1)
//!     .map(|v| v * 10)
//!     .start_with(vec![0])
//!     .subscribe(Subscriber::new(
//!         |v| println!("{}", v),
//!         |e| eprintln!("{}", e),
//!         || println!("done"),
//!     ));
//! ```
//!
//! Every signal sequence ends with at most one `error` or `complete`; a
//! `Subscriber` drops anything pushed after that. Panics raised by callbacks
//! passed to operators are caught and delivered as
//! [`ObservableError::CallbackPanicked`].

mod errors;
mod observable;
pub mod observer;
mod subscription;

pub use errors::*;
pub use observable::*;
pub use observer::Observer;
pub use subscription::subscribe;
pub use subscription::subscribe::{Subscribeable, Unsubscribeable};

/// Builds an [`Observable`] that emits its arguments in order, then completes.
///
/// `of![a, b, c]` is shorthand for `Observable::of(vec![a, b, c])`.
#[macro_export]
macro_rules! of {
    ($($value:expr),* $(,)?) => {
        $crate::Observable::of(::std::vec![$($value),*])
    };
}
