//! Factories that build an `Observable` from plain values, collections,
//! futures and timers.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    error::Error,
    future::Future,
    ops::{Range, RangeInclusive},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::Observable;
use crate::errors::{ErrorPayload, ObservableError};
use crate::observer::Observer;
use crate::subscription::subscribe::{
    Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
};

/// Pushes every item of `iter` into `o`, then completes. A panic raised while
/// iterating or while delivering an item is signalled as an error instead.
///
/// Stops pulling from `iter` as soon as `o` is closed, so an unbounded
/// iterator ends once the consumer stops listening.
fn emit_guarded<T, I>(operator: &'static str, mut iter: I, o: &mut Subscriber<T>)
where
    I: Iterator<Item = T>,
{
    let emitted = catch_unwind(AssertUnwindSafe(|| {
        while !o.is_closed() {
            match iter.next() {
                Some(v) => o.next(v),
                None => break,
            }
        }
    }));
    match emitted {
        Ok(()) => o.complete(),
        Err(panic) => {
            warn!(operator, "panic while emitting, signalling error");
            o.error(ObservableError::from_panic(operator, panic.as_ref()).into_payload());
            o.complete();
        }
    }
}

/// Signals `e` to a subscriber that never started, for factories that cannot
/// run at all.
fn fail<T>(mut o: Subscriber<T>, e: ObservableError) -> Subscription {
    o.error(e.into_payload());
    o.complete();
    Subscription::empty()
}

impl<T: 'static> Observable<T> {
    /// Emits each of `values` in order, then completes. Never errors.
    pub fn of(values: Vec<T>) -> Observable<T>
    where
        T: Clone + Send + Sync,
    {
        Observable::new(move |mut o| {
            for v in &values {
                if o.is_closed() {
                    break;
                }
                o.next(v.clone());
            }
            o.complete();
            Subscription::empty()
        })
    }

    /// Emits each element of `values` in order, then completes.
    ///
    /// Unlike [`of`](Self::of), emission runs inside a failure boundary: a
    /// panic raised while the values are delivered is signalled as an error.
    pub fn from_array(values: Vec<T>) -> Observable<T>
    where
        T: Clone + Send + Sync,
    {
        Observable::new(move |mut o| {
            emit_guarded("from_array", values.iter().cloned(), &mut o);
            Subscription::empty()
        })
    }

    /// Emits every item produced by `iter`, then completes.
    ///
    /// The iterator is cloned for every subscription, so each subscriber walks
    /// the full sequence. Emission runs inside the same failure boundary as
    /// [`from_array`](Self::from_array).
    ///
    /// The iterator may be unbounded as long as something downstream, such as
    /// [`take`](crate::ObservableExt::take), stops listening.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iter: I) -> Observable<T>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Clone + Send + Sync + 'static,
    {
        let iter = iter.into_iter();
        Observable::new(move |mut o| {
            emit_guarded("from_iter", iter.clone(), &mut o);
            Subscription::empty()
        })
    }

    /// Completes immediately without emitting.
    #[must_use]
    pub fn empty() -> Observable<T> {
        Observable::new(|mut o| {
            o.complete();
            Subscription::empty()
        })
    }

    /// Emits the value `future` resolves to, then completes.
    ///
    /// The future is shared between subscriptions: it is polled at most once
    /// and every subscriber receives the same settled result. If it resolves
    /// to `Err`, subscribers receive `ObservableError::FutureRejected` carrying
    /// the cause. The future is driven on the Tokio runtime that is current at
    /// subscribe time; without one, subscribers receive
    /// `ObservableError::NoRuntime` and nothing is polled.
    pub fn from_future<F, E>(future: F) -> Observable<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
        T: Clone + Send + Sync,
    {
        let shared = future
            .map(|r| r.map_err(|e| Arc::new(e) as ErrorPayload))
            .boxed()
            .shared();

        Observable::new(move |mut o| {
            let Ok(handle) = Handle::try_current() else {
                return fail(o, ObservableError::NoRuntime);
            };
            let settled = shared.clone();
            let task = handle.spawn(async move {
                match settled.await {
                    Ok(v) => {
                        o.next(v);
                        o.complete();
                    }
                    Err(cause) => {
                        debug!(%cause, "future rejected");
                        o.error(ObservableError::FutureRejected { source: cause }.into_payload());
                        o.complete();
                    }
                }
            });
            let abort = task.abort_handle();

            Subscription::new(
                UnsubscribeLogic::Logic(Box::new(move || abort.abort())),
                SubscriptionHandle::JoinTask(task),
            )
        })
    }

    /// Converts anything that implements [`IntoObservable`] into an
    /// `Observable`: futures wrapped in [`Awaitable`], text, collections,
    /// ranges, and observables themselves.
    #[allow(clippy::should_implement_trait)]
    pub fn from<I>(input: I) -> Observable<T>
    where
        I: IntoObservable<Item = T>,
    {
        input.into_observable()
    }
}

impl Observable<u64> {
    /// Emits `0, 1, 2, ...`, one value per `period`, until unsubscribed.
    ///
    /// The first value arrives one `period` after subscribing. Every
    /// subscription starts its own timer on the current Tokio runtime, so two
    /// subscribers that subscribe at different times see different values at
    /// the same moment. A zero `period` signals
    /// `ObservableError::InvalidPeriod`; subscribing outside a runtime signals
    /// `ObservableError::NoRuntime`.
    #[must_use]
    pub fn interval(period: Duration) -> Observable<u64> {
        Observable::new(move |o| {
            if period.is_zero() {
                return fail(o, ObservableError::InvalidPeriod);
            }
            let Ok(handle) = Handle::try_current() else {
                return fail(o, ObservableError::NoRuntime);
            };

            debug!(?period, "interval started");
            let mut o = o;
            let task = handle.spawn(async move {
                let start = tokio::time::Instant::now() + period;
                let mut ticker = tokio::time::interval_at(start, period);
                let mut i: u64 = 0;
                loop {
                    ticker.tick().await;
                    if o.is_closed() {
                        break;
                    }
                    o.next(i);
                    i += 1;
                }
            });
            let abort = task.abort_handle();

            Subscription::new(
                UnsubscribeLogic::Logic(Box::new(move || {
                    debug!("interval stopped");
                    abort.abort();
                })),
                SubscriptionHandle::JoinTask(task),
            )
        })
    }
}

/// Capability-based conversion into an `Observable`, used by
/// [`Observable::from`].
///
/// Awaitables are checked first ([`Awaitable`]), then text, which emits one
/// `char` at a time, then ordered collections, which emit their elements (or
/// `(key, value)` entries) in iteration order.
pub trait IntoObservable {
    type Item;

    fn into_observable(self) -> Observable<Self::Item>;
}

/// Marks a future as the awaitable input of [`Observable::from`].
///
/// The future must resolve to a `Result`; see [`Observable::from_future`].
pub struct Awaitable<F>(pub F);

impl<F, T, E> IntoObservable for Awaitable<F>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    E: Error + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn into_observable(self) -> Observable<T> {
        Observable::from_future(self.0)
    }
}

impl IntoObservable for &str {
    type Item = char;

    fn into_observable(self) -> Observable<char> {
        Observable::from_array(self.chars().collect())
    }
}

impl IntoObservable for String {
    type Item = char;

    fn into_observable(self) -> Observable<char> {
        self.as_str().into_observable()
    }
}

impl<T: Clone + Send + Sync + 'static> IntoObservable for Vec<T> {
    type Item = T;

    fn into_observable(self) -> Observable<T> {
        Observable::from_array(self)
    }
}

impl<T: Clone + Send + Sync + 'static, const N: usize> IntoObservable for [T; N] {
    type Item = T;

    fn into_observable(self) -> Observable<T> {
        Observable::from_array(Vec::from(self))
    }
}

impl<T: Clone + Send + Sync + 'static> IntoObservable for VecDeque<T> {
    type Item = T;

    fn into_observable(self) -> Observable<T> {
        Observable::from_array(self.into())
    }
}

impl<K, V> IntoObservable for BTreeMap<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Item = (K, V);

    fn into_observable(self) -> Observable<(K, V)> {
        Observable::from_array(self.into_iter().collect())
    }
}

impl<T: Clone + Send + Sync + 'static> IntoObservable for BTreeSet<T> {
    type Item = T;

    fn into_observable(self) -> Observable<T> {
        Observable::from_array(self.into_iter().collect())
    }
}

impl<T> IntoObservable for Range<T>
where
    T: 'static,
    Range<T>: Iterator<Item = T> + Clone + Send + Sync + 'static,
{
    type Item = T;

    fn into_observable(self) -> Observable<T> {
        Observable::from_iter(self)
    }
}

impl<T> IntoObservable for RangeInclusive<T>
where
    T: 'static,
    RangeInclusive<T>: Iterator<Item = T> + Clone + Send + Sync + 'static,
{
    type Item = T;

    fn into_observable(self) -> Observable<T> {
        Observable::from_iter(self)
    }
}

impl<T: 'static> IntoObservable for Observable<T> {
    type Item = T;

    fn into_observable(self) -> Observable<T> {
        self
    }
}
