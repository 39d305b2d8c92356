//! The `observable` module provides `Observable`, a lazy push-based stream, and
//! the operators that transform one observable into another.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
};

use tracing::{trace, warn};

use crate::errors::{ErrorPayload, ObservableError};
use crate::observer::Observer;
use crate::subscription::subscribe::{
    lock, Closer, Subscribeable, Subscriber, Subscription, UnsubscribeLogic, Unsubscribeable,
};

mod concat;
pub mod creation;

pub use creation::{Awaitable, IntoObservable};

/// The `Observable` struct represents a source of values that can be observed
/// and transformed.
///
/// An `Observable` owns exactly one producer: a closure that receives a
/// `Subscriber`, pushes values into it and returns a `Subscription`. Nothing
/// runs when the `Observable` is built; every call to `subscribe` runs the
/// producer again from the start, so two subscribers never share state.
///
/// # Example: basic synchronous `Observable`
///
/// ```no_run
/// use rxmini::subscribe::{Subscriber, Subscription};
/// use rxmini::{Observable, ObservableExt, Observer, Subscribeable};
///
/// // Create a custom observable that emits values from 1 to 10.
/// let emit_10_observable = Observable::new(|mut subscriber| {
///     for i in 1..=10 {
///         subscriber.next(i);
///     }
///     subscriber.complete();
///
///     // Nothing to tear down.
///     Subscription::empty()
/// });
///
/// let observer = Subscriber::new(
///     |v| println!("Emitted {}", v),
///     |e| eprintln!("Error {}", e),
///     || println!("Completed"),
/// );
///
/// // Observables are cold: without this call nothing is emitted.
/// emit_10_observable
///     .filter(|v| v % 2 == 0)
///     .map(|v| format!("Mapped {}", v))
///     .subscribe(observer);
/// ```
///
/// # Example: asynchronous `Observable` with `Tokio`
///
/// ```no_run
/// use std::time::Duration;
///
/// use rxmini::{subscribe::Subscriber, Observable, ObservableExt, Subscribeable};
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// runtime.block_on(async {
///     let subscription = Observable::interval(Duration::from_millis(100))
///         // `take` unsubscribes the interval after three ticks.
///         .take(3)
///         .map(|v| v + 1)
///         .subscribe(Subscriber::new(
///             |v| println!("Tick {}", v),
///             |e| eprintln!("{}", e),
///             || println!("Completed"),
///         ));
///
///     // Wait for the interval task. It is aborted by `take`, so an error
///     // here only means the task was cancelled.
///     let _ = subscription.join_concurrent().await;
/// });
/// ```
pub struct Observable<T> {
    subscribe_fn: Box<dyn FnMut(Subscriber<T>) -> Subscription + Send + Sync>,
}

impl<T> Observable<T> {
    /// Creates a new `Observable` with the provided producer.
    ///
    /// The producer runs once per `subscribe` call. It should push values into
    /// the `Subscriber` and return a `Subscription` carrying its teardown, if it
    /// has one.
    pub fn new(sf: impl FnMut(Subscriber<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Observable {
            subscribe_fn: Box::new(sf),
        }
    }
}

/// Runs a user callback inside a failure boundary. A panic is turned into an
/// `ObservableError::CallbackPanicked` payload.
pub(crate) fn guarded<R>(operator: &'static str, f: impl FnOnce() -> R) -> Result<R, ErrorPayload> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
        warn!(operator, "callback panicked, signalling error downstream");
        ObservableError::from_panic(operator, panic.as_ref()).into_payload()
    })
}

/// The upstream subscription of an operator, shared between the callbacks it
/// registers upstream and the `Subscription` it hands downstream.
///
/// A synchronous source emits from inside `subscribe`, before there is a
/// `Subscription` to unsubscribe. `stop` therefore also closes the
/// `Subscriber` the source pushes into, so its emit loop ends, and `attach`
/// tears down a subscription that arrives after the stop.
#[derive(Clone)]
pub(crate) struct Upstream(Arc<Mutex<UpstreamState>>);

struct UpstreamState {
    subscription: Option<Subscription>,
    source: Option<Closer>,
    stopped: bool,
}

impl Upstream {
    pub(crate) fn new() -> Self {
        Upstream(Arc::new(Mutex::new(UpstreamState {
            subscription: None,
            source: None,
            stopped: false,
        })))
    }

    pub(crate) fn is_stopped(&self) -> bool {
        lock(&self.0).stopped
    }

    /// Stops the upstream producer, now if it is attached or as soon as it is.
    pub(crate) fn stop(&self) {
        let (subscription, source) = {
            let mut state = lock(&self.0);
            state.stopped = true;
            (state.subscription.take(), state.source.clone())
        };
        if let Some(source) = source {
            source.close();
        }
        if let Some(s) = subscription {
            s.unsubscribe();
        }
    }

    /// Remembers the `Subscriber` handed to the source so `stop` can close it.
    pub(crate) fn watch<T>(&self, source: &Subscriber<T>) {
        let closer = source.closer();
        let mut state = lock(&self.0);
        if state.stopped {
            closer.close();
        }
        state.source = Some(closer);
    }

    /// Subscribes `u` to `source` and returns the `Subscription` to hand
    /// downstream.
    pub(crate) fn connect<S>(self, source: &mut S, u: Subscriber<S::ObsType>) -> Subscription
    where
        S: Subscribeable,
    {
        self.watch(&u);
        let subscription = source.subscribe(u);
        self.attach(subscription)
    }

    /// Pushes `v` into `o` and stops the source once `o` no longer accepts
    /// values, so a closed consumer further down also ends a synchronous
    /// source.
    pub(crate) fn forward<T>(&self, o: &Mutex<Subscriber<T>>, v: T) {
        let closed = {
            let mut o = lock(o);
            o.next(v);
            o.is_closed()
        };
        if closed {
            self.stop();
        }
    }

    /// Stores the upstream subscription and returns the one to hand
    /// downstream. Its teardown stops the upstream producer.
    pub(crate) fn attach(self, mut upstream: Subscription) -> Subscription {
        let handle = upstream.take_handle();
        let mut state = lock(&self.0);
        if state.stopped {
            drop(state);
            upstream.unsubscribe();
        } else {
            state.subscription = Some(upstream);
            drop(state);
        }
        Subscription::new(
            UnsubscribeLogic::Logic(Box::new(move || self.stop())),
            handle,
        )
    }
}

/// The `ObservableExt` trait provides the operators that can be chained onto
/// any observable.
///
/// Each operator returns a new `Observable` whose producer subscribes to the
/// source and forwards `error` and `complete` unchanged unless documented
/// otherwise. User callbacks run inside a failure boundary: a panic becomes an
/// error signal for the downstream observer and the source is unsubscribed.
pub trait ObservableExt<T: 'static>: Subscribeable<ObsType = T> {
    /// Transforms the items emitted by the observable using a transformation
    /// function.
    fn map<U, F>(mut self, f: F) -> Observable<U>
    where
        Self: Sized + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
        U: 'static,
    {
        let f = Arc::new(f);
        Observable::new(move |o| {
            let f = Arc::clone(&f);
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let upstream = Upstream::new();
            let upstream_n = upstream.clone();

            let u = Subscriber::new(
                move |v| {
                    if upstream_n.is_stopped() {
                        return;
                    }
                    match guarded("map", || (*f)(v)) {
                        Ok(t) => upstream_n.forward(&o_shared, t),
                        Err(e) => {
                            lock(&o_shared).error(e);
                            upstream_n.stop();
                        }
                    }
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            );
            upstream.connect(&mut self, u)
        })
    }

    /// Replaces every item emitted by the observable with a clone of `value`.
    fn map_to<U>(self, value: U) -> Observable<U>
    where
        Self: Sized + Send + Sync + 'static,
        U: Clone + Send + Sync + 'static,
    {
        self.map(move |_| value.clone())
    }

    /// Filters the items emitted by the observable based on a predicate
    /// function.
    ///
    /// Only items for which the predicate returns `true` are emitted; the
    /// source keeps running when an item is rejected.
    fn filter<P>(mut self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Observable::new(move |o| {
            let predicate = Arc::clone(&predicate);
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let upstream = Upstream::new();
            let upstream_n = upstream.clone();

            let u = Subscriber::new(
                move |v| {
                    if upstream_n.is_stopped() {
                        return;
                    }
                    match guarded("filter", || (*predicate)(&v)) {
                        Ok(true) => upstream_n.forward(&o_shared, v),
                        Ok(false) => {
                            if lock(&o_shared).is_closed() {
                                upstream_n.stop();
                            }
                        }
                        Err(e) => {
                            lock(&o_shared).error(e);
                            upstream_n.stop();
                        }
                    }
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            );
            upstream.connect(&mut self, u)
        })
    }

    /// Runs side effects for each signal before forwarding it unchanged.
    ///
    /// All three callbacks are optional; pass `None::<fn(&_)>` or `None::<fn()>`
    /// for the ones you do not need. A panicking callback replaces the signal it
    /// was observing with an error.
    fn tap<N, E, C>(
        mut self,
        on_next: Option<N>,
        on_error: Option<E>,
        on_complete: Option<C>,
    ) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        N: Fn(&T) + Send + Sync + 'static,
        E: Fn(&ErrorPayload) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        let on_next = on_next.map(Arc::new);
        let on_error = on_error.map(Arc::new);
        let on_complete = on_complete.map(Arc::new);

        Observable::new(move |o| {
            let on_next = on_next.clone();
            let on_error = on_error.clone();
            let on_complete = on_complete.clone();

            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let upstream = Upstream::new();
            let upstream_n = upstream.clone();
            let upstream_c = upstream.clone();

            let u = Subscriber::new(
                move |v| {
                    if upstream_n.is_stopped() {
                        return;
                    }
                    if let Some(f) = &on_next {
                        if let Err(e) = guarded("tap", || (**f)(&v)) {
                            lock(&o_shared).error(e);
                            upstream_n.stop();
                            return;
                        }
                    }
                    upstream_n.forward(&o_shared, v);
                },
                move |observable_error| {
                    let forwarded = match &on_error {
                        Some(f) => guarded("tap", || (**f)(&observable_error))
                            .err()
                            .unwrap_or(observable_error),
                        None => observable_error,
                    };
                    lock(&o_cloned_e).error(forwarded);
                },
                move || {
                    if let Some(f) = &on_complete {
                        if let Err(e) = guarded("tap", || (**f)()) {
                            lock(&o_cloned_c).error(e);
                            upstream_c.stop();
                            return;
                        }
                    }
                    lock(&o_cloned_c).complete();
                },
            );
            upstream.connect(&mut self, u)
        })
    }

    /// Shorthand for [`tap`](Self::tap) with only a `next` side effect.
    fn tap_next<N>(self, on_next: N) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        N: Fn(&T) + Send + Sync + 'static,
    {
        self.tap(Some(on_next), None::<fn(&ErrorPayload)>, None::<fn()>)
    }

    /// Emits at most the first `n` items emitted by the observable, then
    /// completes and unsubscribes from the source.
    ///
    /// `take(0)` completes immediately without subscribing to the source.
    fn take(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |mut o: Subscriber<T>| {
            if n == 0 {
                o.complete();
                return Subscription::empty();
            }

            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let upstream = Upstream::new();
            let upstream_n = upstream.clone();

            let mut taken = 0;
            let u = Subscriber::new(
                move |v| {
                    if taken >= n {
                        return;
                    }
                    taken += 1;

                    if taken < n {
                        upstream_n.forward(&o_shared, v);
                        return;
                    }
                    let mut o = lock(&o_shared);
                    o.next(v);
                    o.complete();
                    drop(o);
                    trace!(count = n, "take reached its count");
                    upstream_n.stop();
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            );
            upstream.connect(&mut self, u)
        })
    }

    /// Emits only the first item, then completes.
    ///
    /// An empty source completes without emitting.
    fn first(self) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        self.take(1)
    }

    /// Emits only the first item that satisfies `predicate`, then completes.
    ///
    /// If no item matches, the result completes with the source and emits
    /// nothing.
    fn first_where<P>(self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter(predicate).take(1)
    }

    /// Skips the first `n` items emitted by the observable and then emits the rest.
    ///
    /// If `n` is greater than or equal to the total number of items, it behaves as
    /// if the observable is complete and emits no items.
    fn skip(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let upstream = Upstream::new();
            let upstream_n = upstream.clone();

            let mut n = n;
            let u = Subscriber::new(
                move |v| {
                    if n > 0 {
                        n -= 1;
                        return;
                    }
                    upstream_n.forward(&o_shared, v);
                },
                move |observable_error| {
                    lock(&o_cloned_e).error(observable_error);
                },
                move || {
                    lock(&o_cloned_c).complete();
                },
            );
            upstream.connect(&mut self, u)
        })
    }

    /// Emits `values` in order, then subscribes to the source and forwards
    /// everything it emits.
    fn start_with(mut self, values: Vec<T>) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync,
    {
        Observable::new(move |mut o: Subscriber<T>| {
            for v in &values {
                if o.is_closed() {
                    return Subscription::empty();
                }
                o.next(v.clone());
            }
            if o.is_closed() {
                return Subscription::empty();
            }
            self.subscribe(o)
        })
    }

    /// Emits everything from this observable, then everything from each of
    /// `sources` in order, subscribing to the next one only when the previous
    /// one completes. An error from any of them ends the whole sequence.
    fn concat(mut self, sources: Vec<Observable<T>>) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        let head = Observable::new(move |s| self.subscribe(s));
        Observable::concat_all(std::iter::once(head).chain(sources).collect())
    }
}

impl<T: 'static> Subscribeable for Observable<T> {
    type ObsType = T;

    fn subscribe(&mut self, v: Subscriber<Self::ObsType>) -> Subscription {
        trace!("subscribe");
        (self.subscribe_fn)(v)
    }
}

impl<O, T: 'static> ObservableExt<T> for O where O: Subscribeable<ObsType = T> {}
