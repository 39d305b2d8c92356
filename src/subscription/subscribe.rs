use std::{
    any::Any,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::JoinHandle as ThreadJoinHandle,
};

use tokio::runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::{errors::ErrorPayload, observer::Observer};

/// A trait for types that can be subscribed to, allowing consumers to receive
/// values pushed by a producer.
pub trait Subscribeable {
    /// The type of items emitted by the stream.
    type ObsType;

    /// Runs the producer with the given `Subscriber`.
    ///
    /// Every call starts an independent execution of the producer. The returned
    /// `Subscription` can be used to tear that execution down early or to await
    /// it when the producer runs on a Tokio task or an OS thread.
    fn subscribe(&mut self, s: Subscriber<Self::ObsType>) -> Subscription;
}

/// A trait for types that can be unsubscribed, releasing the resources held by
/// a running producer (timers, tasks, upstream subscriptions).
pub trait Unsubscribeable {
    /// Tears down the subscription. The value is consumed and cannot be used
    /// afterwards.
    fn unsubscribe(self);
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type CompleteFn = Box<dyn FnMut() + Send + Sync>;
type ErrorFn = Box<dyn FnMut(ErrorPayload) + Send + Sync>;

/// A closure-backed observer.
///
/// Users create a `Subscriber` with [`Subscriber::new`], passing `next`,
/// `error` and `complete` handlers, or with [`Subscriber::on_next`] and the
/// optional setters. Missing handlers behave as no-ops.
///
/// Once `error` or `complete` has been delivered the `Subscriber` is closed
/// and every later signal is dropped, so no producer can emit after a terminal
/// signal or deliver both terminal signals. An operator can also close the
/// `Subscriber` it hands to its source; producers check
/// [`is_closed`](Self::is_closed) and stop pushing.
pub struct Subscriber<NextFnType> {
    next_fn: NextFn<NextFnType>,
    complete_fn: Option<CompleteFn>,
    error_fn: Option<ErrorFn>,
    closed: Arc<AtomicBool>,
}

impl<NextFnType> Subscriber<NextFnType> {
    /// Creates a new `Subscriber` instance with custom handling functions for
    /// emitted values, errors, and completion.
    pub fn new(
        next_fn: impl FnMut(NextFnType) + 'static + Send,
        error_fn: impl FnMut(ErrorPayload) + 'static + Send + Sync,
        complete_fn: impl FnMut() + 'static + Send + Sync,
    ) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: Some(Box::new(complete_fn)),
            error_fn: Some(Box::new(error_fn)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a new Subscriber with the provided `next` function.
    ///
    /// The `error` and `complete` handlers start out as no-ops and can be set
    /// with [`on_error`](Self::on_error) and [`on_complete`](Self::on_complete).
    pub fn on_next(next_fn: impl FnMut(NextFnType) + 'static + Send) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: None,
            error_fn: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the completion function for the Subscriber.
    pub fn on_complete(&mut self, complete_fn: impl FnMut() + 'static + Send + Sync) {
        self.complete_fn = Some(Box::new(complete_fn));
    }

    /// Set the error-handling function for the Subscriber.
    pub fn on_error(&mut self, error_fn: impl FnMut(ErrorPayload) + 'static + Send + Sync) {
        self.error_fn = Some(Box::new(error_fn));
    }

    /// Returns `true` once `error` or `complete` has been delivered, or once
    /// the consumer has stopped listening.
    ///
    /// Producers that emit in a loop should check this between items.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns a handle that closes this `Subscriber` without delivering a
    /// terminal signal.
    pub(crate) fn closer(&self) -> Closer {
        Closer(Arc::clone(&self.closed))
    }

    fn close(&self) -> bool {
        self.closed.swap(true, Ordering::AcqRel)
    }
}

/// Closes a `Subscriber` from outside. Everything pushed into it afterwards
/// is dropped and its producer sees `is_closed`.
#[derive(Clone)]
pub(crate) struct Closer(Arc<AtomicBool>);

impl Closer {
    pub(crate) fn close(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl<T> Observer for Subscriber<T> {
    type NextFnType = T;

    fn next(&mut self, v: Self::NextFnType) {
        if self.is_closed() {
            return;
        }
        (self.next_fn)(v);
    }

    fn complete(&mut self) {
        if self.close() {
            return;
        }
        if let Some(cfn) = &mut self.complete_fn {
            (cfn)();
        }
    }

    fn error(&mut self, observable_error: ErrorPayload) {
        if self.close() {
            return;
        }
        if let Some(efn) = &mut self.error_fn {
            (efn)(observable_error);
        }
    }
}

/// Locks shared operator state, recovering the guard if a caught panic
/// poisoned the mutex.
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type AwaitResult<T> = Result<T, Box<dyn Any + Send>>;

/// Handle used to await a producer running on a Tokio task or an OS thread.
pub enum SubscriptionHandle {
    /// Nothing to await; the producer is synchronous or detached.
    Nil,

    /// Holds a join handle for a producer running on a Tokio task.
    JoinTask(JoinHandle<()>),

    /// Holds a join handle for a producer running on an OS thread.
    JoinThread(ThreadJoinHandle<()>),

    /// Resolves once the producer reports that it has finished. A dropped
    /// sender counts as finished.
    Notify(oneshot::Receiver<()>),
}

/// Represents one running execution of a producer.
///
/// `subscribe` returns a `Subscription`. Its unsubscribe logic is the producer's
/// teardown; operators chain their own teardown in front of the upstream one,
/// so unsubscribing at the end of a pipeline stops the source as well.
pub struct Subscription {
    pub(crate) unsubscribe_logic: UnsubscribeLogic,
    pub(crate) subscription_future: SubscriptionHandle,
    pub(crate) runtime_handle: Result<runtime::Handle, runtime::TryCurrentError>,
}

impl Subscription {
    /// Creates a new `Subscription` with the specified unsubscribe logic and
    /// subscription handle.
    #[must_use]
    pub fn new(
        unsubscribe_logic: UnsubscribeLogic,
        subscription_future: SubscriptionHandle,
    ) -> Self {
        let runtime_handle = tokio::runtime::Handle::try_current();
        Subscription {
            unsubscribe_logic,
            subscription_future,
            runtime_handle,
        }
    }

    /// A subscription with no teardown and nothing to await.
    #[must_use]
    pub fn empty() -> Self {
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    }

    /// Takes the join handle out of this subscription, leaving `Nil` behind.
    ///
    /// Operators use it to hand the upstream handle to the subscription they
    /// return while keeping the upstream teardown for themselves.
    pub(crate) fn take_handle(&mut self) -> SubscriptionHandle {
        std::mem::replace(&mut self.subscription_future, SubscriptionHandle::Nil)
    }

    /// Awaits the Tokio task or OS thread driving this subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the task panicked or was cancelled, or if joining
    /// the thread failed.
    pub async fn join_concurrent(self) -> AwaitResult<()> {
        match self.subscription_future {
            SubscriptionHandle::JoinTask(task_handle) => task_handle
                .await
                .map_err(|e| Box::new(e) as Box<dyn Any + Send>),
            SubscriptionHandle::JoinThread(thread_handle) => thread_handle.join(),
            SubscriptionHandle::Notify(finished) => {
                let _ = finished.await;
                Ok(())
            }
            SubscriptionHandle::Nil => Ok(()),
        }
    }

    /// Blocks until the OS thread driving this subscription finishes, or
    /// until a `Notify` handle resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if joining the thread fails.
    ///
    /// # Panics
    ///
    /// Panics if the subscription is driven by a Tokio task; use
    /// `join_concurrent().await` for those. A `Notify` handle also panics when
    /// joined from inside an asynchronous context.
    pub fn join(self) -> AwaitResult<()> {
        match self.subscription_future {
            SubscriptionHandle::JoinThread(thread_handle) => thread_handle.join(),
            SubscriptionHandle::Notify(finished) => {
                let _ = finished.blocking_recv();
                Ok(())
            }
            SubscriptionHandle::Nil => Ok(()),
            SubscriptionHandle::JoinTask(_) => {
                panic!("Handle should be OS thread handle but it is Tokio task handle instead. When working with Tokio, use `join_concurrent().await` to await the completion of observables.")
            }
        }
    }
}

impl Unsubscribeable for Subscription {
    fn unsubscribe(self) {
        trace!("unsubscribe");
        self.unsubscribe_logic.unsubscribe(self.runtime_handle);
    }
}

/// Enumerates the teardown strategies of a subscription.
pub enum UnsubscribeLogic {
    /// No teardown.
    Nil,

    /// Unsubscribes the wrapped upstream subscription.
    ///
    /// For custom producers built with `Observable::new` that subscribe to
    /// another observable and hand its teardown on unchanged.
    Wrapped(Box<Subscription>),

    /// Teardown defined by a function.
    Logic(Box<dyn FnOnce() + Send>),

    /// Asynchronous teardown, spawned on the runtime the subscription was
    /// created in, or driven to completion on the calling thread when there
    /// is none.
    ///
    /// For custom producers whose cleanup has to await, such as closing a
    /// connection.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

impl UnsubscribeLogic {
    fn unsubscribe(self, runtime_handle: Result<runtime::Handle, runtime::TryCurrentError>) {
        match self {
            UnsubscribeLogic::Nil => (),
            UnsubscribeLogic::Logic(fnc) => fnc(),
            UnsubscribeLogic::Wrapped(subscription) => subscription.unsubscribe(),
            UnsubscribeLogic::Future(future) => match runtime_handle {
                Ok(handle) => {
                    handle.spawn(future);
                }
                Err(_) => {
                    // Outside of a runtime the future can still be driven to
                    // completion on the current thread.
                    futures::executor::block_on(future);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::errors::ObservableError;

    fn counting_subscriber() -> (Subscriber<i32>, Arc<Mutex<(Vec<i32>, usize, usize)>>) {
        let seen = Arc::new(Mutex::new((Vec::new(), 0, 0)));
        let (sn, se, sc) = (Arc::clone(&seen), Arc::clone(&seen), Arc::clone(&seen));
        let s = Subscriber::new(
            move |v| sn.lock().unwrap().0.push(v),
            move |_| se.lock().unwrap().1 += 1,
            move || sc.lock().unwrap().2 += 1,
        );
        (s, seen)
    }

    #[test]
    fn nothing_is_delivered_after_complete() {
        let (mut s, seen) = counting_subscriber();

        s.next(1);
        s.complete();
        s.next(2);
        s.error(ObservableError::NoRuntime.into_payload());
        s.complete();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.0, vec![1]);
        assert_eq!(seen.1, 0);
        assert_eq!(seen.2, 1);
    }

    #[test]
    fn error_swallows_trailing_complete() {
        let (mut s, seen) = counting_subscriber();

        s.error(ObservableError::NoRuntime.into_payload());
        s.complete();
        s.next(3);

        let seen = seen.lock().unwrap();
        assert!(seen.0.is_empty());
        assert_eq!(seen.1, 1);
        assert_eq!(seen.2, 0);
        drop(seen);
        assert!(s.is_closed());
    }

    #[test]
    fn on_next_defaults_to_no_op_terminals() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let values_c = Arc::clone(&values);
        let mut s = Subscriber::on_next(move |v: i32| values_c.lock().unwrap().push(v));

        s.next(7);
        s.error(ObservableError::InvalidPeriod.into_payload());
        s.next(8);

        assert_eq!(*values.lock().unwrap(), vec![7]);
    }

    #[test]
    fn logic_teardown_runs_once_on_unsubscribe() {
        let calls = Arc::new(Mutex::new(0));
        let calls_c = Arc::clone(&calls);
        let inner = Subscription::new(
            UnsubscribeLogic::Logic(Box::new(move || *calls_c.lock().unwrap() += 1)),
            SubscriptionHandle::Nil,
        );
        let outer = Subscription::new(
            UnsubscribeLogic::Wrapped(Box::new(inner)),
            SubscriptionHandle::Nil,
        );

        outer.unsubscribe();

        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn future_teardown_runs_without_runtime() {
        let done = Arc::new(Mutex::new(false));
        let done_c = Arc::clone(&done);
        let s = Subscription::new(
            UnsubscribeLogic::Future(Box::pin(async move {
                *done_c.lock().unwrap() = true;
            })),
            SubscriptionHandle::Nil,
        );

        s.unsubscribe();

        assert!(*done.lock().unwrap());
    }

    #[test]
    fn closer_closes_without_terminal_signal() {
        let (mut s, seen) = counting_subscriber();
        let closer = s.closer();

        s.next(1);
        closer.close();
        s.next(2);
        s.complete();

        assert!(s.is_closed());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.0, vec![1]);
        assert_eq!(seen.2, 0);
    }

    #[test]
    fn notify_handle_joins_after_send() {
        let (tx, rx) = oneshot::channel();
        let s = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Notify(rx));

        let sender = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            let _ = tx.send(());
        });

        assert!(s.join().is_ok());
        sender.join().unwrap();
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let m = Arc::new(Mutex::new(5));
        let m_c = Arc::clone(&m);
        let _ = std::thread::spawn(move || {
            let _g = m_c.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(m.is_poisoned());
        assert_eq!(*lock(&m), 5);
    }
}
