use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::trace;

use super::Observable;
use crate::observer::Observer;
use crate::subscription::subscribe::{
    lock, Closer, Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
    Unsubscribeable,
};

struct ConcatState {
    // Index of the source currently being forwarded.
    index: usize,
    current: Option<Subscription>,
    // Closes the subscriber handed to the current source.
    current_source: Option<Closer>,
    closed: bool,
    finished: Option<oneshot::Sender<()>>,
}

/// One subscription's walk through the concatenated sources. Each source is
/// subscribed from inside the `complete` callback of the one before it.
struct ConcatChain<T> {
    sources: Arc<Vec<Mutex<Observable<T>>>>,
    downstream: Arc<Mutex<Subscriber<T>>>,
    state: Arc<Mutex<ConcatState>>,
}

impl<T> Clone for ConcatChain<T> {
    fn clone(&self) -> Self {
        ConcatChain {
            sources: Arc::clone(&self.sources),
            downstream: Arc::clone(&self.downstream),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> ConcatChain<T> {
    /// Resolves the handle returned to the subscriber of the whole chain.
    fn finish(&self) {
        if let Some(finished) = lock(&self.state).finished.take() {
            let _ = finished.send(());
        }
    }

    /// Ends the chain: the running source is stopped and no later source is
    /// subscribed.
    fn stop(&self) {
        let (current, source) = {
            let mut state = lock(&self.state);
            state.closed = true;
            (state.current.take(), state.current_source.take())
        };
        if let Some(source) = source {
            source.close();
        }
        if let Some(s) = current {
            s.unsubscribe();
        }
        self.finish();
    }
}

impl<T: 'static> ConcatChain<T> {
    fn subscribe_from(self, index: usize) {
        if index >= self.sources.len() {
            lock(&self.downstream).complete();
            self.finish();
            return;
        }
        {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.index = index;
        }
        trace!(index, "concat subscribing to next source");

        let chain_n = self.clone();
        let chain_e = self.clone();
        let next_link = self.clone();

        let u = Subscriber::new(
            move |v| {
                let closed = {
                    let mut o = lock(&chain_n.downstream);
                    o.next(v);
                    o.is_closed()
                };
                if closed {
                    chain_n.stop();
                }
            },
            move |observable_error| {
                lock(&chain_e.downstream).error(observable_error);
                chain_e.stop();
            },
            move || {
                next_link.clone().subscribe_from(index + 1);
            },
        );
        lock(&self.state).current_source = Some(u.closer());

        let subscription = lock(&self.sources[index]).subscribe(u);

        let mut state = lock(&self.state);
        if state.closed {
            drop(state);
            subscription.unsubscribe();
        } else if state.index == index {
            // Still running; a synchronous source would already have moved on.
            state.current = Some(subscription);
        }
    }
}

impl<T: 'static> Observable<T> {
    /// Emits everything from each of `sources` in order. A source is subscribed
    /// only after the previous one completes, so emissions never interleave.
    ///
    /// The result completes after the last source completes and errors as soon
    /// as any source errors. An empty list completes immediately. The returned
    /// `Subscription` can be joined; it resolves once the whole chain has
    /// completed, errored or been unsubscribed.
    pub fn concat_all(sources: Vec<Observable<T>>) -> Observable<T> {
        let sources: Arc<Vec<Mutex<Observable<T>>>> =
            Arc::new(sources.into_iter().map(Mutex::new).collect());

        Observable::new(move |o| {
            let (finished_tx, finished_rx) = oneshot::channel();
            let chain = ConcatChain {
                sources: Arc::clone(&sources),
                downstream: Arc::new(Mutex::new(o)),
                state: Arc::new(Mutex::new(ConcatState {
                    index: 0,
                    current: None,
                    current_source: None,
                    closed: false,
                    finished: Some(finished_tx),
                })),
            };
            let teardown = chain.clone();
            chain.subscribe_from(0);

            Subscription::new(
                UnsubscribeLogic::Logic(Box::new(move || teardown.stop())),
                SubscriptionHandle::Notify(finished_rx),
            )
        })
    }
}
