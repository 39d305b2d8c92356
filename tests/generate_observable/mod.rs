use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rxmini::{
    subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic},
    Observable, Observer,
};

/// An observable that emits `0..=end` from an OS thread, one value per
/// millisecond, and stops early when unsubscribed. `last_emit_assert` receives
/// the last value emitted before the thread finished.
pub fn generate_u32_observable(
    end: u32,
    last_emit_assert: impl FnMut(u32) + Send + Sync + 'static,
) -> Observable<u32> {
    let last_emit_assert = Arc::new(Mutex::new(last_emit_assert));

    Observable::new(move |mut o: Subscriber<_>| {
        let done = Arc::new(Mutex::new(false));
        let done_c = Arc::clone(&done);

        let last_emit_assert = Arc::clone(&last_emit_assert);
        let jh = std::thread::spawn(move || {
            let mut last_emit = 0;

            for i in 0..=end {
                if *done.lock().unwrap() {
                    break;
                }
                last_emit = i;
                o.next(i);
                // Give the unsubscribe signal a chance to land between emits.
                std::thread::sleep(Duration::from_millis(1));
            }
            o.complete();
            last_emit_assert.lock().unwrap()(last_emit);
        });

        Subscription::new(
            UnsubscribeLogic::Logic(Box::new(move || {
                *done_c.lock().unwrap() = true;
            })),
            SubscriptionHandle::JoinThread(jh),
        )
    })
}
