use std::sync::{Arc, Mutex};

use rxmini::subscribe::Subscriber;

/// Everything a registered subscriber saw.
pub struct Emissions<T> {
    pub nexts: Arc<Mutex<Vec<T>>>,
    pub completes: Arc<Mutex<u32>>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl<T: Clone> Emissions<T> {
    pub fn nexts(&self) -> Vec<T> {
        self.nexts.lock().unwrap().clone()
    }

    pub fn completes(&self) -> u32 {
        *self.completes.lock().unwrap()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

/// Returns a factory of subscribers that all record into the same buffers.
pub fn register_emissions_subscriber<T: Send + 'static>(
) -> (impl Fn() -> Subscriber<T>, Emissions<T>) {
    let nexts = Arc::new(Mutex::new(Vec::with_capacity(5)));
    let completes = Arc::new(Mutex::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let emissions = Emissions {
        nexts: Arc::clone(&nexts),
        completes: Arc::clone(&completes),
        errors: Arc::clone(&errors),
    };

    let make_subscriber = move || {
        let nexts_c = Arc::clone(&nexts);
        let completes_c = Arc::clone(&completes);
        let errors_c = Arc::clone(&errors);

        Subscriber::new(
            move |n| {
                // Track next() calls.
                nexts_c.lock().unwrap().push(n);
            },
            move |e| {
                // Track error() calls.
                errors_c.lock().unwrap().push(e.to_string());
            },
            move || {
                // Track complete() calls.
                *completes_c.lock().unwrap() += 1;
            },
        )
    };
    (make_subscriber, emissions)
}
