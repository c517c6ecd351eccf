use parking_lot::Mutex;
use std::sync::Arc;

/// State shared between the HTTP handlers and the poll loop.
/// Guards are never held across an `.await`.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
