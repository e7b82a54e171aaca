//! Key State: the logical open/closed state of the key, with a callback
//! fired on transition rather than a C-style function-pointer trampoline.

/// Registered on a [`KeyState`]; invoked with the new state exactly when it
/// changes. Must be short and non-blocking — it may run from the
/// generator's worker thread.
pub type KeyingCallback = Box<dyn FnMut(bool) + Send>;

pub struct KeyState {
    closed: bool,
    callback: Option<KeyingCallback>,
}

impl Default for KeyState {
    fn default() -> Self {
        KeyState { closed: false, callback: None }
    }
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Installs the keying callback. Passing `None` disables notifications.
    pub fn set_callback(&mut self, callback: Option<KeyingCallback>) {
        self.callback = callback;
    }

    /// Sets the logical key state, invoking the callback iff it actually
    /// changed.
    pub fn set_closed(&mut self, closed: bool) {
        if closed == self.closed {
            return;
        }
        self.closed = closed;
        if let Some(cb) = self.callback.as_mut() {
            cb(closed);
        }
    }
}

impl std::fmt::Debug for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyState")
            .field("closed", &self.closed)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn callback_fires_only_on_change() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let mut ks = KeyState::new();
        ks.set_callback(Some(Box::new(move |closed| log2.lock().unwrap().push(closed))));

        ks.set_closed(false); // no-op, already open
        assert!(log.lock().unwrap().is_empty());

        ks.set_closed(true);
        ks.set_closed(true); // no-op, already closed
        ks.set_closed(false);

        assert_eq!(*log.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn no_callback_does_not_panic() {
        let mut ks = KeyState::new();
        ks.set_closed(true);
        assert!(ks.is_closed());
    }
}
