//! # cms-rs-signals
//!
//! Extension hooks for the CMS. A [`Hook`] is an ordered list of receivers
//! that all see the same payload. Depending on where it is fired, a hook is
//! used as a notification (results ignored), a filter (the first receiver
//! that answers wins) or a veto (every receiver must agree).
//!
//! The full set of hooks the rendering pipeline fires lives in
//! [`CmsHooks`]. It is an ordinary value owned by the application, so two
//! sites hosted in one process never see each other's receivers.
//!
//! ## Usage
//!
//! ```
//! use cms_rs_signals::Hook;
//! use std::sync::Arc;
//!
//! let hook: Hook<String, String> = Hook::new();
//!
//! hook.connect("shout", Arc::new(|text: &String| Some(text.to_uppercase())));
//! hook.connect("ignore", Arc::new(|_: &String| None));
//!
//! assert_eq!(hook.first(&"hello".to_string()).as_deref(), Some("HELLO"));
//! ```

pub mod events;

use std::sync::{Arc, RwLock};

pub use events::*;

/// The type signature for a hook receiver callback.
///
/// Receivers accept a reference to the hook payload and may answer with a
/// value. Receivers must be `Send + Sync` so that hooks can fire from any
/// request thread.
pub type HookReceiver<T, R> = Arc<dyn Fn(&T) -> Option<R> + Send + Sync>;

/// An ordered, multi-subscriber extension point.
///
/// Receivers are called in the order they were connected. The receiver list
/// is copied before dispatch, so a receiver may itself fire (or connect to)
/// the same hook without deadlocking.
pub struct Hook<T: 'static, R: 'static = ()> {
    receivers: RwLock<Vec<(String, HookReceiver<T, R>)>>,
}

impl<T: 'static, R: 'static> Default for Hook<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, R: 'static> std::fmt::Debug for Hook<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("receivers", &self.receiver_ids())
            .finish()
    }
}

impl<T: 'static, R: 'static> Hook<T, R> {
    /// Creates a hook with no connected receivers.
    pub fn new() -> Self {
        Self {
            receivers: RwLock::new(Vec::new()),
        }
    }

    /// Connects a receiver. A receiver already connected under the same ID
    /// is replaced in place, keeping its position.
    pub fn connect(&self, receiver_id: impl Into<String>, callback: HookReceiver<T, R>) {
        let id = receiver_id.into();
        let mut receivers = self.receivers.write().expect("hook lock poisoned");

        if let Some(entry) = receivers.iter_mut().find(|(rid, _)| *rid == id) {
            entry.1 = callback;
        } else {
            receivers.push((id, callback));
        }
    }

    /// Disconnects the receiver with the given ID.
    ///
    /// Returns `true` if a receiver was found and removed.
    pub fn disconnect(&self, receiver_id: &str) -> bool {
        let mut receivers = self.receivers.write().expect("hook lock poisoned");
        let len_before = receivers.len();
        receivers.retain(|(id, _)| id != receiver_id);
        receivers.len() < len_before
    }

    /// Calls every receiver in order and collects their answers.
    pub fn send(&self, payload: &T) -> Vec<Option<R>> {
        self.snapshot()
            .iter()
            .map(|callback| callback(payload))
            .collect()
    }

    /// Calls every receiver, ignoring answers.
    pub fn notify(&self, payload: &T) {
        for callback in self.snapshot() {
            callback(payload);
        }
    }

    /// Calls receivers in order until one answers, and returns that answer.
    /// Receivers after the first answer are not called.
    pub fn first(&self, payload: &T) -> Option<R> {
        self.snapshot().iter().find_map(|callback| callback(payload))
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.read().expect("hook lock poisoned").len()
    }

    pub fn receiver_ids(&self) -> Vec<String> {
        self.receivers
            .read()
            .expect("hook lock poisoned")
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn snapshot(&self) -> Vec<HookReceiver<T, R>> {
        self.receivers
            .read()
            .expect("hook lock poisoned")
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

impl<T: 'static> Hook<T, bool> {
    /// Veto semantics: returns `false` as soon as any receiver answers
    /// `Some(false)`. Receivers that answer `None` abstain.
    pub fn all_agree(&self, payload: &T) -> bool {
        self.snapshot()
            .iter()
            .all(|callback| callback(payload) != Some(false))
    }
}
