//! Completion callbacks
//!
//! A callback is either a method bound to a receiver or a plain closure.
//! Both shapes are resolved once, when the operation completes, into an
//! [`Invocable`] taking the whole payload as its single argument. A result
//! set is delivered as one `Vec`, never spread over several arguments.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

/// Uniform form every callback is resolved into
pub type Invocable<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Action bound to a receiver
trait BoundAction<T>: Send {
    fn receiver(&self) -> &'static str;

    fn invoke(self: Box<Self>, payload: T);
}

struct Method<R, T> {
    target: Arc<R>,
    action: Box<dyn FnOnce(&R, T) + Send>,
}

impl<R, T> BoundAction<T> for Method<R, T>
where
    R: Send + Sync + 'static,
{
    fn receiver(&self) -> &'static str {
        type_name::<R>()
    }

    fn invoke(self: Box<Self>, payload: T) {
        (self.action)(&self.target, payload)
    }
}

/// Receiver plus the action to run on it
pub struct BoundMethod<T> {
    inner: Box<dyn BoundAction<T>>,
}

/// Completion handler for one operation
pub enum Callback<T> {
    /// `action` runs with `target` as its receiver
    Bound(BoundMethod<T>),
    /// Free-standing closure
    Plain(Invocable<T>),
}

impl<T: Send + 'static> Callback<T> {
    /// Bind `action` to `target`
    pub fn bound<R>(target: Arc<R>, action: fn(&R, T)) -> Self
    where
        R: Send + Sync + 'static,
    {
        Callback::Bound(BoundMethod {
            inner: Box::new(Method {
                target,
                action: Box::new(move |receiver: &R, payload| action(receiver, payload)),
            }),
        })
    }

    /// Bind `action` to `target`, passing `extra` ahead of the payload
    pub fn bound_with<R, E>(target: Arc<R>, action: fn(&R, E, T), extra: E) -> Self
    where
        R: Send + Sync + 'static,
        E: Send + 'static,
    {
        Callback::Bound(BoundMethod {
            inner: Box::new(Method {
                target,
                action: Box::new(move |receiver: &R, payload| action(receiver, extra, payload)),
            }),
        })
    }

    pub fn plain(f: impl FnOnce(T) + Send + 'static) -> Self {
        Callback::Plain(Box::new(f))
    }

    /// Receiver type name for bound callbacks
    pub fn receiver(&self) -> Option<&'static str> {
        match self {
            Callback::Bound(bound) => Some(bound.inner.receiver()),
            Callback::Plain(_) => None,
        }
    }

    /// Resolve into the uniform invocable form
    pub fn into_invocable(self) -> Invocable<T> {
        match self {
            Callback::Bound(bound) => Box::new(move |payload| bound.inner.invoke(payload)),
            Callback::Plain(f) => f,
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Bound(bound) => write!(f, "Callback::Bound({})", bound.inner.receiver()),
            Callback::Plain(_) => f.write_str("Callback::Plain"),
        }
    }
}

/// Deliver `payload` to `callback`, if one was registered
///
/// Returns whether a callback ran.
pub fn dispatch<T: Send + 'static>(callback: Option<Callback<T>>, payload: T, what: &str) -> bool {
    match callback {
        Some(callback) => {
            debug!(receiver = ?callback.receiver(), "dispatching {} callback", what);
            (callback.into_invocable())(payload);
            true
        }
        None => {
            debug!("no {} callback registered", what);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Listener {
        seen: Mutex<Vec<String>>,
    }

    impl Listener {
        fn on_items(&self, items: Vec<u32>) {
            self.seen.lock().unwrap().push(format!("{} items", items.len()));
        }

        fn on_tagged(&self, tag: &'static str, items: Vec<u32>) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", tag, items.len()));
        }
    }

    #[test]
    fn test_bound_callback_runs_on_receiver() {
        let listener = Arc::new(Listener::default());
        let cb = Callback::bound(Arc::clone(&listener), Listener::on_items);
        assert!(cb.receiver().unwrap().ends_with("Listener"));

        assert!(dispatch(Some(cb), vec![1, 2, 3], "success"));
        // The whole sequence arrives as one argument
        assert_eq!(*listener.seen.lock().unwrap(), vec!["3 items".to_string()]);
    }

    #[test]
    fn test_bound_with_extra_argument() {
        let listener = Arc::new(Listener::default());
        let cb = Callback::bound_with(Arc::clone(&listener), Listener::on_tagged, "users");
        (cb.into_invocable())(vec![7]);
        assert_eq!(*listener.seen.lock().unwrap(), vec!["users:1".to_string()]);
    }

    #[test]
    fn test_plain_callback() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let cb: Callback<Vec<u32>> = Callback::plain(move |items| {
            *sink.lock().unwrap() = Some(items);
        });
        assert!(cb.receiver().is_none());
        dispatch(Some(cb), vec![4, 5], "success");
        assert_eq!(*seen.lock().unwrap(), Some(vec![4, 5]));
    }

    #[test]
    fn test_dispatch_without_callback() {
        assert!(!dispatch::<()>(None, (), "error"));
    }
}
