//! Request callbacks and the dispatcher that delivers them.
//!
//! A [`Callback`] receives three notifications per request: preload, loaded
//! (with the newly parsed articles only) and load-failed. The
//! [`CallbackDispatcher`] either runs them inline on the calling task or posts
//! them to a [`CallbackExecutor`], and in safe mode contains panics raised by
//! caller code.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::article::Article;
use crate::error::FeedError;

/// Receiver of request lifecycle notifications.
pub trait Callback: Send + Sync {
    fn on_preload(&self) {}

    fn on_loaded(&self, articles: &[Article]);

    fn on_load_failed(&self, error: &FeedError) {
        let _ = error;
    }
}

type PreloadFn = Box<dyn Fn() + Send + Sync>;
type LoadedFn = Box<dyn Fn(&[Article]) + Send + Sync>;
type FailedFn = Box<dyn Fn(&FeedError) + Send + Sync>;

/// Closure-backed [`Callback`]. Unset hooks do nothing.
///
/// ```ignore
/// let callback = FnCallback::new()
///     .on_loaded(|articles| println!("{} new", articles.len()))
///     .on_load_failed(|e| eprintln!("{e}"));
/// ```
#[derive(Default)]
pub struct FnCallback {
    preload: Option<PreloadFn>,
    loaded: Option<LoadedFn>,
    failed: Option<FailedFn>,
}

impl FnCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_preload(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.preload = Some(Box::new(f));
        self
    }

    pub fn on_loaded(mut self, f: impl Fn(&[Article]) + Send + Sync + 'static) -> Self {
        self.loaded = Some(Box::new(f));
        self
    }

    pub fn on_load_failed(mut self, f: impl Fn(&FeedError) + Send + Sync + 'static) -> Self {
        self.failed = Some(Box::new(f));
        self
    }

    pub fn into_arc(self) -> Arc<dyn Callback> {
        Arc::new(self)
    }
}

impl Callback for FnCallback {
    fn on_preload(&self) {
        if let Some(f) = &self.preload {
            f();
        }
    }

    fn on_loaded(&self, articles: &[Article]) {
        if let Some(f) = &self.loaded {
            f(articles);
        }
    }

    fn on_load_failed(&self, error: &FeedError) {
        if let Some(f) = &self.failed {
            f(error);
        }
    }
}

/// A unit of callback work posted to an executor.
pub type CallbackTask = Box<dyn FnOnce() + Send + 'static>;

/// An execution context callbacks can be marshaled onto.
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, task: CallbackTask);
}

/// Runs callbacks on the runtime's blocking pool, so slow callback code never
/// stalls the request worker.
///
/// The blocking pool has no caller to unwind into, so a panic here is always
/// contained, even in unsafe mode. It is logged at `error` once the blocking
/// task finishes.
impl CallbackExecutor for tokio::runtime::Handle {
    fn execute(&self, task: CallbackTask) {
        let join = self.spawn_blocking(task);
        self.spawn(async move {
            if let Err(e) = join.await {
                if e.is_panic() {
                    tracing::error!(
                        panic = %panic_message(&*e.into_panic()),
                        "Callback panicked on the blocking pool"
                    );
                }
            }
        });
    }
}

/// Hands callbacks to an application loop that drains the receiver, the usual
/// shape for delivering onto a UI thread.
impl CallbackExecutor for mpsc::UnboundedSender<CallbackTask> {
    fn execute(&self, task: CallbackTask) {
        if self.send(task).is_err() {
            tracing::warn!("Callback executor receiver dropped, notification discarded");
        }
    }
}

/// Delivers notifications for one request.
///
/// `safe` decides what happens when callback code panics: logged and swallowed
/// when true, propagated to whoever runs the task when false.
#[derive(Clone)]
pub struct CallbackDispatcher {
    executor: Option<Arc<dyn CallbackExecutor>>,
    safe: bool,
}

impl CallbackDispatcher {
    pub fn new(executor: Option<Arc<dyn CallbackExecutor>>, safe: bool) -> Self {
        Self { executor, safe }
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn preload(&self, callback: &Arc<dyn Callback>) {
        let callback = Arc::clone(callback);
        self.dispatch("on_preload", move || callback.on_preload());
    }

    pub fn loaded(&self, callback: &Arc<dyn Callback>, articles: Arc<[Article]>) {
        let callback = Arc::clone(callback);
        self.dispatch("on_loaded", move || callback.on_loaded(&articles));
    }

    pub fn load_failed(&self, callback: &Arc<dyn Callback>, error: Arc<FeedError>) {
        let callback = Arc::clone(callback);
        self.dispatch("on_load_failed", move || callback.on_load_failed(&error));
    }

    fn dispatch(&self, name: &'static str, call: impl FnOnce() + Send + 'static) {
        let safe = self.safe;
        let task = move || {
            if !safe {
                call();
                return;
            }
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(call)) {
                tracing::error!(
                    callback = name,
                    panic = %panic_message(&*payload),
                    "Caught panic in callback"
                );
            }
        };

        match &self.executor {
            Some(executor) => executor.execute(Box::new(task)),
            None => task(),
        }
    }
}

/// Human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<Box<dyn std::error::Error + Send>>() {
        e.to_string()
    } else {
        format!("Unknown panic: {:?}", (*payload).type_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<AtomicUsize>, Arc<dyn Callback>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let callback = FnCallback::new()
            .on_loaded(move |articles| {
                c.fetch_add(articles.len(), Ordering::SeqCst);
            })
            .into_arc();
        (count, callback)
    }

    fn panicking() -> Arc<dyn Callback> {
        FnCallback::new()
            .on_loaded(|_| panic!("callback exploded"))
            .into_arc()
    }

    #[test]
    fn test_inline_dispatch_runs_immediately() {
        let (count, callback) = counting();
        let dispatcher = CallbackDispatcher::new(None, true);
        let articles: Arc<[Article]> = vec![Article::default(), Article::default()].into();
        dispatcher.loaded(&callback, articles);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_safe_mode_swallows_panic() {
        let dispatcher = CallbackDispatcher::new(None, true);
        dispatcher.loaded(&panicking(), Vec::<Article>::new().into());
    }

    #[test]
    fn test_unsafe_mode_propagates_panic() {
        let dispatcher = CallbackDispatcher::new(None, false);
        let callback = panicking();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            dispatcher.loaded(&callback, Vec::<Article>::new().into());
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_channel_executor_defers_until_drained() {
        let (tx, mut rx) = mpsc::unbounded_channel::<CallbackTask>();
        let (count, callback) = counting();
        let dispatcher = CallbackDispatcher::new(Some(Arc::new(tx)), true);

        dispatcher.loaded(&callback, vec![Article::default()].into());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        while let Ok(task) = rx.try_recv() {
            task();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_notification_carries_error() {
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let s = Arc::clone(&seen);
        let callback = FnCallback::new()
            .on_load_failed(move |e| *s.lock().unwrap() = e.to_string())
            .into_arc();
        let dispatcher = CallbackDispatcher::new(None, true);
        dispatcher.load_failed(
            &callback,
            Arc::new(FeedError::InvalidRequest("empty URL".to_string())),
        );
        assert!(seen.lock().unwrap().contains("empty URL"));
    }

    #[tokio::test]
    async fn test_runtime_handle_executor() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let done_tx = std::sync::Mutex::new(Some(done_tx));
        let callback = FnCallback::new()
            .on_preload(move || {
                if let Some(tx) = done_tx.lock().unwrap().take() {
                    let _ = tx.send(std::thread::current().id());
                }
            })
            .into_arc();
        let handle: Arc<dyn CallbackExecutor> = Arc::new(tokio::runtime::Handle::current());
        let dispatcher = CallbackDispatcher::new(Some(handle), true);
        dispatcher.preload(&callback);
        let thread = done_rx.await.unwrap();
        assert_ne!(thread, std::thread::current().id());
    }

    #[tokio::test]
    async fn test_runtime_handle_contains_unsafe_panic() {
        let handle: Arc<dyn CallbackExecutor> = Arc::new(tokio::runtime::Handle::current());
        let dispatcher = CallbackDispatcher::new(Some(handle), false);
        dispatcher.loaded(&panicking(), Vec::<Article>::new().into());

        // The runtime and the executor keep working after the panic
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let callback = FnCallback::new()
            .on_loaded(move |articles| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(articles.len());
                }
            })
            .into_arc();
        dispatcher.loaded(&callback, vec![Article::default()].into());
        assert_eq!(rx.await.unwrap(), 1);
    }

    #[test]
    fn test_panic_message_payloads() {
        let text = panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(&*text), "static text");

        let formatted = panic::catch_unwind(|| panic!("page {}", 3)).unwrap_err();
        assert_eq!(panic_message(&*formatted), "page 3");

        let error: Box<dyn std::error::Error + Send> = Box::new(std::fmt::Error);
        let boxed = panic::catch_unwind(AssertUnwindSafe(|| panic::panic_any(error))).unwrap_err();
        assert_eq!(panic_message(&*boxed), std::fmt::Error.to_string());

        let other = panic::catch_unwind(|| panic::panic_any(42_u8)).unwrap_err();
        assert!(panic_message(&*other).starts_with("Unknown panic"));
    }
}
