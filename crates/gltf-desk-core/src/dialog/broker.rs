//! DialogBroker - the only path from a worker thread to a native dialog.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Mutex;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use super::request::DialogPrompt;
use crate::config::BrokerConfig;
use crate::model::ModelFile;

/// Native dialog capability, implemented by the UI layer.
///
/// Methods are only ever called on the UI thread, from [`DialogBroker::tick`].
pub trait FilePicker {
    /// Show a file-selection dialog. `None` when the user cancels.
    fn pick_file(&self, prompt: &DialogPrompt) -> Option<PathBuf>;

    /// Ask the user whether to continue with a very large file.
    fn confirm_large_file(&self, path: &Path, size_bytes: u64) -> bool;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogError {
    /// No UI thread is draining the queue.
    #[error("Desktop app not available")]
    Unavailable,
}

/// What a single UI tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Queue was empty.
    Idle,
    /// A dialog is already being serviced (re-entrant tick).
    Busy,
    /// The head request's requester had already given up; no dialog shown.
    Expired,
    /// A dialog was shown and its request resolved.
    Serviced { selected: bool },
}

struct PendingDialog {
    id: Uuid,
    prompt: DialogPrompt,
    deadline: Instant,
    slot: SyncSender<Option<ModelFile>>,
}

/// Single-consumer FIFO of dialog requests.
///
/// Producers call [`request_dialog`](Self::request_dialog) from any thread;
/// the UI thread calls [`tick`](Self::tick) periodically and services at most
/// one request per tick.
pub struct DialogBroker {
    queue: Mutex<VecDeque<PendingDialog>>,
    servicing: AtomicBool,
    consumer_attached: AtomicBool,
    config: BrokerConfig,
}

impl DialogBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            servicing: AtomicBool::new(false),
            consumer_attached: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Declare that a UI thread is now ticking this broker.
    pub fn attach_consumer(&self) {
        self.consumer_attached.store(true, Ordering::SeqCst);
    }

    /// Declare that the UI thread stopped ticking. Pending requests resolve
    /// to "no file" immediately.
    pub fn detach_consumer(&self) {
        self.consumer_attached.store(false, Ordering::SeqCst);
        let drained: Vec<_> = self.queue.lock().unwrap().drain(..).collect();
        for pending in drained {
            let _ = pending.slot.try_send(None);
        }
    }

    pub fn is_available(&self) -> bool {
        self.consumer_attached.load(Ordering::SeqCst)
    }

    pub fn pending_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Ask the UI thread for a file and block until it answers or the
    /// request times out. Timeout and cancellation both yield `Ok(None)`.
    ///
    /// Must not be called on the UI thread itself: it would wait on its own
    /// tick until the timeout.
    pub fn request_dialog(&self, prompt: DialogPrompt) -> Result<Option<ModelFile>, DialogError> {
        if !self.is_available() {
            return Err(DialogError::Unavailable);
        }

        let id = Uuid::new_v4();
        let (slot, result) = mpsc::sync_channel(1);
        let timeout = self.config.request_timeout;
        {
            let mut queue = self.queue.lock().unwrap();
            queue.push_back(PendingDialog {
                id,
                prompt,
                deadline: Instant::now() + timeout,
                slot,
            });
            log::debug!("Queued dialog request {} ({} pending)", id, queue.len());
        }

        match result.recv_timeout(timeout) {
            Ok(file) => Ok(file),
            Err(RecvTimeoutError::Timeout) => {
                log::info!("Dialog request {} timed out after {:?}", id, timeout);
                self.queue.lock().unwrap().retain(|p| p.id != id);
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    /// Service the oldest pending request, if any. UI thread only.
    pub fn tick(&self, picker: &dyn FilePicker) -> TickOutcome {
        if self.servicing.swap(true, Ordering::SeqCst) {
            return TickOutcome::Busy;
        }
        let _servicing = ServicingGuard(&self.servicing);

        let Some(pending) = self.queue.lock().unwrap().pop_front() else {
            return TickOutcome::Idle;
        };

        if Instant::now() >= pending.deadline {
            log::debug!("Dropping expired dialog request {}", pending.id);
            let _ = pending.slot.try_send(None);
            return TickOutcome::Expired;
        }

        let file = picker
            .pick_file(&pending.prompt)
            .and_then(|path| self.accept(picker, &path));
        let selected = file.is_some();

        if pending.slot.try_send(file).is_err() {
            log::debug!("Requester for dialog {} is gone", pending.id);
        }
        TickOutcome::Serviced { selected }
    }

    /// Validate a picked path, applying the large-file confirmation.
    fn accept(&self, picker: &dyn FilePicker, path: &Path) -> Option<ModelFile> {
        let file = match ModelFile::from_path(path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Picked file {} is not usable: {}", path.display(), e);
                return None;
            }
        };
        if file.size_bytes() > self.config.large_file_threshold
            && !picker.confirm_large_file(file.path(), file.size_bytes())
        {
            log::info!("Large file {} declined", file.display_name());
            return None;
        }
        Some(file)
    }
}

impl Default for DialogBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

struct ServicingGuard<'a>(&'a AtomicBool);

impl Drop for ServicingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::DialogMode;
    use std::cell::{Cell, RefCell};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// Picker that answers from a script and records what it showed.
    struct ScriptedPicker {
        answer: Option<PathBuf>,
        confirm: bool,
        shown: RefCell<Vec<String>>,
        confirmations: Cell<usize>,
    }

    impl ScriptedPicker {
        fn answering(answer: Option<PathBuf>) -> Self {
            Self {
                answer,
                confirm: true,
                shown: RefCell::new(Vec::new()),
                confirmations: Cell::new(0),
            }
        }
    }

    impl FilePicker for ScriptedPicker {
        fn pick_file(&self, prompt: &DialogPrompt) -> Option<PathBuf> {
            self.shown.borrow_mut().push(prompt.title.clone());
            self.answer.clone()
        }

        fn confirm_large_file(&self, _path: &Path, _size_bytes: u64) -> bool {
            self.confirmations.set(self.confirmations.get() + 1);
            self.confirm
        }
    }

    fn model_on_disk(bytes: usize) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.glb");
        std::fs::write(&path, vec![7u8; bytes]).unwrap();
        (dir, path)
    }

    fn broker(timeout: Duration) -> Arc<DialogBroker> {
        let broker = DialogBroker::new(BrokerConfig::default().request_timeout(timeout));
        broker.attach_consumer();
        Arc::new(broker)
    }

    fn wait_for_pending(broker: &DialogBroker, n: usize) {
        let start = Instant::now();
        while broker.pending_len() < n {
            assert!(start.elapsed() < Duration::from_secs(5), "requests never queued");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Tick on the current ("UI") thread until `handle` finishes.
    fn drive<T>(
        broker: &DialogBroker,
        picker: &dyn FilePicker,
        handle: std::thread::JoinHandle<T>,
    ) -> T {
        while !handle.is_finished() {
            broker.tick(picker);
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.join().unwrap()
    }

    #[test]
    fn unavailable_without_consumer() {
        let broker = DialogBroker::default();
        assert_eq!(
            broker.request_dialog(DialogPrompt::new(DialogMode::Add)),
            Err(DialogError::Unavailable)
        );
        assert_eq!(broker.pending_len(), 0);
    }

    #[test]
    fn tick_on_empty_queue_is_idle() {
        let broker = broker(Duration::from_secs(1));
        let picker = ScriptedPicker::answering(None);
        assert_eq!(broker.tick(&picker), TickOutcome::Idle);
        assert!(picker.shown.borrow().is_empty());
    }

    #[test]
    fn worker_receives_picked_file() {
        let (_dir, path) = model_on_disk(16);
        let broker = broker(Duration::from_secs(5));
        let picker = ScriptedPicker::answering(Some(path.clone()));

        let worker = {
            let broker = Arc::clone(&broker);
            std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Add)))
        };
        let file = drive(&broker, &picker, worker).unwrap().unwrap();

        assert_eq!(file.size_bytes(), 16);
        assert_eq!(file.display_name(), "model.glb");
        assert_eq!(*picker.shown.borrow(), vec!["Add GLTF/GLB File".to_string()]);
    }

    #[test]
    fn cancel_resolves_to_none() {
        let broker = broker(Duration::from_secs(5));
        let picker = ScriptedPicker::answering(None);
        let worker = {
            let broker = Arc::clone(&broker);
            std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Open)))
        };
        assert_eq!(drive(&broker, &picker, worker), Ok(None));
    }

    #[test]
    fn missing_picked_file_resolves_to_none() {
        let broker = broker(Duration::from_secs(5));
        let picker = ScriptedPicker::answering(Some(PathBuf::from("/no/such/model.glb")));
        let worker = {
            let broker = Arc::clone(&broker);
            std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Open)))
        };
        assert_eq!(drive(&broker, &picker, worker), Ok(None));
    }

    #[test]
    fn timeout_resolves_to_none_and_dequeues() {
        let broker = broker(Duration::from_millis(50));
        let started = Instant::now();
        let result = broker.request_dialog(DialogPrompt::new(DialogMode::Add));
        assert_eq!(result, Ok(None));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(broker.pending_len(), 0);
    }

    #[test]
    fn expired_request_is_not_shown() {
        let broker = broker(Duration::from_millis(20));
        let worker = {
            let broker = Arc::clone(&broker);
            std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Add)))
        };
        wait_for_pending(&broker, 1);
        std::thread::sleep(Duration::from_millis(40));

        let picker = ScriptedPicker::answering(None);
        // Either the requester already removed it, or the tick drops it.
        let outcome = broker.tick(&picker);
        assert!(matches!(outcome, TickOutcome::Expired | TickOutcome::Idle));
        assert!(picker.shown.borrow().is_empty());
        assert_eq!(worker.join().unwrap(), Ok(None));
    }

    mod large_files {
        use super::*;

        fn broker_with_threshold(threshold: u64) -> Arc<DialogBroker> {
            let broker = DialogBroker::new(
                BrokerConfig::default()
                    .request_timeout(Duration::from_secs(5))
                    .large_file_threshold(threshold),
            );
            broker.attach_consumer();
            Arc::new(broker)
        }

        #[test]
        fn declined_large_file_yields_none() {
            let (_dir, path) = model_on_disk(64);
            let broker = broker_with_threshold(32);
            let mut picker = ScriptedPicker::answering(Some(path));
            picker.confirm = false;

            let worker = {
                let broker = Arc::clone(&broker);
                std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Add)))
            };
            assert_eq!(drive(&broker, &picker, worker), Ok(None));
            assert_eq!(picker.confirmations.get(), 1);
        }

        #[test]
        fn confirmed_large_file_is_returned() {
            let (_dir, path) = model_on_disk(64);
            let broker = broker_with_threshold(32);
            let picker = ScriptedPicker::answering(Some(path));

            let worker = {
                let broker = Arc::clone(&broker);
                std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Add)))
            };
            let file = drive(&broker, &picker, worker).unwrap();
            assert!(file.is_some());
            assert_eq!(picker.confirmations.get(), 1);
        }

        #[test]
        fn small_file_skips_confirmation() {
            let (_dir, path) = model_on_disk(8);
            let broker = broker_with_threshold(32);
            let picker = ScriptedPicker::answering(Some(path));

            let worker = {
                let broker = Arc::clone(&broker);
                std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Add)))
            };
            assert!(drive(&broker, &picker, worker).unwrap().is_some());
            assert_eq!(picker.confirmations.get(), 0);
        }
    }

    #[test]
    fn concurrent_requests_are_serviced_once_in_fifo_order() {
        const N: usize = 6;
        let broker = broker(Duration::from_secs(10));

        let mut workers = Vec::new();
        for i in 0..N {
            let b = Arc::clone(&broker);
            workers.push(std::thread::spawn(move || {
                let prompt = DialogPrompt::new(DialogMode::Add).with_title(Some(format!("req-{}", i)));
                b.request_dialog(prompt)
            }));
            // Enqueue strictly one after another so arrival order is known.
            wait_for_pending(&broker, i + 1);
        }

        let picker = ScriptedPicker::answering(None);
        let mut serviced = 0;
        while serviced < N {
            match broker.tick(&picker) {
                TickOutcome::Serviced { .. } => serviced += 1,
                TickOutcome::Idle => panic!("queue drained early"),
                other => panic!("unexpected tick outcome {:?}", other),
            }
        }
        assert_eq!(broker.tick(&picker), TickOutcome::Idle);

        for worker in workers {
            assert_eq!(worker.join().unwrap(), Ok(None));
        }
        let expected: Vec<_> = (0..N).map(|i| format!("req-{}", i)).collect();
        assert_eq!(*picker.shown.borrow(), expected);
    }

    #[test]
    fn reentrant_tick_is_busy() {
        struct NestedPicker {
            broker: Arc<DialogBroker>,
            nested: Cell<Option<TickOutcome>>,
        }
        impl FilePicker for NestedPicker {
            fn pick_file(&self, _prompt: &DialogPrompt) -> Option<PathBuf> {
                // A toolkit pumping its event loop inside the dialog would
                // tick again from here.
                self.nested.set(Some(self.broker.tick(self)));
                None
            }
            fn confirm_large_file(&self, _path: &Path, _size_bytes: u64) -> bool {
                true
            }
        }

        let broker = broker(Duration::from_secs(5));
        let picker = NestedPicker {
            broker: Arc::clone(&broker),
            nested: Cell::new(None),
        };
        let worker = {
            let broker = Arc::clone(&broker);
            std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Add)))
        };
        wait_for_pending(&broker, 1);

        assert_eq!(broker.tick(&picker), TickOutcome::Serviced { selected: false });
        assert_eq!(picker.nested.get(), Some(TickOutcome::Busy));
        assert_eq!(worker.join().unwrap(), Ok(None));
    }

    #[test]
    fn detach_releases_waiting_requesters() {
        let broker = broker(Duration::from_secs(30));
        let worker = {
            let broker = Arc::clone(&broker);
            std::thread::spawn(move || broker.request_dialog(DialogPrompt::new(DialogMode::Add)))
        };
        wait_for_pending(&broker, 1);

        broker.detach_consumer();

        assert_eq!(worker.join().unwrap(), Ok(None));
        assert!(!broker.is_available());
    }
}
