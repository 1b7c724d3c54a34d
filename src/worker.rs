// worker.rs - Background codec worker and its message protocol
//
// One long-lived thread runs every decode/resize/encode. Requests and
// responses travel in envelopes tagged with a request id; a router thread
// owns the shared response channel and hands each event to the mailbox of
// the request it belongs to, so several requests may be in flight at once.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::mpsc;

use crate::codec::{self, Codec, EncodeOptions, NativeCodec, ProcessedResult};
use crate::error::CodecError;

pub type RequestId = u64;

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub id: RequestId,
    pub body: T,
}

#[derive(Debug, Clone)]
pub enum WorkerRequest {
    Process {
        buffer: Arc<[u8]>,
        options: EncodeOptions,
    },
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Progress { label: String },
    Result(ProcessedResult),
    Error { message: String },
}

impl WorkerEvent {
    /// `Result` and `Error` end a request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

type Mailboxes = Arc<Mutex<HashMap<RequestId, mpsc::UnboundedSender<WorkerEvent>>>>;

/// Handle to the codec worker. Clones share the same thread.
#[derive(Clone)]
pub struct CodecWorker {
    requests: std_mpsc::Sender<Envelope<WorkerRequest>>,
    pending: Mailboxes,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for CodecWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = self.pending.lock().map(|p| p.len()).unwrap_or(0);
        f.debug_struct("CodecWorker")
            .field("in_flight", &in_flight)
            .finish()
    }
}

impl CodecWorker {
    pub fn spawn() -> Self {
        Self::with_codec(NativeCodec::default())
    }

    pub fn with_codec<C: Codec>(codec: C) -> Self {
        let (request_tx, request_rx) = std_mpsc::channel::<Envelope<WorkerRequest>>();
        let (event_tx, event_rx) = std_mpsc::channel::<Envelope<WorkerEvent>>();
        let pending: Mailboxes = Arc::new(Mutex::new(HashMap::new()));

        thread::Builder::new()
            .name("codec-worker".into())
            .spawn(move || worker_loop(codec, request_rx, event_tx))
            .map_err(|e| log::error!("Failed to start codec worker: {}", e))
            .ok();

        let router_pending = Arc::clone(&pending);
        thread::Builder::new()
            .name("codec-router".into())
            .spawn(move || route_events(event_rx, router_pending))
            .map_err(|e| log::error!("Failed to start codec router: {}", e))
            .ok();

        Self {
            requests: request_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Queues a `process` request and returns the mailbox for its replies.
    pub fn submit(&self, buffer: Arc<[u8]>, options: EncodeOptions) -> RequestTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        // Register before sending so no reply can arrive without a mailbox.
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }

        log::debug!("Dispatching request {} for {}", id, options.file_name);
        let request = Envelope {
            id,
            body: WorkerRequest::Process { buffer, options },
        };
        if self.requests.send(request).is_err() {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&id);
            }
        }

        RequestTicket { id, events: rx }
    }

    /// Submits and waits for the terminal reply.
    pub async fn process<P>(
        &self,
        buffer: Arc<[u8]>,
        options: EncodeOptions,
        on_progress: P,
    ) -> Result<ProcessedResult, CodecError>
    where
        P: FnMut(&str),
    {
        self.submit(buffer, options).outcome(on_progress).await
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

/// Replies to one request, in issuance order.
#[derive(Debug)]
pub struct RequestTicket {
    id: RequestId,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl RequestTicket {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Next event, or `None` once the request has terminated or the worker
    /// is gone.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Feeds progress labels to `on_progress` until the terminal reply.
    pub async fn outcome<P>(mut self, mut on_progress: P) -> Result<ProcessedResult, CodecError>
    where
        P: FnMut(&str),
    {
        while let Some(event) = self.events.recv().await {
            match event {
                WorkerEvent::Progress { label } => on_progress(&label),
                WorkerEvent::Result(result) => return Ok(result),
                WorkerEvent::Error { message } => return Err(CodecError::Worker(message)),
            }
        }
        Err(CodecError::WorkerGone)
    }
}

fn worker_loop<C: Codec>(
    codec: C,
    requests: std_mpsc::Receiver<Envelope<WorkerRequest>>,
    events: std_mpsc::Sender<Envelope<WorkerEvent>>,
) {
    for Envelope { id, body } in requests {
        match body {
            WorkerRequest::Process { buffer, options } => {
                let post = |body: WorkerEvent| {
                    let _ = events.send(Envelope { id, body });
                };

                // A panicking codec fails this request only; the thread lives on.
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    codec::process(&codec, &buffer, &options, |label| {
                        log::debug!("Request {}: {}", id, label);
                        post(WorkerEvent::Progress {
                            label: label.to_string(),
                        });
                    })
                }));

                match outcome {
                    Ok(Ok(result)) => post(WorkerEvent::Result(result)),
                    Ok(Err(e)) => {
                        log::debug!("Request {} failed: {}", id, e);
                        post(WorkerEvent::Error {
                            message: e.to_string(),
                        })
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        log::error!("Codec panicked on request {}: {}", id, message);
                        post(WorkerEvent::Error {
                            message: format!("codec panicked: {}", message),
                        })
                    }
                }
            }
        }
    }
    log::debug!("Codec worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn route_events(events: std_mpsc::Receiver<Envelope<WorkerEvent>>, pending: Mailboxes) {
    for Envelope { id, body } in events {
        let Ok(mut mailboxes) = pending.lock() else {
            break;
        };
        let terminal = body.is_terminal();
        match mailboxes.get(&id) {
            // The ticket may have been dropped; its replies go nowhere.
            Some(mailbox) => {
                let _ = mailbox.send(body);
            }
            None => log::debug!("Dropping reply for unknown request {}", id),
        }
        if terminal {
            mailboxes.remove(&id);
        }
    }
    // Worker is gone: closing every mailbox fails the waiting tickets.
    if let Ok(mut mailboxes) = pending.lock() {
        mailboxes.clear();
    }
}
