use crate::error::InferenceError;
use crate::model::{CaptionModel, CaptionRequest};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tokio::sync::oneshot;

/// Result of one inference together with its telemetry.
#[derive(Debug)]
pub struct CaptionEngineResponse {
    /// Sequence number assigned when the request was submitted.
    pub id: u64,
    /// Total time taken for the inference.
    pub duration: Duration,
    /// Raw caption produced by the model.
    pub caption: String,
}

struct CaptionEngineJob {
    id: u64,
    request: CaptionRequest,
    reply: oneshot::Sender<Result<CaptionEngineResponse, InferenceError>>,
}

/// Runs a [`CaptionModel`] on a dedicated background thread.
///
/// The model is loaded once, moved onto the thread and never touched by request
/// handlers directly. Jobs are executed one at a time in submission order and
/// each caller awaits its own reply. A panic inside the model fails only the
/// job that caused it.
pub struct CaptionEngine {
    req_tx: Option<mpsc::Sender<CaptionEngineJob>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl CaptionEngine {
    /// Creates a new engine and moves `model` onto its inference thread.
    pub fn new<M>(mut model: M) -> Self
    where
        M: CaptionModel + Send + 'static,
    {
        let (req_tx, req_rx) = mpsc::channel::<CaptionEngineJob>();

        let inference_handle = std::thread::spawn(move || {
            while let Ok(job) = req_rx.recv() {
                log::debug!("Running inference #{}", job.id);

                let start_time = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| model.run(job.request)));

                let result = match outcome {
                    Ok(Ok(caption)) => Ok(CaptionEngineResponse {
                        id: job.id,
                        duration: start_time.elapsed(),
                        caption,
                    }),
                    Ok(Err(e)) => Err(InferenceError::Model(e.to_string())),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        log::error!("Model panicked during inference #{}: {message}", job.id);
                        Err(InferenceError::Panicked(message))
                    }
                };

                match &result {
                    Ok(response) => log::debug!(
                        "Inference #{} completed in {:?}",
                        response.id,
                        response.duration
                    ),
                    Err(e) => log::debug!("Inference #{} failed: {e}", job.id),
                }

                // the caller may have gone away, nothing to do then
                let _ = job.reply.send(result);
            }
            log::debug!("Inference thread exiting");
        });

        Self {
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Submits `request` to the inference thread and waits for its result.
    ///
    /// Fails with [`InferenceError::EngineStopped`] once the engine is stopped
    /// or its thread has died.
    pub async fn caption(
        &self,
        request: CaptionRequest,
    ) -> Result<CaptionEngineResponse, InferenceError> {
        let tx = self.req_tx.as_ref().ok_or(InferenceError::EngineStopped)?;
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(CaptionEngineJob {
            id,
            request,
            reply: reply_tx,
        })
        .map_err(|_| {
            log::error!("Inference thread is gone, cannot run inference #{id}");
            InferenceError::EngineStopped
        })?;

        reply_rx.await.map_err(|_| {
            log::error!("Inference thread dropped inference #{id} without a reply");
            InferenceError::EngineStopped
        })?
    }

    /// Closes the job queue and waits for the inference thread to finish the
    /// jobs already submitted.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            if handle.join().is_err() {
                log::error!("Inference thread panicked");
            }
        }
    }
}

impl Drop for CaptionEngine {
    fn drop(&mut self) {
        self.stop();
    }
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
