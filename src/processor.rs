//! Concurrent batch and stream unpacking.
//!
//! The processor is a thin worker pool over [`Message::unpack`]: a bounded
//! semaphore caps in-flight decodes, a cancellation token is observed
//! between jobs (running decodes finish), and batch output is positionally
//! aligned with its input. Decoded messages are deep-copied to `'static`
//! so they outlive the input buffers the tasks own.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::spec::CompiledPackager;
use crate::validate::ValidationLevel;

const DEFAULT_CONCURRENCY: usize = 4;

pub struct Processor {
    packager: Arc<CompiledPackager>,
    concurrency: usize,
    validation_level: ValidationLevel,
}

impl Processor {
    pub fn new(packager: Arc<CompiledPackager>) -> Self {
        Processor {
            packager,
            concurrency: DEFAULT_CONCURRENCY,
            validation_level: ValidationLevel::None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_validation_level(mut self, level: ValidationLevel) -> Self {
        self.validation_level = level;
        self
    }

    /// Unpack one message synchronously; the result borrows `data`.
    pub fn process<'a>(&self, data: &'a [u8]) -> Result<Message<'a>> {
        Message::unpack_with_level(Arc::clone(&self.packager), data, self.validation_level)
    }

    /// Unpack a batch concurrently. `results[i]` corresponds to
    /// `inputs[i]`. Cancellation stops new jobs from starting; jobs
    /// already running complete and their slots are filled.
    pub async fn process_batch(
        &self,
        cancel: &CancellationToken,
        inputs: Vec<Vec<u8>>,
    ) -> Vec<Result<Message<'static>>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut results: Vec<Result<Message<'static>>> =
            inputs.iter().map(|_| Err(Error::Cancelled)).collect();
        let mut tasks = JoinSet::new();

        for (index, data) in inputs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let packager = Arc::clone(&self.packager);
            let level = self.validation_level;
            tasks.spawn(async move {
                let _permit = permit;
                let result = Message::unpack_with_level(packager, &data, level)
                    .map(|msg| msg.deep_copy());
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Ok((index, result)) = joined {
                if let Err(e) = &result {
                    warn!(index, error = %e, "batch unpack failed");
                }
                results[index] = result;
            }
        }
        results
    }

    /// Unpack messages from `input` and send results to `output` until the
    /// input closes or the token fires. Running jobs complete either way.
    pub async fn process_stream(
        &self,
        cancel: CancellationToken,
        mut input: mpsc::Receiver<Vec<u8>>,
        output: mpsc::Sender<Result<Message<'static>>>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        loop {
            let data = tokio::select! {
                _ = cancel.cancelled() => break,
                received = input.recv() => match received {
                    Some(data) => data,
                    None => break,
                },
            };

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let packager = Arc::clone(&self.packager);
            let level = self.validation_level;
            let output = output.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = Message::unpack_with_level(packager, &data, level)
                    .map(|msg| msg.deep_copy());
                if let Err(e) = &result {
                    warn!(error = %e, "stream unpack failed");
                }
                let _ = output.send(result).await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}
