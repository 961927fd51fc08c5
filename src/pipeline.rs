//! Concurrent copy: segment readers feeding batch writers through a bounded
//! queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::table::{Batch, BatchWriter, SegmentedReader};

/// Producer side of the batch queue, as seen by a reader
///
/// Delivery gives up as soon as the pipeline is shutting down, so a reader
/// blocked on a full queue never outlives a failed copy.
#[derive(Debug, Clone)]
pub struct BatchSink {
    sender: mpsc::Sender<Batch>,
    shutdown: watch::Receiver<bool>,
}

impl BatchSink {
    /// Sink sending into `sender` until `shutdown` turns true
    pub fn new(sender: mpsc::Sender<Batch>, shutdown: watch::Receiver<bool>) -> Self {
        Self { sender, shutdown }
    }

    /// Hand one batch to the writers
    ///
    /// Returns `false` if the batch was not accepted because the pipeline is
    /// shutting down or no writer is left.
    pub async fn deliver(&mut self, batch: Batch) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.shutdown.wait_for(|stop| *stop) => false,
            sent = self.sender.send(batch) => sent.is_ok(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Worker {
    Reader(u32),
    Writer(usize),
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Worker::Reader(index) => write!(f, "reader {}", index),
            Worker::Writer(index) => write!(f, "writer {}", index),
        }
    }
}

type Queue = Arc<Mutex<mpsc::Receiver<Batch>>>;

/// Copies one table into another with parallel segment scans and writers
#[derive(Debug, Clone)]
pub struct CopyPipeline {
    reader: SegmentedReader,
    writer: BatchWriter,
}

impl CopyPipeline {
    /// Pipeline scanning with `reader` and writing with `writer`
    pub fn new(reader: SegmentedReader, writer: BatchWriter) -> Self {
        Self { reader, writer }
    }

    /// Run `reader_count` segment scans and `writer_count` writers to completion
    ///
    /// The first worker error is returned once every task has stopped; later
    /// errors are only logged. Items written before a failure stay written.
    pub async fn run(&self, reader_count: usize, writer_count: usize) -> Result<(), Error> {
        if reader_count == 0 {
            return Err(Error::validation("reader count has to be greater than 0"));
        }
        if writer_count == 0 {
            return Err(Error::validation("writer count has to be greater than 0"));
        }
        let total_segments = u32::try_from(reader_count).map_err(|_| {
            Error::validation(format!("reader count {} is too large", reader_count))
        })?;

        info!(
            source = self.reader.table(),
            target = self.writer.table(),
            readers = reader_count,
            writers = writer_count,
            "copying table"
        );

        let (sender, receiver) = mpsc::channel(writer_count);
        let queue: Queue = Arc::new(Mutex::new(receiver));
        let (stop, shutdown) = watch::channel(false);

        let mut tasks = JoinSet::new();
        let mut workers = HashMap::with_capacity(reader_count + writer_count);

        for index in 0..total_segments {
            let reader = self.reader.clone();
            let mut sink = BatchSink::new(sender.clone(), shutdown.clone());
            let handle = tasks.spawn(async move {
                reader.scan(total_segments, index, &mut sink).await
            });
            let _ = workers.insert(handle.id(), Worker::Reader(index));
        }
        // Writers see the end of the queue once every reader has dropped its sink
        drop(sender);

        for index in 0..writer_count {
            let writer = self.writer.clone();
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            let handle = tasks.spawn(drain(writer, queue, shutdown));
            let _ = workers.insert(handle.id(), Worker::Writer(index));
        }
        drop(queue);

        let mut first_error = None;

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(err) => (err.id(), Err(Error::from(err))),
            };
            let worker = workers
                .get(&id)
                .map_or_else(|| "unknown worker".to_string(), Worker::to_string);

            match result {
                Ok(()) => debug!(%worker, "worker finished"),
                Err(err) if first_error.is_none() => {
                    error!(%worker, error = %err, "worker failed, stopping copy");
                    let _ = stop.send_replace(true);
                    first_error = Some(err);
                }
                Err(err) => warn!(%worker, error = %err, "discarding error after shutdown"),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(
                    source = self.reader.table(),
                    target = self.writer.table(),
                    "table copied"
                );
                Ok(())
            }
        }
    }
}

/// Writer loop: take batches until the queue ends or the copy shuts down
async fn drain(
    writer: BatchWriter,
    queue: Queue,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    loop {
        let batch = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => None,
                batch = queue.recv() => batch,
            }
        };

        match batch {
            Some(batch) => writer.write(batch).await?,
            None => return Ok(()),
        }
    }
}
