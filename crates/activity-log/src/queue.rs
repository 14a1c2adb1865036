use std::collections::VecDeque;

use credential_vault::Credential;
use tokio::sync::{mpsc, oneshot};

use crate::entry::EventRecord;
use crate::sink::{Ack, Submission, WriteError};

/// Why a submitted record never produced an acknowledgement.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Write(#[from] WriteError),

    /// The drain loop stopped before the record was written.
    #[error("record dropped before it was written")]
    Dropped,
}

type Reply = oneshot::Sender<Result<Ack, SubmissionError>>;

/// A record waiting in the [`EventQueue`], plus whoever wants to hear how its
/// write turned out.
pub struct QueuedRecord {
    pub(crate) submission: Submission,
    pub(crate) attempts: u32,
    reply: Option<Reply>,
}

impl QueuedRecord {
    pub fn new(submission: Submission) -> Self {
        Self {
            submission,
            attempts: 0,
            reply: None,
        }
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    /// Hand the final write result to the waiting [`Receipt`], if any.
    pub(crate) fn resolve(self, result: Result<Ack, SubmissionError>) {
        if let Some(reply) = self.reply {
            // The submitter may have stopped waiting.
            let _ = reply.send(result);
        }
    }
}

/// Ordered, unbounded buffer of records awaiting their write.
///
/// Insertion order is write order. Only the drain loop removes entries, and
/// only once the write of the front entry has resolved.
pub struct EventQueue {
    items: VecDeque<QueuedRecord>,
    high_water_mark: usize,
    above_mark: bool,
}

impl EventQueue {
    /// A `high_water_mark` of zero disables the backlog warning.
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            items: VecDeque::new(),
            high_water_mark,
            above_mark: false,
        }
    }

    /// Append to the back. Never blocks, never fails.
    pub fn enqueue(&mut self, item: QueuedRecord) {
        self.items.push_back(item);

        if self.high_water_mark > 0
            && !self.above_mark
            && self.items.len() >= self.high_water_mark
        {
            self.above_mark = true;
            tracing::warn!(
                queued = self.items.len(),
                high_water_mark = self.high_water_mark,
                "activity queue backlog reached high-water mark; sink may be failing"
            );
        }
    }

    /// Remove and return the oldest record.
    pub fn dequeue_front(&mut self) -> Option<QueuedRecord> {
        let item = self.items.pop_front();
        // Re-arms below half the mark, or once empty for very small marks.
        if self.above_mark && self.items.len() < (self.high_water_mark / 2).max(1) {
            self.above_mark = false;
        }
        item
    }

    pub fn front(&self) -> Option<&QueuedRecord> {
        self.items.front()
    }

    pub(crate) fn front_mut(&mut self) -> Option<&mut QueuedRecord> {
        self.items.front_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = QueuedRecord> + '_ {
        self.above_mark = false;
        self.items.drain(..)
    }

    pub fn is_above_high_water_mark(&self) -> bool {
        self.above_mark
    }
}

/// Resolves once the drain loop has finished with one submitted record.
pub struct Receipt {
    rx: oneshot::Receiver<Result<Ack, SubmissionError>>,
}

impl Receipt {
    pub async fn wait(self) -> Result<Ack, SubmissionError> {
        self.rx.await.unwrap_or(Err(SubmissionError::Dropped))
    }
}

/// A cheap, cloneable handle used to append records to the drain loop's
/// queue from any task.
#[derive(Clone)]
pub struct LogQueue {
    tx: mpsc::UnboundedSender<QueuedRecord>,
}

impl LogQueue {
    pub(crate) fn new(tx: mpsc::UnboundedSender<QueuedRecord>) -> Self {
        Self { tx }
    }

    /// Append a record and get a [`Receipt`] for its write.
    pub fn submit(&self, record: EventRecord, credential: Credential) -> Receipt {
        let (reply, rx) = oneshot::channel();
        let mut item = QueuedRecord::new(Submission::new(record, credential));
        item.reply = Some(reply);
        self.send(item);
        Receipt { rx }
    }

    /// Append a record without waiting for its outcome.
    pub fn enqueue(&self, record: EventRecord, credential: Credential) {
        self.send(QueuedRecord::new(Submission::new(record, credential)));
    }

    fn send(&self, item: QueuedRecord) {
        if let Err(err) = self.tx.send(item) {
            tracing::warn!(
                event_type = %err.0.submission.record.event_type(),
                "drain loop stopped; record dropped"
            );
            err.0.resolve(Err(SubmissionError::Dropped));
        }
    }
}
