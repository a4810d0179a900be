//! Deferred result slots.
//!
//! A producer fulfils slots in whatever order its work completes; the
//! consumer awaits them strictly by index. Each slot is a one-shot channel,
//! so a consumer parked on slot `i` wakes exactly when slot `i` is filled.

use crate::error::{FlowError, FlowResult};
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type SlotReceiver<T> = oneshot::Receiver<FlowResult<T>>;

/// Allocate `count` unfilled slots.
pub fn slots<T>(count: usize) -> (SlotWriter<T>, Vec<SlotReceiver<T>>) {
    let (senders, receivers) = (0..count)
        .map(|_| {
            let (tx, rx) = oneshot::channel();
            (Some(tx), rx)
        })
        .unzip();
    (SlotWriter { senders }, receivers)
}

/// Producer side; dropping it abandons every slot still pending.
pub struct SlotWriter<T> {
    senders: Vec<Option<oneshot::Sender<FlowResult<T>>>>,
}

impl<T> SlotWriter<T> {
    /// Fill slot `index`. Returns false when it was already filled or does not exist.
    pub fn fulfil(&mut self, index: usize, value: T) -> bool {
        self.settle(index, Ok(value))
    }

    /// Fail slot `index` now; a consumer parked on it wakes with `err`
    /// without waiting for the producer to finish.
    pub fn fail(&mut self, index: usize, err: FlowError) -> bool {
        self.settle(index, Err(err))
    }

    fn settle(&mut self, index: usize, result: FlowResult<T>) -> bool {
        match self.senders.get_mut(index).and_then(Option::take) {
            Some(sender) => {
                // A consumer that went away no longer cares.
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, index: usize) -> bool {
        matches!(self.senders.get(index), Some(Some(_)))
    }

    pub fn pending(&self) -> Vec<usize> {
        (0..self.senders.len())
            .filter(|index| self.is_pending(*index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

/// Consumer side: a forward-only, non-restartable sequence over the slots.
///
/// The producer task's outcome is folded into the sequence. A failed slot
/// yields its error at once; a slot abandoned by a failed producer yields the
/// producer's error; once every slot is consumed the producer is joined so a
/// late failure is not lost.
pub struct SlotSequence<T> {
    receivers: VecDeque<SlotReceiver<T>>,
    producer: Option<JoinHandle<FlowResult<()>>>,
    abandoned: fn(usize) -> FlowError,
    position: usize,
    finished: bool,
}

impl<T> SlotSequence<T> {
    pub fn new(
        receivers: Vec<SlotReceiver<T>>,
        producer: JoinHandle<FlowResult<()>>,
        abandoned: fn(usize) -> FlowError,
    ) -> Self {
        Self {
            receivers: receivers.into(),
            producer: Some(producer),
            abandoned,
            position: 0,
            finished: false,
        }
    }

    /// Slots not yet consumed.
    pub fn remaining(&self) -> usize {
        self.receivers.len()
    }

    pub async fn next(&mut self) -> Option<FlowResult<T>> {
        if self.finished {
            return None;
        }

        let Some(receiver) = self.receivers.pop_front() else {
            self.finished = true;
            return self.join().await.err().map(Err);
        };

        let index = self.position;
        self.position += 1;
        match receiver.await {
            Ok(Ok(value)) => Some(Ok(value)),
            Ok(Err(err)) => {
                // The producer may still be running; it is left detached.
                self.finished = true;
                self.receivers.clear();
                self.producer = None;
                Some(Err(err))
            }
            Err(_) => {
                self.finished = true;
                self.receivers.clear();
                let err = match self.join().await {
                    Err(e) => e,
                    Ok(()) => (self.abandoned)(index),
                };
                Some(Err(err))
            }
        }
    }

    /// Drain into a `Vec`, stopping at the first error.
    pub async fn collect(mut self) -> FlowResult<Vec<T>> {
        let mut out = Vec::with_capacity(self.remaining());
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    pub fn into_stream(self) -> impl Stream<Item = FlowResult<T>>
    where
        T: Send + 'static,
    {
        stream::unfold(self, |mut sequence| async move {
            sequence.next().await.map(|item| (item, sequence))
        })
    }

    async fn join(&mut self) -> FlowResult<()> {
        match self.producer.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}
