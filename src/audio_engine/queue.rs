//! Fixed-capacity block queue between a device callback and the processing thread.
//!
//! The queue is a single-producer single-consumer `rtrb` ring buffer split in two halves. The
//! device-callback half only ever uses the non-blocking `try_*` calls. The processing-thread half
//! may wait, polling the ring buffer at a short interval, up to a bound or until the other half
//! is dropped.
//!
//! A full queue never evicts: queued blocks stay in order and the incoming block is handed back
//! to the writer. A device callback counts it as an overrun and drops it. The processing thread
//! waits up to its write timeout first.

use std::thread;
use std::time::{Duration, Instant};

use rtrb::{Consumer, Producer, PushError, RingBuffer};

use crate::messages::AudioBlock;

/// Polling interval used while a blocking call waits for the other side.
const WAIT_INTERVAL: Duration = Duration::from_micros(250);

/// Creates a queue holding at most `capacity` blocks.
pub fn block_queue(capacity: usize) -> (BlockSender, BlockReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (
        BlockSender { producer, capacity },
        BlockReceiver { consumer, capacity },
    )
}

/// Writing half of a block queue.
pub struct BlockSender {
    producer: Producer<AudioBlock>,
    capacity: usize,
}

impl BlockSender {
    /// Pushes without waiting. On a full queue the queued blocks are kept and `block` is handed
    /// back.
    pub fn try_push(&mut self, block: AudioBlock) -> Result<(), AudioBlock> {
        match self.producer.push(block) {
            Ok(()) => Ok(()),
            Err(PushError::Full(block)) => Err(block),
        }
    }

    /// Pushes, waiting for space as long as the receiving half is alive.
    pub fn push(&mut self, block: AudioBlock) -> Result<(), AudioBlock> {
        self.push_until(block, None)
    }

    /// Pushes, waiting at most `timeout` for space.
    pub fn push_timeout(&mut self, block: AudioBlock, timeout: Duration) -> Result<(), AudioBlock> {
        self.push_until(block, Some(Instant::now() + timeout))
    }

    fn push_until(&mut self, mut block: AudioBlock, deadline: Option<Instant>) -> Result<(), AudioBlock> {
        loop {
            match self.producer.push(block) {
                Ok(()) => return Ok(()),
                Err(PushError::Full(rejected)) => block = rejected,
            }
            if self.producer.is_abandoned() || deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(block);
            }
            thread::sleep(WAIT_INTERVAL);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks currently queued.
    pub fn len(&self) -> usize {
        self.capacity() - self.producer.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }
}

/// Reading half of a block queue.
pub struct BlockReceiver {
    consumer: Consumer<AudioBlock>,
    capacity: usize,
}

impl BlockReceiver {
    /// Returns the oldest block, or `None` if the queue is empty.
    pub fn try_pop(&mut self) -> Option<AudioBlock> {
        self.consumer.pop().ok()
    }

    /// Returns the oldest block, or a silent block of the given shape on underrun.
    pub fn pop_or_silence(&mut self, channel_count: usize, frame_count: usize) -> AudioBlock {
        self.try_pop()
            .unwrap_or_else(|| AudioBlock::silence(channel_count, frame_count))
    }

    /// Waits at most `timeout` for a block.
    pub fn pop_timeout(&mut self, timeout: Duration) -> Option<AudioBlock> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(block) = self.consumer.pop() {
                return Some(block);
            }
            if self.consumer.is_abandoned() || Instant::now() >= deadline {
                return None;
            }
            thread::sleep(WAIT_INTERVAL);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.consumer.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}
