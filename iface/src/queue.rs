// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bounded single-producer / single-consumer packet queue

use concurrency::Semaphore;
use crossbeam::queue::ArrayQueue;
use net::packet::Packet;

/// A bounded FIFO of packets between a producer and a single worker thread.
///
/// Packets are boxed so that the ring itself stays small regardless of
/// payload sizes.
/// A counting semaphore signals non-emptiness: the producer releases a
/// permit after a successful push and the consumer acquires one before
/// popping, so [`pop_wait`] blocks exactly until a packet is queued.
///
/// [`pop_wait`]: PktQueue::pop_wait
#[derive(Debug)]
pub struct PktQueue {
    queue: ArrayQueue<Box<Packet>>,
    sem: Semaphore,
}

impl PktQueue {
    /// Create a queue holding at most `capacity` packets.
    #[must_use]
    pub fn new(capacity: usize) -> PktQueue {
        PktQueue {
            queue: ArrayQueue::new(capacity),
            sem: Semaphore::new(0),
        }
    }

    /// Push a [`Packet`] (boxed) to this queue.
    ///
    /// # Errors
    ///
    /// This method fails if the queue is full, handing the packet back.
    pub fn push(&self, packet: Box<Packet>) -> Result<(), Box<Packet>> {
        self.queue.push(packet)?;
        self.sem.release();
        Ok(())
    }

    /// Pop the oldest packet without blocking.
    #[must_use]
    pub fn try_pop(&self) -> Option<Box<Packet>> {
        if !self.sem.try_acquire() {
            return None;
        }
        Some(self.pop_queued())
    }

    /// Pop the oldest packet, blocking until one is queued.
    #[must_use]
    pub fn pop_wait(&self) -> Box<Packet> {
        self.sem.acquire();
        self.pop_queued()
    }

    fn pop_queued(&self) -> Box<Packet> {
        match self.queue.pop() {
            Some(packet) => packet,
            // a permit witnesses a prior push and there is only one consumer
            None => unreachable!("semaphore permit without a queued packet"),
        }
    }

    /// The number of queued packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True iff no packets are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The fixed capacity of this queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use net::interface::InterfaceId;
    use std::sync::Arc;
    use std::thread;

    fn packet(len: usize) -> Box<Packet> {
        Box::new(Packet::alloc(InterfaceId::new(0), len))
    }

    #[test]
    fn capacity_is_enforced() {
        let queue = PktQueue::new(2);
        queue.push(packet(1)).unwrap();
        queue.push(packet(2)).unwrap();
        assert!(queue.push(packet(3)).is_err());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn fifo_order_preserved() {
        let queue = PktQueue::new(4);
        let first = packet(1);
        let second = packet(2);
        let first_index = first.index();
        let second_index = second.index();
        queue.push(first).unwrap();
        queue.push(second).unwrap();
        assert_eq!(queue.try_pop().unwrap().index(), first_index);
        assert_eq!(queue.try_pop().unwrap().index(), second_index);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn pop_wait_blocks_for_a_push() {
        let queue = Arc::new(PktQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_wait().len())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        queue.push(packet(11)).unwrap();
        assert_eq!(consumer.join().unwrap(), 11);
    }
}
