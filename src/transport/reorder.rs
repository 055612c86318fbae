//! Reorder buffer.
//!
//! Restores send order for one logical stream carried over a transport that
//! may reorder packets but never drops or duplicates them.
//!
//! The sending side stamps each payload with `tx_seq`. The receiving side
//! keeps out-of-order payloads keyed by sequence number and releases them as
//! soon as the gap in front of them closes.
//!
//! ```text
//! rx_seq = 2     pending: {4: d, 5: e, 9: i}
//! write(2) -> [c]          rx_seq = 3
//! write(3) -> [c, d, e]    rx_seq = 6
//! ```
//!
//! How far ahead a packet lands does not matter, only how many are held.
//! Holding `max_pending` is unrecoverable: with a lossless transport it
//! means the peer is misbehaving, so the buffer clears itself and closes.

use std::collections::HashMap;

use tracing::{trace, warn};

use super::packet::SequencedPacket;
use super::sequence;
use crate::core::SequenceError;
use crate::core::constants::{DEFAULT_MAX_PENDING, SEQ_WRAP};

/// Sequencing state for one stream.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    /// Next sequence number to assign on send.
    tx_seq: u32,
    /// Next sequence number expected for in-order delivery.
    rx_seq: u32,
    /// Buffered out-of-order payloads by sequence number.
    pending: HashMap<u32, T>,
    max_pending: usize,
    seq_wrap: u32,
    closed: bool,
}

impl<T> ReorderBuffer<T> {
    /// Create a buffer with the default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_PENDING, SEQ_WRAP)
    }

    /// Create a buffer holding at most `max_pending - 1` out-of-order payloads,
    /// counting sequence numbers modulo `seq_wrap`.
    ///
    /// `max_pending` is raised to at least 1 and `seq_wrap` to at least 2.
    pub fn with_limits(max_pending: usize, seq_wrap: u32) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            tx_seq: 0,
            rx_seq: 0,
            pending: HashMap::with_capacity(max_pending),
            max_pending,
            seq_wrap: seq_wrap.max(2),
            closed: false,
        }
    }

    /// Next sequence number to be assigned.
    pub fn tx_seq(&self) -> u32 {
        self.tx_seq
    }

    /// Next sequence number expected.
    pub fn rx_seq(&self) -> u32 {
        self.rx_seq
    }

    /// Number of buffered out-of-order payloads.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending limit; reaching it closes the buffer.
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Sequence wrap.
    pub fn seq_wrap(&self) -> u32 {
        self.seq_wrap
    }

    /// Check if an overflow has closed the buffer.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stamp `data` with the next sequence number.
    pub fn send(&mut self, data: T) -> SequencedPacket<T> {
        let seq = self.tx_seq;
        self.tx_seq = sequence::next(seq, self.seq_wrap);
        SequencedPacket::new(seq, data)
    }

    /// Ingest a packet from the transport.
    ///
    /// Returns the payloads that became deliverable, in send order. Stale,
    /// duplicate, and out-of-range packets are dropped and yield nothing.
    ///
    /// # Errors
    ///
    /// [`SequenceError::TooManyPending`] when the packet overflows the
    /// pending set. The buffer is cleared and every later write fails with
    /// [`SequenceError::Closed`].
    pub fn write(&mut self, packet: SequencedPacket<T>) -> Result<Vec<T>, SequenceError> {
        if self.closed {
            return Err(SequenceError::Closed);
        }

        let SequencedPacket { seq, data } = packet;
        if seq >= self.seq_wrap {
            trace!(seq, seq_wrap = self.seq_wrap, "dropping out-of-range sequence number");
            return Ok(Vec::new());
        }
        if sequence::is_before(seq, self.rx_seq, self.seq_wrap) {
            trace!(seq, rx_seq = self.rx_seq, "dropping stale packet");
            return Ok(Vec::new());
        }

        if self.pending.contains_key(&seq) {
            trace!(seq, "dropping duplicate packet");
            return Ok(Vec::new());
        }
        self.pending.insert(seq, data);

        if self.pending.len() >= self.max_pending {
            return Err(self.overflow());
        }

        Ok(self.drain())
    }

    /// Release every payload that is now in order.
    fn drain(&mut self) -> Vec<T> {
        let mut delivered = Vec::new();
        while let Some(data) = self.pending.remove(&self.rx_seq) {
            self.rx_seq = sequence::next(self.rx_seq, self.seq_wrap);
            delivered.push(data);
        }
        delivered
    }

    fn overflow(&mut self) -> SequenceError {
        warn!(
            pending = self.pending.len(),
            max_pending = self.max_pending,
            rx_seq = self.rx_seq,
            "reorder buffer overflow"
        );
        self.pending.clear();
        self.closed = true;
        SequenceError::TooManyPending {
            max_pending: self.max_pending,
        }
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn packets(buffer: &mut ReorderBuffer<u32>, count: u32) -> Vec<SequencedPacket<u32>> {
        (0..count).map(|i| buffer.send(i)).collect()
    }

    #[test]
    fn test_send_assigns_sequence() {
        let mut buffer = ReorderBuffer::new();
        assert_eq!(buffer.send("a").seq, 0);
        assert_eq!(buffer.send("b").seq, 1);
        assert_eq!(buffer.tx_seq(), 2);
    }

    #[test]
    fn test_in_order_delivery() {
        let mut tx = ReorderBuffer::new();
        let mut rx = ReorderBuffer::new();
        for packet in packets(&mut tx, 5) {
            let expected = packet.data;
            assert_eq!(rx.write(packet).unwrap(), vec![expected]);
        }
        assert_eq!(rx.rx_seq(), 5);
        assert_eq!(rx.pending_count(), 0);
    }

    #[test]
    fn test_out_of_order_delivery() {
        let mut tx = ReorderBuffer::new();
        let mut rx = ReorderBuffer::new();
        let mut sent = packets(&mut tx, 4);
        let p3 = sent.pop().unwrap();
        let p2 = sent.pop().unwrap();
        let p1 = sent.pop().unwrap();
        let p0 = sent.pop().unwrap();

        assert!(rx.write(p2).unwrap().is_empty());
        assert!(rx.write(p1).unwrap().is_empty());
        assert_eq!(rx.pending_count(), 2);

        assert_eq!(rx.write(p0).unwrap(), vec![0, 1, 2]);
        assert_eq!(rx.pending_count(), 0);
        assert_eq!(rx.write(p3).unwrap(), vec![3]);
    }

    #[test]
    fn test_stale_packet_dropped() {
        let mut rx: ReorderBuffer<u32> = ReorderBuffer::new();
        rx.write(SequencedPacket::new(0, 0)).unwrap();
        rx.write(SequencedPacket::new(1, 1)).unwrap();

        // Behind rx_seq within the half window.
        assert!(rx.write(SequencedPacket::new(0, 99)).unwrap().is_empty());
        assert!(rx.write(SequencedPacket::new(SEQ_WRAP - 10, 99)).unwrap().is_empty());
        assert_eq!(rx.pending_count(), 0);
        assert_eq!(rx.rx_seq(), 2);
    }

    #[test]
    fn test_out_of_range_dropped() {
        let mut rx: ReorderBuffer<u32> = ReorderBuffer::with_limits(20, 100);
        assert!(rx.write(SequencedPacket::new(100, 1)).unwrap().is_empty());
        assert_eq!(rx.pending_count(), 0);
        assert!(!rx.is_closed());
    }

    #[test]
    fn test_duplicate_dropped() {
        let mut rx: ReorderBuffer<u32> = ReorderBuffer::new();
        assert!(rx.write(SequencedPacket::new(3, 3)).unwrap().is_empty());
        assert!(rx.write(SequencedPacket::new(3, 33)).unwrap().is_empty());
        assert_eq!(rx.pending_count(), 1);
    }

    #[test]
    fn test_overflow_closes_buffer() {
        let mut rx: ReorderBuffer<u32> = ReorderBuffer::with_limits(5, SEQ_WRAP);
        for seq in 1..5 {
            assert!(rx.write(SequencedPacket::new(seq, seq)).is_ok());
        }
        assert_eq!(rx.pending_count(), 4);

        let err = rx.write(SequencedPacket::new(5, 5)).unwrap_err();
        assert_eq!(err, SequenceError::TooManyPending { max_pending: 5 });
        assert_eq!(rx.pending_count(), 0);
        assert!(rx.is_closed());

        // Exactly one overflow; the buffer stays closed.
        assert_eq!(
            rx.write(SequencedPacket::new(0, 0)).unwrap_err(),
            SequenceError::Closed
        );
    }

    #[test]
    fn test_overflow_on_full_ring() {
        let mut rx: ReorderBuffer<u32> = ReorderBuffer::with_limits(3, SEQ_WRAP);
        rx.write(SequencedPacket::new(2, 2)).unwrap();
        rx.write(SequencedPacket::new(1, 1)).unwrap();
        // Third pending entry reaches the limit before it can drain.
        assert!(matches!(
            rx.write(SequencedPacket::new(0, 0)),
            Err(SequenceError::TooManyPending { .. })
        ));
    }

    #[test]
    fn test_far_ahead_packet_waits() {
        let mut tx = ReorderBuffer::new();
        let mut rx = ReorderBuffer::new();
        let mut sent = packets(&mut tx, 26);
        let last = sent.pop().unwrap();

        // Lands well past the pending limit, but only one packet is held.
        assert!(rx.write(last).unwrap().is_empty());
        assert_eq!(rx.pending_count(), 1);

        let mut delivered = Vec::new();
        for packet in sent {
            delivered.extend(rx.write(packet).unwrap());
        }
        assert_eq!(delivered, (0..26).collect::<Vec<_>>());
        assert_eq!(rx.pending_count(), 0);
        assert!(!rx.is_closed());
    }

    #[test]
    fn test_wraparound() {
        let wrap = 16;
        let mut tx = ReorderBuffer::with_limits(4, wrap);
        let mut rx = ReorderBuffer::with_limits(4, wrap);
        let mut delivered = Vec::new();
        let mut seqs = Vec::new();
        for i in 0..(wrap + 5) {
            let packet = tx.send(i);
            seqs.push(packet.seq);
            delivered.extend(rx.write(packet).unwrap());
        }
        assert_eq!(delivered, (0..(wrap + 5)).collect::<Vec<_>>());
        assert_eq!(seqs[wrap as usize], 0);
        assert_eq!(seqs[wrap as usize + 4], 4);
        assert_eq!(rx.rx_seq(), 5);
    }

    #[test]
    fn test_reorder_across_wrap() {
        let wrap = 8;
        let mut tx = ReorderBuffer::with_limits(4, wrap);
        let mut rx = ReorderBuffer::with_limits(4, wrap);
        let mut delivered = Vec::new();
        let sent: Vec<_> = (0..12).map(|i| tx.send(i)).collect();
        // Deliver in pairs swapped: 1,0,3,2,...
        for pair in sent.chunks(2) {
            delivered.extend(rx.write(pair[1].clone()).unwrap());
            delivered.extend(rx.write(pair[0].clone()).unwrap());
        }
        assert_eq!(delivered, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_default_wrap() {
        let mut tx = ReorderBuffer::new();
        let mut rx = ReorderBuffer::new();
        let total = SEQ_WRAP + 3;
        let mut count = 0u32;
        for i in 0..total {
            for data in rx.write(tx.send(i)).unwrap() {
                assert_eq!(data, count);
                count += 1;
            }
        }
        assert_eq!(count, total);
        assert_eq!(tx.tx_seq(), 3);
    }

    proptest! {
        #[test]
        fn prop_any_bounded_shuffle_restores_order(
            chunks in prop::collection::vec(
                Just((0u32..10).collect::<Vec<_>>()).prop_shuffle(),
                1..20,
            )
        ) {
            // Each chunk of ten is delivered in an arbitrary order, so at most
            // nine packets are ever outstanding.
            let mut tx = ReorderBuffer::with_limits(DEFAULT_MAX_PENDING, 64);
            let mut rx = ReorderBuffer::with_limits(DEFAULT_MAX_PENDING, 64);
            let total = chunks.len() as u32 * 10;
            let sent: Vec<_> = (0..total).map(|i| tx.send(i)).collect();

            let mut delivered = Vec::new();
            for (c, order) in chunks.iter().enumerate() {
                for &i in order {
                    let packet = sent[c * 10 + i as usize].clone();
                    delivered.extend(rx.write(packet).unwrap());
                }
            }
            prop_assert_eq!(delivered, (0..total).collect::<Vec<_>>());
            prop_assert_eq!(rx.pending_count(), 0);
        }
    }
}
