//! Fixed-size ring of buffered TLS packets
//!
//! Producers claim the slot at `head`; the out-of-band reader releases slots
//! from `tail`. When `head` wraps onto `tail` the ring is `full` and further
//! claims are refused until the reader catches up. A refused claim is a
//! silent drop, never an error.
//!
//! Head, tail and full are updated under one lock, so concurrent producers
//! on different CPUs cannot claim the same slot.

use netsift_common::{
    tls::{BUFFER_RING_SIZE, BUFFER_RING_SIZE_MASK, BUFFER_SIZE},
    ConnTuple, TlsBuffer, TlsBufferRingState,
};
use parking_lot::Mutex;

pub struct TlsBufferRing {
    state: Mutex<TlsBufferRingState>,
    slots: Box<[Mutex<TlsBuffer>]>,
}

impl TlsBufferRing {
    pub fn new() -> Self {
        let slots = (0..BUFFER_RING_SIZE)
            .map(|_| Mutex::new(TlsBuffer::default()))
            .collect();
        Self {
            state: Mutex::new(TlsBufferRingState::default()),
            slots,
        }
    }

    pub fn capacity(&self) -> u32 {
        BUFFER_RING_SIZE
    }

    fn claim(state: &mut TlsBufferRingState) -> Option<u32> {
        if state.full != 0 {
            return None;
        }
        let cur = state.head;
        state.head = (state.head + 1) & BUFFER_RING_SIZE_MASK;
        state.full = u32::from(state.head == state.tail);
        Some(cur)
    }

    /// Claim the next slot, or `None` when the ring is full
    pub fn allocate_slot(&self) -> Option<u32> {
        Self::claim(&mut self.state.lock())
    }

    /// Copy up to [`BUFFER_SIZE`] payload bytes into `slot`. The recorded
    /// length is the full payload length, so truncation stays visible.
    /// Returns the number of bytes copied.
    pub fn store(&self, slot: u32, tup: &ConnTuple, payload: &[u8]) -> usize {
        let mut buf = self.slots[(slot & BUFFER_RING_SIZE_MASK) as usize].lock();
        let copied = payload.len().min(BUFFER_SIZE);
        buf.tup = *tup;
        buf.len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        buf.buffer[..copied].copy_from_slice(&payload[..copied]);
        copied
    }

    /// Claim a slot and fill it before any reader can observe the claim
    pub fn push(&self, tup: &ConnTuple, payload: &[u8]) -> Option<u32> {
        let mut state = self.state.lock();
        let slot = Self::claim(&mut state)?;
        self.store(slot, tup, payload);
        Some(slot)
    }

    /// Copy of a slot's contents, whether or not it is live
    pub fn read(&self, slot: u32) -> Option<TlsBuffer> {
        self.slots.get(slot as usize).map(|buf| *buf.lock())
    }

    /// Release the oldest live slot, returning its contents
    pub fn pop(&self) -> Option<TlsBuffer> {
        let mut state = self.state.lock();
        if state.head == state.tail && state.full == 0 {
            return None;
        }
        let slot = state.tail;
        let buf = *self.slots[slot as usize].lock();
        state.tail = (state.tail + 1) & BUFFER_RING_SIZE_MASK;
        state.full = 0;
        Some(buf)
    }

    /// Release the oldest live slot without reading it
    pub fn release(&self) -> Option<u32> {
        let mut state = self.state.lock();
        if state.head == state.tail && state.full == 0 {
            return None;
        }
        let slot = state.tail;
        state.tail = (state.tail + 1) & BUFFER_RING_SIZE_MASK;
        state.full = 0;
        Some(slot)
    }

    /// Pop every live slot, oldest first
    pub fn drain(&self) -> Vec<TlsBuffer> {
        let mut drained = Vec::new();
        for _ in 0..BUFFER_RING_SIZE {
            match self.pop() {
                Some(buf) => drained.push(buf),
                None => break,
            }
        }
        drained
    }

    /// Number of claimed, unreleased slots
    pub fn live(&self) -> u32 {
        let state = self.state.lock();
        if state.full != 0 {
            BUFFER_RING_SIZE
        } else {
            state.head.wrapping_sub(state.tail) & BUFFER_RING_SIZE_MASK
        }
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().full != 0
    }

    pub fn state(&self) -> TlsBufferRingState {
        *self.state.lock()
    }
}

impl Default for TlsBufferRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_until_full() {
        let ring = TlsBufferRing::new();
        for expected in 0..BUFFER_RING_SIZE {
            assert_eq!(ring.allocate_slot(), Some(expected));
        }
        assert!(ring.is_full());
        assert_eq!(ring.live(), BUFFER_RING_SIZE);

        let before = ring.state();
        assert_eq!(ring.allocate_slot(), None);
        assert_eq!(ring.state(), before);
    }

    #[test]
    fn test_release_makes_room() {
        let ring = TlsBufferRing::new();
        while ring.allocate_slot().is_some() {}

        assert_eq!(ring.release(), Some(0));
        assert!(!ring.is_full());
        assert_eq!(ring.live(), BUFFER_RING_SIZE - 1);
        assert_eq!(ring.allocate_slot(), Some(0));
        assert!(ring.is_full());
    }

    #[test]
    fn test_release_on_empty() {
        let ring = TlsBufferRing::new();
        assert_eq!(ring.release(), None);
        assert!(ring.pop().is_none());
        assert_eq!(ring.live(), 0);
    }

    #[test]
    fn test_store_truncates_but_keeps_length() {
        let ring = TlsBufferRing::new();
        let tup = ConnTuple::v4([10, 0, 0, 5], [10, 0, 0, 1], 40000, 443, 1);
        let payload = vec![0x5A; BUFFER_SIZE + 500];

        let slot = ring.allocate_slot().unwrap();
        assert_eq!(ring.store(slot, &tup, &payload), BUFFER_SIZE);

        let buf = ring.read(slot).unwrap();
        assert_eq!(buf.len as usize, BUFFER_SIZE + 500);
        assert!(buf.is_truncated());
        assert_eq!(buf.captured().len(), BUFFER_SIZE);
        assert_eq!(buf.tup, tup);
    }

    #[test]
    fn test_drain_is_fifo() {
        let ring = TlsBufferRing::new();
        let tup = ConnTuple::default();
        ring.push(&tup, b"first");
        ring.push(&tup, b"second");

        let drained = ring.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].captured(), b"first");
        assert_eq!(drained[1].captured(), b"second");
        assert_eq!(ring.live(), 0);
    }

    #[test]
    fn test_concurrent_pushes_claim_distinct_slots() {
        let ring = TlsBufferRing::new();
        let tup = ConnTuple::default();

        let mut claimed: Vec<u32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let ring = &ring;
                    s.spawn(move || {
                        (0..64)
                            .filter_map(|_| ring.push(&tup, b"x"))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(claimed.len(), BUFFER_RING_SIZE as usize);
        claimed.sort_unstable();
        claimed.dedup();
        assert_eq!(claimed.len(), BUFFER_RING_SIZE as usize);
        assert!(ring.is_full());
    }
}
