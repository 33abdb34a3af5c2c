// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Ping-pong multibuffering primitives.

The main idea is,

1.  We have exactly two instances of each staging resource.
2.  The frame counter picks one of them as the "active" slot for this frame.
3.  The other slot is the complementary one: free for the CPU to write, or holding
    the previous frame's GPU result.

Nothing here synchronizes anything.  Non-overlapping access is a consequence of the
index arithmetic alone: the slot touched by the GPU in frame N is only touched by the
CPU in frame N+1.
*/

use std::fmt::{Display, Formatter};
use std::ops::{Index, IndexMut};

/**
One of the two slots of a double-buffered resource.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// The complementary slot.
    #[inline]
    pub const fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// 0 for [Slot::A], 1 for [Slot::B].  Matches `frame % 2`.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

impl Display for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index())
    }
}

/**
A monotonically increasing frame counter.

The counter is the only token shared between the upload and download paths.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameIndex(u64);

impl FrameIndex {
    pub const ZERO: FrameIndex = FrameIndex(0);

    pub const fn new(frame: u64) -> Self {
        FrameIndex(frame)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The slot the GPU works on this frame (`frame % 2`).
    #[inline]
    pub const fn slot(self) -> Slot {
        if self.0 % 2 == 0 { Slot::A } else { Slot::B }
    }

    /// The slot the CPU works on this frame (`(frame + 1) % 2`).
    #[inline]
    pub const fn next_slot(self) -> Slot {
        self.slot().other()
    }

    /// The following frame.  Wraps rather than panicking; at one frame per
    /// nanosecond that is still centuries away.
    #[inline]
    pub const fn successor(self) -> FrameIndex {
        FrameIndex(self.0.wrapping_add(1))
    }

    pub(crate) fn advance(&mut self) {
        *self = self.successor();
    }
}

impl Display for FrameIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/**
Two instances of `T`, addressed by [Slot].
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingPong<T> {
    slots: [T; 2],
}

impl<T> PingPong<T> {
    pub fn new(a: T, b: T) -> Self {
        PingPong { slots: [a, b] }
    }

    pub fn from_fn<F: FnMut(Slot) -> T>(mut f: F) -> Self {
        let a = f(Slot::A);
        let b = f(Slot::B);
        PingPong::new(a, b)
    }

    /// Both slots, A first.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &T)> {
        [Slot::A, Slot::B].into_iter().zip(self.slots.iter())
    }

    pub fn into_inner(self) -> [T; 2] {
        self.slots
    }
}

impl<T> Index<Slot> for PingPong<T> {
    type Output = T;
    fn index(&self, slot: Slot) -> &Self::Output {
        &self.slots[slot.index()]
    }
}

impl<T> IndexMut<Slot> for PingPong<T> {
    fn index_mut(&mut self, slot: Slot) -> &mut Self::Output {
        &mut self.slots[slot.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_is_complementary() {
        let mut frame = FrameIndex::ZERO;
        for _ in 0..1000 {
            assert_ne!(frame.slot(), frame.next_slot());
            assert_eq!(frame.slot().index(), (frame.get() % 2) as usize);
            assert_eq!(frame.next_slot().index(), ((frame.get() + 1) % 2) as usize);
            frame.advance();
        }
    }

    #[test]
    fn next_slot_becomes_slot() {
        //what the CPU wrote this frame is what the GPU consumes next frame
        let frame = FrameIndex::new(41);
        assert_eq!(frame.next_slot(), frame.successor().slot());
    }

    #[test]
    fn successor_wraps() {
        let last = FrameIndex::new(u64::MAX);
        assert_eq!(last.successor(), FrameIndex::ZERO);
        assert_ne!(last.slot(), last.successor().slot());
    }

    #[test]
    fn ping_pong_indexing() {
        let mut pp = PingPong::from_fn(|slot| slot.index() * 10);
        assert_eq!(pp[Slot::A], 0);
        assert_eq!(pp[Slot::B], 10);
        pp[Slot::B] = 7;
        let collected: Vec<_> = pp.iter().map(|(s, v)| (s, *v)).collect();
        assert_eq!(collected, vec![(Slot::A, 0), (Slot::B, 7)]);
    }
}
