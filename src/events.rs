//! Script dispatch queue.
//!
//! Dispatches are produced by:
//! - Timer expiries (via [`TimerDelegate`])
//! - Debounced switch edges
//! - Condition changes of enabled slots (trigger scripts)
//! - `usr(n)` calls made by running scripts
//! - Poll command sequences
//!
//! and consumed by the scheduler, one at a time, in FIFO order.  A script
//! never runs nested inside another: whatever it raises lands at the back
//! of the queue, so cascades drain breadth-first.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ TimerBank   │────▶│              │     │              │
//! │ Switches    │────▶│ DispatchQueue│────▶│  SimService  │
//! │ Triggers    │────▶│  (bounded)   │     │  (consumer)  │
//! │ usr(n)      │────▶│              │     │              │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use heapless::Deque;
use log::warn;

use crate::app::ports::TimerDelegate;
use crate::catalog::DeviceKind;
use crate::registry::{MAX_ADDRESS, SlotRef};
use crate::script::ScriptBinding;

/// One trigger slot per sensor and module address.
pub const TRIGGER_SLOTS: usize = 2 * MAX_ADDRESS as usize;

/// Pending dispatches that are not triggers (timers, switches, `usr(n)`,
/// poll commands).
pub const OTHER_DISPATCH_CAP: usize = 64;

/// Maximum number of pending dispatches. Triggers are coalesced per slot,
/// so they can never overflow the queue.
pub const DISPATCH_QUEUE_CAP: usize = TRIGGER_SLOTS + OTHER_DISPATCH_CAP;

const BITMAP_WORDS: usize = TRIGGER_SLOTS.div_ceil(64);

/// One pending script invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub binding: ScriptBinding,
    /// Device bound to `this` while the script runs.
    pub this: Option<SlotRef>,
}

impl Dispatch {
    pub fn new(binding: ScriptBinding) -> Self {
        Self { binding, this: None }
    }

    pub fn on_device(binding: ScriptBinding, slot: SlotRef) -> Self {
        Self {
            binding,
            this: Some(slot),
        }
    }

    fn trigger_slot(&self) -> Option<usize> {
        match self.binding {
            ScriptBinding::Trigger(slot) => trigger_index(slot),
            _ => None,
        }
    }
}

fn trigger_index(slot: SlotRef) -> Option<usize> {
    let offset = match slot.kind {
        DeviceKind::Sensor => 0,
        DeviceKind::Module => usize::from(MAX_ADDRESS),
    };
    usize::from(slot.address)
        .checked_sub(1)
        .filter(|i| *i < usize::from(MAX_ADDRESS))
        .map(|i| offset + i)
}

#[derive(Debug, Default)]
pub struct DispatchQueue {
    queue: Deque<Dispatch, DISPATCH_QUEUE_CAP>,
    /// Slots with a trigger waiting in `queue`.
    pending: [u64; BITMAP_WORDS],
    others: usize,
    dropped: u32,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dispatch. A trigger for a slot that already has one queued
    /// is merged into it. Returns `false` if the dispatch was dropped
    /// because the non-trigger share of the queue is full.
    pub fn push(&mut self, dispatch: Dispatch) -> bool {
        match dispatch.trigger_slot() {
            Some(i) => {
                let (word, bit) = (i / 64, 1u64 << (i % 64));
                if self.pending[word] & bit != 0 {
                    return true;
                }
                if self.queue.push_back(dispatch).is_err() {
                    return self.drop_dispatch(None);
                }
                self.pending[word] |= bit;
                true
            }
            None if self.others >= OTHER_DISPATCH_CAP => self.drop_dispatch(Some(dispatch)),
            None => match self.queue.push_back(dispatch) {
                Ok(()) => {
                    self.others += 1;
                    true
                }
                Err(d) => self.drop_dispatch(Some(d)),
            },
        }
    }

    fn drop_dispatch(&mut self, dispatch: Option<Dispatch>) -> bool {
        self.dropped = self.dropped.saturating_add(1);
        match dispatch {
            Some(d) => warn!("Dispatch queue full, dropping {}", d.binding),
            None => warn!("Dispatch queue full, dropping trigger"),
        }
        false
    }

    pub fn pop(&mut self) -> Option<Dispatch> {
        let dispatch = self.queue.pop_front()?;
        match dispatch.trigger_slot() {
            Some(i) => self.pending[i / 64] &= !(1u64 << (i % 64)),
            None => self.others -= 1,
        }
        Some(dispatch)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending = [0; BITMAP_WORDS];
        self.others = 0;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Dispatches dropped on overflow since creation.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl TimerDelegate for DispatchQueue {
    fn on_timer_expired(&mut self, _id: u8, event: ScriptBinding) {
        self.push(Dispatch::new(event));
    }
}
