//! Bus transport interface
//!
//! Devices register id/mask filters and send fire-and-forget frames. Inbound
//! frames are handed out one at a time together with the observers whose
//! filter matched, in FIFO order per direction.

use crate::types::{CanFrame, DeviceId};
use std::collections::VecDeque;

/// Receive filter registered by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFilter {
    /// Device that wants the frames
    pub observer: DeviceId,
    /// ID to match
    pub id: u32,
    /// Bits of the ID that must match
    pub mask: u32,
    /// Match extended (29-bit) frames instead of standard ones
    pub extended: bool,
}

impl BusFilter {
    pub fn new(observer: DeviceId, id: u32, mask: u32, extended: bool) -> Self {
        Self {
            observer,
            id,
            mask,
            extended,
        }
    }

    /// Check whether a frame passes this filter
    pub fn matches(&self, frame: &CanFrame) -> bool {
        frame.extended == self.extended && (frame.id & self.mask) == (self.id & self.mask)
    }
}

/// A bus the core can attach to and send on
pub trait CanBus {
    /// Register a receive filter
    fn attach(&mut self, filter: BusFilter);

    /// Remove every filter registered by an observer
    fn detach(&mut self, observer: DeviceId);

    /// Queue a frame for transmission
    fn send_frame(&mut self, frame: CanFrame);

    /// Take the next inbound frame and the observers it should be delivered to
    fn receive(&mut self) -> Option<(CanFrame, Vec<DeviceId>)>;
}

/// In-memory bus with separate outbound and inbound queues
#[derive(Debug, Default)]
pub struct SimBus {
    filters: Vec<BusFilter>,
    outbox: VecDeque<CanFrame>,
    inbox: VecDeque<CanFrame>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame as if it had arrived from the wire
    pub fn inject(&mut self, frame: CanFrame) {
        self.inbox.push_back(frame);
    }

    /// Drain every frame sent so far, oldest first
    pub fn take_sent(&mut self) -> Vec<CanFrame> {
        self.outbox.drain(..).collect()
    }

    /// Frames sent but not yet drained
    pub fn sent(&self) -> impl Iterator<Item = &CanFrame> {
        self.outbox.iter()
    }

    /// Registered filters
    pub fn filters(&self) -> &[BusFilter] {
        &self.filters
    }

    /// Observers whose filter matches a frame, in registration order
    pub fn observers_for(&self, frame: &CanFrame) -> Vec<DeviceId> {
        let mut observers = Vec::new();
        for filter in self.filters.iter().filter(|f| f.matches(frame)) {
            if !observers.contains(&filter.observer) {
                observers.push(filter.observer);
            }
        }
        observers
    }
}

impl CanBus for SimBus {
    fn attach(&mut self, filter: BusFilter) {
        log::debug!(
            "Attach {:?}: id 0x{:X} mask 0x{:X} ext {}",
            filter.observer,
            filter.id,
            filter.mask,
            filter.extended
        );
        self.filters.push(filter);
    }

    fn detach(&mut self, observer: DeviceId) {
        self.filters.retain(|f| f.observer != observer);
    }

    fn send_frame(&mut self, frame: CanFrame) {
        log::trace!("tx {}", frame);
        self.outbox.push_back(frame);
    }

    fn receive(&mut self) -> Option<(CanFrame, Vec<DeviceId>)> {
        let frame = self.inbox.pop_front()?;
        let observers = self.observers_for(&frame);
        if observers.is_empty() {
            log::trace!("rx {} (no observer)", frame);
        }
        Some((frame, observers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_mask_matching() {
        let filter = BusFilter::new(DeviceId::Dmoc645, 0x230, 0x7F0, false);
        assert!(filter.matches(&CanFrame::standard(0x23A, 8)));
        assert!(filter.matches(&CanFrame::standard(0x23B, 8)));
        assert!(!filter.matches(&CanFrame::standard(0x650, 8)));
        assert!(!filter.matches(&CanFrame::new(0x23A, true, 8))); // Wrong frame format
    }

    #[test]
    fn test_receive_delivers_to_matching_observers() {
        let mut bus = SimBus::new();
        bus.attach(BusFilter::new(DeviceId::CanAccelerator, 0x7E8, 0x7FF, false));
        bus.attach(BusFilter::new(DeviceId::Dmoc645, 0x650, 0x7F0, false));

        bus.inject(CanFrame::standard(0x7E8, 8));
        bus.inject(CanFrame::standard(0x651, 8));
        bus.inject(CanFrame::standard(0x100, 8));

        assert_eq!(bus.receive().unwrap().1, vec![DeviceId::CanAccelerator]);
        assert_eq!(bus.receive().unwrap().1, vec![DeviceId::Dmoc645]);
        assert!(bus.receive().unwrap().1.is_empty());
        assert!(bus.receive().is_none());
    }

    #[test]
    fn test_detach_and_sent_queue() {
        let mut bus = SimBus::new();
        bus.attach(BusFilter::new(DeviceId::CanBrake, 0x768, 0x7FF, false));
        bus.detach(DeviceId::CanBrake);
        assert!(bus.filters().is_empty());

        bus.send_frame(CanFrame::standard(0x760, 8));
        bus.send_frame(CanFrame::standard(0x232, 8));
        let sent = bus.take_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].id, 0x760);
        assert_eq!(bus.sent().count(), 0);
    }
}
