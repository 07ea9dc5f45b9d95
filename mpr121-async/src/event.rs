//! Touch masks, edge detection and event delivery.

use core::cell::Cell;
use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::{Channel, TrySendError};
use heapless::Vec;

use crate::registers::{Electrode, ELECTRODE_COUNT, TOUCH_STATUS_MASK};

/// Number of matching events buffered for each subscriber before it starts
/// losing the oldest ones.
pub const EVENT_CAPACITY: usize = 32;
/// Maximum number of concurrent [`TouchSubscriber`]s per driver.
pub const MAX_SUBSCRIBERS: usize = 8;

/// Upper bound of events produced by one sample: a per-electrode event and an
/// aggregate event for each of the twelve electrodes.
pub const MAX_EVENTS_PER_SAMPLE: usize = 2 * ELECTRODE_COUNT;

/// The touch state of all twelve electrodes, one bit per electrode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchMask(u16);

impl TouchMask {
    /// No electrode touched.
    pub const EMPTY: Self = Self(0);

    /// Builds a mask from raw bits. Bits above 11 are discarded.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & TOUCH_STATUS_MASK)
    }

    /// Combines the touch status register pair, `(high << 8) | low`.
    pub const fn from_status(low: u8, high: u8) -> Self {
        Self::from_bits(((high as u16) << 8) | low as u16)
    }

    /// The 12-bit raw value.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns `true` if `electrode` registers a touch.
    pub const fn is_touched(self, electrode: Electrode) -> bool {
        self.0 & electrode.bit() != 0
    }

    /// Returns `true` if no electrode is touched.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the touched electrodes in ascending order.
    pub fn touched(self) -> impl Iterator<Item = Electrode> {
        Electrode::ALL
            .into_iter()
            .filter(move |electrode| self.is_touched(*electrode))
    }
}

impl fmt::Display for TouchMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, electrode) in self.touched().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{electrode}")?;
        }
        write!(f, "]")
    }
}

/// An edge observed between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEvent {
    /// The electrode went from released to touched.
    Pressed(Electrode),
    /// The electrode went from touched to released.
    Released(Electrode),
    /// Some electrode was pressed. Follows the matching [`TouchEvent::Pressed`].
    AnyPressed,
    /// Some electrode was released. Follows the matching [`TouchEvent::Released`].
    AnyReleased,
}

/// Selects which [`TouchEvent`]s a [`TouchSubscriber`] receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Presses of one electrode.
    Pressed(Electrode),
    /// Releases of one electrode.
    Released(Electrode),
    /// The aggregate press event.
    AnyPressed,
    /// The aggregate release event.
    AnyReleased,
    /// Every event.
    All,
}

impl EventFilter {
    /// Returns `true` if `event` passes the filter.
    pub fn matches(self, event: TouchEvent) -> bool {
        match (self, event) {
            (EventFilter::All, _) => true,
            (EventFilter::Pressed(wanted), TouchEvent::Pressed(electrode)) => wanted == electrode,
            (EventFilter::Released(wanted), TouchEvent::Released(electrode)) => {
                wanted == electrode
            }
            (EventFilter::AnyPressed, TouchEvent::AnyPressed) => true,
            (EventFilter::AnyReleased, TouchEvent::AnyReleased) => true,
            _ => false,
        }
    }
}

/// Events produced by a single sample.
pub type Edges = Vec<TouchEvent, MAX_EVENTS_PER_SAMPLE>;

/// Turns a sequence of touch masks into press and release events.
///
/// Only the net difference between consecutive samples is visible: an
/// electrode touched and released again between two samples produces nothing.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    previous: TouchMask,
}

impl EdgeDetector {
    /// Creates a detector whose previous sample has no electrode touched.
    pub const fn new() -> Self {
        Self {
            previous: TouchMask::EMPTY,
        }
    }

    /// The last sample passed to [`EdgeDetector::update`].
    pub fn previous(&self) -> TouchMask {
        self.previous
    }

    /// Records `mask` as the newest sample and returns the edges against the
    /// previous one.
    ///
    /// Events are ordered by ascending electrode; each per-electrode event is
    /// directly followed by its aggregate event.
    pub fn update(&mut self, mask: TouchMask) -> Edges {
        let mut edges = Edges::new();
        let changed = mask.bits() ^ self.previous.bits();
        if changed == 0 {
            return edges;
        }

        for electrode in Electrode::ALL {
            if changed & electrode.bit() == 0 {
                continue;
            }
            let pair = if mask.is_touched(electrode) {
                [TouchEvent::Pressed(electrode), TouchEvent::AnyPressed]
            } else {
                [TouchEvent::Released(electrode), TouchEvent::AnyReleased]
            };
            // Two events per electrode, bounded by MAX_EVENTS_PER_SAMPLE.
            let pushed = edges.extend_from_slice(&pair);
            debug_assert!(pushed.is_ok(), "edge batch overflow");
        }
        self.previous = mask;
        edges
    }
}

/// The filter and event queue of one subscriber.
///
/// A free slot has no filter and an empty queue.
pub(crate) struct SubscriberSlot {
    filter: BlockingMutex<CriticalSectionRawMutex, Cell<Option<EventFilter>>>,
    lost: BlockingMutex<CriticalSectionRawMutex, Cell<usize>>,
    queue: Channel<CriticalSectionRawMutex, TouchEvent, EVENT_CAPACITY>,
}

impl SubscriberSlot {
    const fn new() -> Self {
        Self {
            filter: BlockingMutex::new(Cell::new(None)),
            lost: BlockingMutex::new(Cell::new(0)),
            queue: Channel::new(),
        }
    }

    fn claim(&self, filter: EventFilter) -> bool {
        self.filter.lock(|current| {
            if current.get().is_some() {
                return false;
            }
            current.set(Some(filter));
            true
        })
    }

    fn release(&self) {
        self.filter.lock(|current| current.set(None));
        while self.queue.try_receive().is_ok() {}
        self.lost.lock(|lost| lost.set(0));
    }

    /// Queues `event` if it passes the filter, dropping the oldest queued
    /// event when full.
    fn deliver(&self, event: TouchEvent) {
        let wanted = self
            .filter
            .lock(|current| current.get().is_some_and(|filter| filter.matches(event)));
        if !wanted {
            return;
        }
        if let Err(TrySendError::Full(event)) = self.queue.try_send(event) {
            let _ = self.queue.try_receive();
            self.lost.lock(|lost| lost.set(lost.get() + 1));
            let _ = self.queue.try_send(event);
        }
    }

    fn take_lost(&self) -> usize {
        self.lost.lock(|lost| lost.replace(0))
    }
}

/// Hands every published event to the subscribers whose filter accepts it.
pub(crate) struct EventRouter {
    slots: [SubscriberSlot; MAX_SUBSCRIBERS],
}

impl EventRouter {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [const { SubscriberSlot::new() }; MAX_SUBSCRIBERS],
        }
    }

    /// Takes a free slot, or `None` when all are in use.
    pub(crate) fn subscribe(&self, filter: EventFilter) -> Option<TouchSubscriber<'_>> {
        self.slots
            .iter()
            .find(|slot| slot.claim(filter))
            .map(|slot| TouchSubscriber { slot, filter })
    }

    /// Never waits: a full subscriber queue loses its oldest event instead.
    pub(crate) fn publish(&self, event: TouchEvent) {
        for slot in &self.slots {
            slot.deliver(event);
        }
    }
}

/// Receives the events matching an [`EventFilter`].
///
/// Obtained from [`Mpr121::subscribe`](crate::touch::Mpr121::subscribe) and its
/// `on_*` shorthands. Each subscriber queues up to [`EVENT_CAPACITY`] events
/// that pass its own filter, so handling them never holds up the poller and
/// unrelated traffic never displaces them. Beyond that the oldest are lost.
/// Dropping the subscriber frees its slot.
pub struct TouchSubscriber<'a> {
    slot: &'a SubscriberSlot,
    filter: EventFilter,
}

impl TouchSubscriber<'_> {
    /// The filter this subscriber was created with.
    pub fn filter(&self) -> EventFilter {
        self.filter
    }

    /// Waits for the next matching event.
    pub async fn next(&mut self) -> TouchEvent {
        self.report_lost();
        self.slot.queue.receive().await
    }

    /// Returns the next matching event if one is already queued.
    pub fn try_next(&mut self) -> Option<TouchEvent> {
        self.report_lost();
        self.slot.queue.try_receive().ok()
    }

    fn report_lost(&self) {
        let lost = self.slot.take_lost();
        if lost > 0 {
            log::warn!("Touch subscriber {:?} lagged, {lost} events lost", self.filter);
        }
    }
}

impl Drop for TouchSubscriber<'_> {
    fn drop(&mut self) {
        self.slot.release();
    }
}
