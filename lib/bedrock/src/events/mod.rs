//! A publish/subscribe event bus over copy-on-write listener snapshots.
//!
//! The listener set is never mutated in place. Registration and
//! unregistration clone the current snapshot and publish the clone under the
//! exclusive side of a read/write lock; dispatch captures the snapshot
//! pointer under the shared side and walks it with no lock held. Dispatch is
//! the expected hot path, so it stays cheap and safe; the price is an O(n)
//! clone per registration change.
//!
//! Deliveries are protected by a per-listener rundown: a dispatch pins every
//! still-live record in its snapshot before walking, and
//! [`unregister`](EventBus::unregister) drains that rundown, so a listener
//! is never torn down while a delivery to it is in flight. An in-flight
//! dispatch that captured the listener still delivers to it, and only then
//! does `unregister` return. The corollary: **never unregister a listener
//! from inside `on_event` on the same bus**; the walk is holding the
//! records pinned and the drain would wait on itself.

use std::fmt;

use log::warn;

use crate::mem::{SharedBox, SharedInner};
use crate::status::Status;
use crate::sync::{ReadWriteLock, RundownProtection};

/// The capability a listener provides to the bus.
///
/// `on_event` may be called from any thread that dispatches, concurrently
/// with other deliveries to the same listener. The bus reference allows
/// registering further listeners or dispatching follow-up events from
/// inside a delivery (but see the module docs about unregistering).
pub trait EventListener<E>: Send + Sync {
    fn on_event(&self, event: &E, bus: &EventBus<E>);
}

/// An opaque 128-bit listener identity, unique per registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u128);

impl ListenerId {
    fn generate() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// One registration. Shared between snapshots, so the rundown drained by an
/// unregister is the same object an in-flight dispatch pinned.
struct ListenerRecord<E: 'static> {
    id: ListenerId,
    rundown: RundownProtection,
    listener: SharedBox<dyn EventListener<E>>,
}

/// An immutable, reference-counted listener list.
type Snapshot<E> = SharedBox<Vec<SharedBox<ListenerRecord<E>>>>;

/// See the [module docs](self).
pub struct EventBus<E: 'static> {
    /// The current snapshot; `None` before the first registration and after
    /// rundown. Only ever replaced wholesale, never mutated.
    listeners: ReadWriteLock<Option<Snapshot<E>>>,
    gate: RundownProtection,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Result<Self, Status> {
        Ok(Self {
            listeners: ReadWriteLock::new(None)?,
            gate: RundownProtection::new(),
        })
    }

    /// Registers `listener` and returns its identity. Fails with `TooLate`
    /// after [`rundown`](Self::rundown), and with `InsufficientResources`
    /// if the snapshot clone cannot be allocated (in which case the live
    /// snapshot is untouched).
    pub fn register<L>(&self, listener: SharedBox<L>) -> Result<ListenerId, Status>
    where
        L: EventListener<E> + 'static,
    {
        let Some(_gate) = self.gate.acquire() else {
            return Err(Status::TooLate);
        };

        let id = ListenerId::generate();
        let record = SharedBox::new(ListenerRecord {
            id,
            rundown: RundownProtection::new(),
            listener: unsize_listener(listener),
        })?;

        let mut listeners = self.listeners.write();

        let mut records = match listeners.as_ref() {
            Some(current) => clone_records(current, None),
            None => Vec::new(),
        };
        records.push(record);

        // build the new snapshot before touching the slot; a failure here
        // leaves the live snapshot exactly as it was
        *listeners = Some(SharedBox::new(records)?);

        Ok(id)
    }

    /// Unregisters the listener behind `id`, draining any in-flight
    /// deliveries to it first: when this returns, its `on_event` has
    /// returned and will never be called again.
    pub fn unregister(&self, id: ListenerId) -> Result<(), Status> {
        let Some(_gate) = self.gate.acquire() else {
            return Err(Status::TooLate);
        };

        // Locate under the shared lock, then drain with no lock held:
        // in-flight dispatches stay free to finish their deliveries (and
        // nested ones to capture the snapshot), which is exactly what
        // releases us. The rundown object is shared between snapshots, so
        // draining this record drains the registration everywhere.
        let record = {
            let listeners = self.listeners.read();
            let Some(snapshot) = listeners.as_ref() else {
                return Err(Status::NotFound);
            };
            let Some(record) = snapshot.iter().find(|record| record.id == id) else {
                return Err(Status::NotFound);
            };
            record.clone()
        };
        record.rundown.wait_for_release();

        // Publish a snapshot without the record. If the clone fails we keep
        // the stale snapshot: the record is drained, every dispatch skips
        // it, and the next successful clone drops it, so this is not an
        // error worth surfacing.
        {
            let mut listeners = self.listeners.write();
            if let Some(current) = listeners.as_ref() {
                let records = clone_records(current, Some(id));
                match SharedBox::new(records) {
                    Ok(snapshot) => *listeners = Some(snapshot),
                    Err(status) => {
                        warn!("listener list clone failed during unregister ({status}); keeping stale snapshot");
                    }
                }
            }
        }

        Ok(())
    }

    /// Delivers `event` to every listener in the current snapshot, in
    /// snapshot order. Fails with `TooLate` after [`rundown`](Self::rundown).
    pub fn dispatch(&self, event: &E) -> Result<(), Status> {
        let Some(_gate) = self.gate.acquire() else {
            return Err(Status::TooLate);
        };

        // capture the snapshot pointer with minimal lock scope
        let snapshot = { self.listeners.read().clone() };
        let Some(snapshot) = snapshot else {
            return Ok(());
        };

        // Pin the whole walk up front: a record whose rundown is already
        // drained (a racing unregister) is skipped, and everything pinned
        // here is guaranteed its delivery before that unregister returns.
        let mut pinned = Vec::with_capacity(snapshot.len());
        for record in snapshot.iter() {
            if let Some(guard) = record.rundown.acquire() {
                pinned.push((record, guard));
            }
        }

        for (record, guard) in pinned {
            record.listener.on_event(event, self);
            // release per delivery, so an unregister of this listener can
            // return while the walk continues
            drop(guard);
        }

        Ok(())
    }

    /// Shuts the bus down: closes the gate, drains every listener's
    /// in-flight deliveries, and drops the snapshot. Afterwards
    /// [`register`](Self::register), [`unregister`](Self::unregister) and
    /// [`dispatch`](Self::dispatch) all return `TooLate`. Idempotent.
    pub fn rundown(&self) {
        // block further bus operations
        self.gate.wait_for_release();

        {
            let listeners = self.listeners.read();
            if let Some(snapshot) = listeners.as_ref() {
                for record in snapshot.iter() {
                    record.rundown.wait_for_release();
                }
            }
        }

        *self.listeners.write() = None;
    }

    /// The number of live (not yet drained) registrations in the current
    /// snapshot.
    pub fn listener_count(&self) -> usize {
        let listeners = self.listeners.read();
        match listeners.as_ref() {
            Some(snapshot) => snapshot
                .iter()
                .filter(|record| !record.rundown.is_run_down())
                .count(),
            None => 0,
        }
    }
}

impl<E: 'static> Drop for EventBus<E> {
    fn drop(&mut self) {
        self.rundown();
    }
}

/// Clones the record list, skipping `without` and anything already drained.
fn clone_records<E: 'static>(
    current: &[SharedBox<ListenerRecord<E>>],
    without: Option<ListenerId>,
) -> Vec<SharedBox<ListenerRecord<E>>> {
    current
        .iter()
        .filter(|record| Some(record.id) != without)
        .filter(|record| !record.rundown.is_run_down())
        .cloned()
        .collect()
}

/// Widens a concrete listener box to the trait-object type the records
/// store. The count and allocation base carry over; only the pointer type
/// changes.
fn unsize_listener<E, L>(listener: SharedBox<L>) -> SharedBox<dyn EventListener<E>>
where
    E: 'static,
    L: EventListener<E> + 'static,
{
    let raw: *mut SharedInner<dyn EventListener<E>> = SharedBox::<L>::into_raw(listener);
    // SAFETY: same allocation, only the pointer type widened.
    unsafe { SharedBox::from_raw(raw) }
}
