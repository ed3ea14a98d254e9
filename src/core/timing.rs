// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cycle-driven event scheduler
//!
//! All time in the machine is measured in CPU cycles since reset. Devices and
//! host code register named events and schedule them at future cycles. The
//! executor reports elapsed cycles after every execution unit and the scheduler
//! fires everything that has come due.
//!
//! # Ordering
//!
//! Events fire in ascending deadline order. Events sharing a deadline fire in
//! the order they were scheduled (FIFO), which keeps runs reproducible.
//!
//! While an event is being served, [`Scheduler::current_cycle`] equals that
//! event's deadline, so follow-up scheduling is anchored to when the event was
//! due rather than to when the executor noticed it.
//!
//! # Example
//!
//! ```
//! use vmcore::core::timing::{EventAction, NoDevices, Scheduler};
//! use std::sync::{Arc, Mutex};
//!
//! let mut scheduler = Scheduler::new();
//! let fired = Arc::new(Mutex::new(Vec::new()));
//!
//! let log = fired.clone();
//! let event = scheduler
//!     .register_event("example", Box::new(move |e| {
//!         log.lock().unwrap().push(e.deadline);
//!         EventAction::Continue
//!     }))
//!     .unwrap();
//!
//! scheduler.schedule(event, 1000);
//! scheduler.advance_to(999, &mut NoDevices);
//! assert!(fired.lock().unwrap().is_empty());
//!
//! scheduler.advance_to(1000, &mut NoDevices);
//! assert_eq!(*fired.lock().unwrap(), vec![1000]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bincode::{Decode, Encode};

use crate::core::error::{ConfigError, SerializationError};
use crate::core::memory::DeviceId;

/// Absolute time in CPU cycles since reset
pub type Cycle = u64;

/// Handle of a registered event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub usize);

/// What the executor should do after an event has been served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Continue,
    /// Stop the executor at the current unit boundary
    Stop,
}

/// Information passed to host callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredEvent {
    pub id: EventId,
    pub deadline: Cycle,
}

/// Host callback invoked when an event fires
pub type EventCallback = Box<dyn FnMut(FiredEvent) -> EventAction + Send>;

/// Deferred scheduler operation queued by a device handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRequest {
    pub device: DeviceId,
    pub tag: u32,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Fire at this absolute cycle
    Schedule(Cycle),
    Cancel,
}

/// Routes device-owned events to their handlers
///
/// Implemented by the address space, which owns the devices.
pub trait EventDispatcher {
    /// Serve event `tag` of `device` at cycle `now`
    fn dispatch_device(&mut self, device: DeviceId, tag: u32, now: Cycle) -> EventAction;

    /// Drain scheduler requests queued by handlers
    fn take_requests(&mut self) -> Vec<EventRequest>;
}

/// Dispatcher for schedulers that only carry host callbacks
pub struct NoDevices;

impl EventDispatcher for NoDevices {
    fn dispatch_device(&mut self, device: DeviceId, tag: u32, _now: Cycle) -> EventAction {
        log::warn!("No device {:?} to serve event tag {}", device, tag);
        EventAction::Continue
    }

    fn take_requests(&mut self) -> Vec<EventRequest> {
        Vec::new()
    }
}

enum EventOwner {
    Device { device: DeviceId, tag: u32 },
    // Taken out while the callback runs
    Callback(Option<EventCallback>),
}

impl fmt::Debug for EventOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOwner::Device { device, tag } => f
                .debug_struct("Device")
                .field("device", device)
                .field("tag", tag)
                .finish(),
            EventOwner::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// A registered event
#[derive(Debug)]
struct EventSlot {
    name: String,
    period: Option<Cycle>,
    owner: EventOwner,
    /// Queue key while scheduled
    pending: Option<(Cycle, u64)>,
}

/// Pending event in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PendingEvent {
    pub name: String,
    /// Cycles from the snapshot's current cycle until the deadline
    pub remaining: Cycle,
    pub period: Option<Cycle>,
}

/// Snapshot form of the scheduler
///
/// Pending events are stored in firing order so that re-inserting them in
/// sequence preserves same-deadline ordering.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SchedulerState {
    pub current_cycle: Cycle,
    pub pending: Vec<PendingEvent>,
}

/// Event scheduler
#[derive(Debug, Default)]
pub struct Scheduler {
    now: Cycle,
    next_sequence: u64,
    events: Vec<EventSlot>,
    queue: BTreeMap<(Cycle, u64), EventId>,
    by_name: HashMap<String, EventId>,
    device_events: HashMap<(DeviceId, u32), EventId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &mut self,
        name: &str,
        period: Option<Cycle>,
        owner: EventOwner,
    ) -> Result<EventId, ConfigError> {
        if self.by_name.contains_key(name) {
            return Err(ConfigError::DuplicateEvent(name.to_string()));
        }
        if period == Some(0) {
            return Err(ConfigError::InvalidTiming(format!(
                "event '{}' has a zero period",
                name
            )));
        }

        let id = EventId(self.events.len());
        self.events.push(EventSlot {
            name: name.to_string(),
            period,
            owner,
            pending: None,
        });
        self.by_name.insert(name.to_string(), id);
        log::debug!("Registered event '{}' as {:?} (period {:?})", name, id, period);
        Ok(id)
    }

    /// Register a one-shot host event
    pub fn register_event(
        &mut self,
        name: &str,
        callback: EventCallback,
    ) -> Result<EventId, ConfigError> {
        self.register(name, None, EventOwner::Callback(Some(callback)))
    }

    /// Register a host event that re-arms itself every `period` cycles
    pub fn register_periodic_event(
        &mut self,
        name: &str,
        period: Cycle,
        callback: EventCallback,
    ) -> Result<EventId, ConfigError> {
        self.register(name, Some(period), EventOwner::Callback(Some(callback)))
    }

    /// Register an event served by `device`'s `on_event(tag)`
    pub fn register_device_event(
        &mut self,
        name: &str,
        device: DeviceId,
        tag: u32,
        period: Option<Cycle>,
    ) -> Result<EventId, ConfigError> {
        let id = self.register(name, period, EventOwner::Device { device, tag })?;
        self.device_events.insert((device, tag), id);
        Ok(id)
    }

    /// Look up an event by name
    pub fn event_id(&self, name: &str) -> Option<EventId> {
        self.by_name.get(name).copied()
    }

    pub fn event_name(&self, id: EventId) -> Option<&str> {
        self.events.get(id.0).map(|slot| slot.name.as_str())
    }

    /// Current machine cycle
    #[inline(always)]
    pub fn current_cycle(&self) -> Cycle {
        self.now
    }

    /// Schedule `id` to fire `delay` cycles from now
    pub fn schedule(&mut self, id: EventId, delay: Cycle) {
        self.schedule_at(id, self.now.saturating_add(delay));
    }

    /// Schedule `id` at an absolute cycle
    ///
    /// Deadlines in the past fire on the next advance. A pending instance of the
    /// same event is replaced.
    pub fn schedule_at(&mut self, id: EventId, deadline: Cycle) {
        let deadline = deadline.max(self.now);
        let sequence = self.next_sequence;
        let Some(slot) = self.events.get_mut(id.0) else {
            log::warn!("Attempted to schedule unknown event {:?}", id);
            return;
        };

        if let Some(key) = slot.pending.take() {
            self.queue.remove(&key);
        }
        self.next_sequence += 1;
        slot.pending = Some((deadline, sequence));
        self.queue.insert((deadline, sequence), id);
        log::trace!("Scheduled '{}' at cycle {}", slot.name, deadline);
    }

    /// Remove a pending event; no-op if it is not scheduled
    pub fn cancel(&mut self, id: EventId) {
        if let Some(slot) = self.events.get_mut(id.0) {
            if let Some(key) = slot.pending.take() {
                self.queue.remove(&key);
                log::trace!("Cancelled '{}'", slot.name);
            }
        }
    }

    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.events
            .get(id.0)
            .is_some_and(|slot| slot.pending.is_some())
    }

    /// Deadline of a pending event
    pub fn deadline(&self, id: EventId) -> Option<Cycle> {
        self.events
            .get(id.0)
            .and_then(|slot| slot.pending.map(|(deadline, _)| deadline))
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Cycle> {
        self.queue.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Cycles until the earliest pending event, `None` when nothing is pending
    pub fn cycles_until_next_event(&self) -> Option<Cycle> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_sub(self.now))
    }

    /// Apply requests queued by device handlers
    pub fn apply_requests(&mut self, requests: Vec<EventRequest>) {
        for request in requests {
            let Some(&id) = self.device_events.get(&(request.device, request.tag)) else {
                log::warn!(
                    "Device {:?} requested unregistered event tag {}",
                    request.device,
                    request.tag
                );
                continue;
            };
            match request.kind {
                RequestKind::Schedule(deadline) => self.schedule_at(id, deadline),
                RequestKind::Cancel => self.cancel(id),
            }
        }
    }

    /// Advance time to `target`, firing every event due on the way
    ///
    /// Returns [`EventAction::Stop`] if any handler asked the executor to stop.
    /// All due events are still served in that case.
    pub fn advance_to(&mut self, target: Cycle, dispatcher: &mut dyn EventDispatcher) -> EventAction {
        let mut action = EventAction::Continue;

        while let Some((&(deadline, sequence), &id)) = self.queue.first_key_value() {
            if deadline > target {
                break;
            }
            self.queue.remove(&(deadline, sequence));
            self.now = deadline;

            let slot = &mut self.events[id.0];
            slot.pending = None;
            log::trace!("Firing '{}' at cycle {}", slot.name, deadline);

            // Re-arm before dispatch so the handler may cancel or replace it
            if let Some(period) = slot.period {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                let next = deadline.saturating_add(period);
                slot.pending = Some((next, sequence));
                self.queue.insert((next, sequence), id);
            }

            let result = match &mut slot.owner {
                EventOwner::Device { device, tag } => {
                    let (device, tag) = (*device, *tag);
                    let result = dispatcher.dispatch_device(device, tag, deadline);
                    let requests = dispatcher.take_requests();
                    self.apply_requests(requests);
                    result
                }
                EventOwner::Callback(callback) => match callback.take() {
                    Some(mut callback) => {
                        let result = callback(FiredEvent { id, deadline });
                        if let EventOwner::Callback(slot) = &mut self.events[id.0].owner {
                            *slot = Some(callback);
                        }
                        result
                    }
                    None => EventAction::Continue,
                },
            };

            if result == EventAction::Stop {
                action = EventAction::Stop;
            }
        }

        self.now = self.now.max(target);
        action
    }

    /// Drop every pending event
    ///
    /// A hard reset also rewinds the cycle counter to zero.
    pub fn reset(&mut self, hard: bool) {
        self.queue.clear();
        for slot in &mut self.events {
            slot.pending = None;
        }
        if hard {
            self.now = 0;
            self.next_sequence = 0;
        }
    }

    /// Capture pending events relative to the current cycle
    pub fn state(&self) -> SchedulerState {
        let pending = self
            .queue
            .iter()
            .map(|(&(deadline, _), &id)| {
                let slot = &self.events[id.0];
                PendingEvent {
                    name: slot.name.clone(),
                    remaining: deadline - self.now,
                    period: slot.period,
                }
            })
            .collect();

        SchedulerState {
            current_cycle: self.now,
            pending,
        }
    }

    /// Check that `state` can be rebuilt here
    ///
    /// Every event must be registered, periods must be non-zero, and no
    /// deadline (nor its first re-arm) may run past the end of time.
    pub fn validate(&self, state: &SchedulerState) -> Result<(), SerializationError> {
        for event in &state.pending {
            if !self.by_name.contains_key(&event.name) {
                return Err(SerializationError::UnknownEvent(event.name.clone()));
            }
            let invalid = |reason: String| SerializationError::InvalidEvent {
                name: event.name.clone(),
                reason,
            };

            if event.period == Some(0) {
                return Err(invalid("zero period".to_string()));
            }
            let deadline = state.current_cycle.checked_add(event.remaining).ok_or_else(|| {
                invalid(format!(
                    "deadline {} + {} overflows",
                    state.current_cycle, event.remaining
                ))
            })?;
            if let Some(period) = event.period {
                if deadline.checked_add(period).is_none() {
                    return Err(invalid(format!(
                        "re-arm at {} + {} overflows",
                        deadline, period
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rebuild the queue from a snapshot accepted by [`validate`](Self::validate)
    pub fn restore(&mut self, state: &SchedulerState) {
        self.reset(true);
        self.now = state.current_cycle;
        for event in &state.pending {
            if let Some(id) = self.event_id(&event.name) {
                self.events[id.0].period = event.period;
                self.schedule_at(id, state.current_cycle.saturating_add(event.remaining));
            }
        }
    }
}
