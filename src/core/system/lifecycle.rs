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

//! Lifecycle notifications
//!
//! Frontends subscribe here to learn when the machine starts, pauses,
//! resumes, resets or shuts down, for example to start and stop an audio
//! stream or to reset a frame pacer.

use std::fmt;

/// Machine lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// First run after construction
    Start,
    /// Any later run
    Resume,
    /// A run returned
    Pause,
    Reset,
    /// The machine is being dropped
    Terminate,
}

/// Handle returned by [`LifecycleManager::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type LifecycleCallback = Box<dyn FnMut(LifecycleEvent) + Send>;

/// Registry of lifecycle listeners
///
/// Listeners are called in registration order.
#[derive(Default)]
pub struct LifecycleManager {
    listeners: Vec<(ListenerId, LifecycleCallback)>,
    next_id: u64,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: LifecycleCallback) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, callback));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    pub fn broadcast(&mut self, event: LifecycleEvent) {
        log::debug!("Lifecycle: {:?}", event);
        for (_, callback) in &mut self.listeners {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
