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

use super::{interpret_one, Hardware, UnitOutcome};
use crate::core::timing::Cycle;

/// Fetch-decode-execute strategy
///
/// Every unit is a single instruction, so events and interrupts are observed
/// between any two instructions without further bookkeeping.
#[derive(Debug, Default)]
pub struct Interpreter {
    executed: u64,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions retired since creation
    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub(super) fn run_unit(&mut self, hw: &mut Hardware, now: Cycle) -> UnitOutcome {
        let unit = interpret_one(hw, now);
        self.executed += unit.instructions;
        unit
    }
}
