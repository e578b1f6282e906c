// SPDX-License-Identifier: AGPL-3.0

//! Execution traces and compiled artifacts consumed by the analysis crates

pub mod artifact;
pub mod location;
pub mod opcodes;

pub use artifact::{ByteSpan, CompiledArtifact, ContractContext, SourceUnit};
pub use location::{LineIndex, Location, Position, SourceRange};
pub use opcodes::{insn_len, Opcode};

use alloy_primitives::{Address, U256};
use evmcov_constants::{ADDRESS_SIZE, CALLEE_STACK_OFFSET, WORD_SIZE};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// One executed instruction, in the shape of a geth struct log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub pc: usize,
    #[serde(rename = "op")]
    pub opcode: Opcode,
    pub depth: usize,
    #[serde(default)]
    pub gas_cost: u64,
    /// Bottom of the stack first, top last
    #[serde(default)]
    pub stack: Vec<U256>,
}

impl ExecutionStep {
    pub fn new(pc: usize, opcode: Opcode, depth: usize) -> Self {
        Self {
            pc,
            opcode,
            depth,
            gas_cost: 0,
            stack: Vec::new(),
        }
    }

    pub fn with_gas_cost(mut self, gas_cost: u64) -> Self {
        self.gas_cost = gas_cost;
        self
    }

    pub fn with_stack(mut self, stack: Vec<U256>) -> Self {
        self.stack = stack;
        self
    }

    /// Stack entry `offset` positions below the top
    pub fn stack_from_top(&self, offset: usize) -> Option<&U256> {
        self.stack.len().checked_sub(offset + 1).map(|i| &self.stack[i])
    }

    /// Target address of a CALL-like step, read from the second stack slot
    pub fn callee(&self) -> Option<Address> {
        self.stack_from_top(CALLEE_STACK_OFFSET).map(address_from_word)
    }
}

/// Lower 20 bytes of a stack word
pub fn address_from_word(word: &U256) -> Address {
    let bytes = word.to_be_bytes::<WORD_SIZE>();
    Address::from_slice(&bytes[WORD_SIZE - ADDRESS_SIZE..])
}

/// The ordered steps of one top-level transaction or call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace(Vec<ExecutionStep>);

impl Trace {
    pub fn new(steps: Vec<ExecutionStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.0
    }

    pub fn into_steps(self) -> Vec<ExecutionStep> {
        self.0
    }

    /// Parses the result of `debug_traceTransaction` (an object with `structLogs`) or a bare
    /// array of struct logs.
    pub fn from_json(value: &serde_json::Value) -> serde_json::Result<Self> {
        let logs = value.get("structLogs").unwrap_or(value);
        serde_json::from_value(logs.clone())
    }

    /// Returns the trace with depths rebased so that the first step sits at depth 0.
    ///
    /// geth numbers the top-level frame 1, other clients 0.
    pub fn normalized(&self) -> Trace {
        let base = match self.0.first() {
            Some(first) if first.depth > 0 => first.depth,
            _ => return self.clone(),
        };
        Trace(
            self.0
                .iter()
                .map(|step| ExecutionStep {
                    depth: step.depth.saturating_sub(base),
                    ..step.clone()
                })
                .collect(),
        )
    }

    /// Total gas charged over all steps
    pub fn gas_used(&self) -> u64 {
        self.0.iter().map(|s| s.gas_cost).sum()
    }
}

impl Deref for Trace {
    type Target = [ExecutionStep];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<ExecutionStep>> for Trace {
    fn from(steps: Vec<ExecutionStep>) -> Self {
        Self(steps)
    }
}

impl FromIterator<ExecutionStep> for Trace {
    fn from_iter<I: IntoIterator<Item = ExecutionStep>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_callee_reads_second_slot() {
        let target = U256::from_be_slice(address!("00000000000000000000000000000000deadbeef").as_slice());
        let gas = U256::from(50_000u64);
        let step = ExecutionStep::new(10, Opcode::Call, 0).with_stack(vec![U256::ZERO, target, gas]);
        assert_eq!(
            step.callee(),
            Some(address!("00000000000000000000000000000000deadbeef"))
        );
    }

    #[test]
    fn test_callee_with_short_stack() {
        let step = ExecutionStep::new(0, Opcode::Call, 0).with_stack(vec![U256::from(1u64)]);
        assert_eq!(step.callee(), None);
    }

    #[test]
    fn test_address_from_word_truncates() {
        let word = U256::MAX;
        assert_eq!(address_from_word(&word), Address::repeat_byte(0xff));
    }

    #[test]
    fn test_normalized_rebases_geth_depths() {
        let trace = Trace::new(vec![
            ExecutionStep::new(0, Opcode::Call, 1),
            ExecutionStep::new(0, Opcode::Stop, 2),
            ExecutionStep::new(1, Opcode::Stop, 1),
        ]);
        let depths: Vec<usize> = trace.normalized().iter().map(|s| s.depth).collect();
        assert_eq!(depths, vec![0, 1, 0]);
    }

    #[test]
    fn test_normalized_keeps_zero_based() {
        let trace = Trace::new(vec![ExecutionStep::new(0, Opcode::Stop, 0)]);
        assert_eq!(trace.normalized(), trace);
        assert!(Trace::default().normalized().is_empty());
    }

    #[test]
    fn test_from_struct_logs_json() {
        let value = serde_json::json!({
            "gas": 21000,
            "structLogs": [
                {"pc": 0, "op": "PUSH1", "depth": 1, "gasCost": 3, "stack": []},
                {"pc": 2, "op": "STOP", "depth": 1, "gasCost": 0, "stack": ["0x80"]}
            ]
        });
        let trace = Trace::from_json(&value).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].opcode, Opcode::Push(1));
        assert_eq!(trace[1].stack, vec![U256::from(0x80u64)]);
        assert_eq!(trace.gas_used(), 3);
    }
}
