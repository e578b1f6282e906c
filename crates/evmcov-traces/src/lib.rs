// SPDX-License-Identifier: AGPL-3.0

//! Call-stack reconstruction over flat execution traces
//!
//! A trace interleaves the steps of every contract a transaction touches. [`segment`]
//! splits it into one subtrace per executing address; [`capture_revert_stack`] instead
//! returns the chain of call sites that led to the first REVERT.
//!
//! Both walk the trace with an address stack whose length tracks the call depth. Depths
//! must be zero-based (see `Trace::normalized`).

use alloy_primitives::Address;
use evmcov_contract::{ExecutionStep, Opcode, Trace};
use evmcov_exceptions::TraceError;
use evmcov_logs::ErrorCode;
use indexmap::IndexMap;
use std::fmt;

/// Steps executed by one address, in trace order
pub type Subtrace<'a> = Vec<&'a ExecutionStep>;

/// Result of splitting a trace by executing address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation<'a> {
    /// Subtraces in the order their addresses were first flushed
    pub subtraces: IndexMap<Address, Subtrace<'a>>,
    /// False when segmentation stopped early at a contract creation
    pub complete: bool,
}

impl<'a> Segmentation<'a> {
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.subtraces.keys()
    }

    pub fn get(&self, address: &Address) -> Option<&Subtrace<'a>> {
        self.subtraces.get(address)
    }

    pub fn len(&self) -> usize {
        self.subtraces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtraces.is_empty()
    }
}

/// One entry of the revert call stack: the address that was executing and the step it was
/// executing (a call site, or the REVERT itself for the innermost frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame<'a> {
    pub address: Address,
    pub step: &'a ExecutionStep,
}

impl CallFrame<'_> {
    pub fn pc(&self) -> usize {
        self.step.pc
    }
}

impl fmt::Display for CallFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ pc {} ({})", self.address, self.step.pc, self.step.opcode)
    }
}

/// How the call depth moves after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Stay,
    Enter(Address),
    Exit,
    /// Last step of the trace that does not end its frame
    End,
}

/// Classifies the move from step `index` to the next one.
fn transition(steps: &[ExecutionStep], index: usize) -> Result<Transition, TraceError> {
    let step = &steps[index];
    let Some(next) = steps.get(index + 1) else {
        return Ok(if step.opcode.is_terminal() {
            Transition::Exit
        } else {
            Transition::End
        });
    };

    if next.depth == step.depth {
        // includes calls to precompiles and plain value transfers
        Ok(Transition::Stay)
    } else if next.depth == step.depth + 1 && step.opcode.is_call_like() {
        step.callee()
            .map(Transition::Enter)
            .ok_or(TraceError::MissingCallee { step: index })
    } else if next.depth + 1 == step.depth {
        // RETURN/STOP/REVERT, or an exceptional halt (out of gas, bad jump)
        Ok(Transition::Exit)
    } else {
        Err(TraceError::UnexpectedDepthChange {
            step: index,
            from: step.depth,
            to: next.depth,
        })
    }
}

fn check_depth(step: &ExecutionStep, index: usize, stack_len: usize) -> Result<(), TraceError> {
    let expected = stack_len.saturating_sub(1);
    if step.depth != expected || stack_len == 0 {
        return Err(TraceError::DepthMismatch {
            step: index,
            expected,
            found: step.depth,
        });
    }
    Ok(())
}

fn warn_create(address: &Address, step: &ExecutionStep) {
    evmcov_logs::warn_code(
        ErrorCode::UnsupportedCreate,
        &format!(
            "{} at pc {} of {}: contracts created mid-trace are not supported, the rest of the trace is ignored",
            step.opcode, step.pc, address
        ),
        false,
    );
}

fn flush<'a>(
    subtraces: &mut IndexMap<Address, Subtrace<'a>>,
    address: Address,
    segment: &mut Subtrace<'a>,
) {
    if segment.is_empty() {
        return;
    }
    subtraces
        .entry(address)
        .or_default()
        .append(segment);
}

/// Splits `trace` into subtraces per executing address, starting at `start`.
pub fn segment(trace: &Trace, start: Address) -> Result<Segmentation<'_>, TraceError> {
    let steps = trace.steps();
    let mut stack = vec![start];
    let mut subtraces = IndexMap::new();
    let mut current: Subtrace<'_> = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        check_depth(step, index, stack.len())?;
        let address = stack[stack.len() - 1];
        current.push(step);

        if step.opcode.is_create() {
            warn_create(&address, step);
            return Ok(Segmentation {
                subtraces,
                complete: false,
            });
        }
        if step.opcode == Opcode::SelfDestruct {
            evmcov_logs::warn_code(
                ErrorCode::SelfDestruct,
                &format!("{} self-destructed; its coverage may be incomplete", address),
                false,
            );
        }

        match transition(steps, index)? {
            Transition::Stay | Transition::End => {}
            Transition::Enter(callee) => {
                flush(&mut subtraces, address, &mut current);
                stack.push(callee);
            }
            Transition::Exit => {
                stack.pop();
                flush(&mut subtraces, address, &mut current);
            }
        }
    }

    if !steps.is_empty() {
        if let Some(top) = stack.last() {
            if !current.is_empty() {
                evmcov_logs::warn_code(
                    ErrorCode::TruncatedTrace,
                    &format!("trace ended inside a call to {}", top),
                    true,
                );
                flush(&mut subtraces, *top, &mut current);
            }
            evmcov_logs::warn_code(
                ErrorCode::TruncatedTrace,
                &format!(
                    "{} call frame(s) still open at the end of the trace, probably out of gas",
                    stack.len()
                ),
                true,
            );
        }
    }

    Ok(Segmentation {
        subtraces,
        complete: true,
    })
}

/// Call stack at the first REVERT of `trace`, outermost frame first.
///
/// Empty when the trace contains no REVERT or creates a contract before reverting.
pub fn capture_revert_stack(trace: &Trace, start: Address) -> Result<Vec<CallFrame<'_>>, TraceError> {
    let steps = trace.steps();
    let mut stack = vec![start];
    let mut frames = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        check_depth(step, index, stack.len())?;
        let address = stack[stack.len() - 1];

        if step.opcode == Opcode::Revert {
            frames.push(CallFrame { address, step });
            return Ok(frames);
        }
        if step.opcode.is_create() {
            warn_create(&address, step);
            return Ok(Vec::new());
        }

        match transition(steps, index)? {
            Transition::Stay | Transition::End => {}
            Transition::Enter(callee) => {
                frames.push(CallFrame { address, step });
                stack.push(callee);
            }
            Transition::Exit => {
                stack.pop();
                frames.pop();
            }
        }
    }

    if !frames.is_empty() {
        evmcov_logs::warn_code(
            ErrorCode::TruncatedTrace,
            &format!(
                "no REVERT found but {} call frame(s) are still open",
                frames.len()
            ),
            true,
        );
    }
    Ok(Vec::new())
}
