// SPDX-License-Identifier: AGPL-3.0

//! Errors raised while analysing an execution trace.
//!
//! Every error here is fatal for the trace (or artifact) being processed and nothing else:
//! caches and cumulative reports are never touched by a failing call. Recoverable
//! conditions are not errors; they are logged through `evmcov-logs` and the affected
//! contract or frame is left out of the result.

use thiserror::Error;

/// Raised by the call-stack segmenter when the trace contradicts EVM call semantics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("malformed trace: depth mismatch at step {step} (expected depth {expected}, found {found})")]
    DepthMismatch {
        step: usize,
        expected: usize,
        found: usize,
    },

    #[error("malformed trace: unexpected call depth change at step {step} ({from} -> {to})")]
    UnexpectedDepthChange { step: usize, from: usize, to: usize },

    #[error("malformed trace: call at step {step} has no callee address on the stack")]
    MissingCallee { step: usize },
}

/// Raised when a compiler source map or the bytecode it describes cannot be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapperError {
    #[error("invalid bytecode hex: {0}")]
    InvalidHex(String),

    #[error("malformed source map entry {index} ({entry:?}): {reason}")]
    MalformedEntry {
        index: usize,
        entry: String,
        reason: String,
    },
}

impl MapperError {
    pub fn malformed(index: usize, entry: &str, reason: impl Into<String>) -> Self {
        Self::MalformedEntry {
            index,
            entry: entry.to_string(),
            reason: reason.into(),
        }
    }
}

/// Raised when a compiler AST does not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AstError {
    #[error("AST node {node_type} is missing field `{field}`")]
    MissingField { node_type: String, field: String },

    #[error("invalid source location {0:?}")]
    InvalidSrc(String),

    #[error("AST root is not a node object")]
    NotANode,

    #[error("no AST available for {0}")]
    MissingAst(String),
}

/// Umbrella error returned by the engine for one trace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvmcovException {
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    SourceMap(#[from] MapperError),

    #[error(transparent)]
    Ast(#[from] AstError),
}

/// Result type for engine operations
pub type EvmcovResult<T> = Result<T, EvmcovException>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_mismatch_message() {
        let err = TraceError::DepthMismatch {
            step: 3,
            expected: 1,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "malformed trace: depth mismatch at step 3 (expected depth 1, found 2)"
        );
    }

    #[test]
    fn test_unexpected_depth_change() {
        let err = TraceError::UnexpectedDepthChange {
            step: 0,
            from: 0,
            to: 2,
        };
        assert!(err.to_string().contains("0 -> 2"));
    }

    #[test]
    fn test_malformed_entry() {
        let err = MapperError::malformed(4, "1:x:0", "non-numeric length");
        assert_eq!(
            err.to_string(),
            "malformed source map entry 4 (\"1:x:0\"): non-numeric length"
        );
    }

    #[test]
    fn test_umbrella_is_transparent() {
        let err: EvmcovException = AstError::InvalidSrc("a:b".to_string()).into();
        assert_eq!(err.to_string(), "invalid source location \"a:b\"");
        assert!(matches!(err, EvmcovException::Ast(_)));
    }
}
