// SPDX-License-Identifier: AGPL-3.0

//! Coverage instrumentation points from the compiler's JSON AST
//!
//! A source file is described by its `SourceUnit` AST as emitted by solc
//! (`nodeType`, `src = "start:length:file"`). [`extract`] lists the functions, statements
//! and branches a coverage report is built over; [`AstInfo`] indexes definitions and
//! statements so revert frames can be labelled.

pub mod entries;
pub mod info;
pub mod node;

pub use entries::{
    extract, ignored_offsets, BranchEntry, BranchKind, CoverageEntries, FunctionEntry,
};
pub use info::{AstInfo, AstNodeInfo};
pub use node::{walk, AstNode, NodeKind, Src};
