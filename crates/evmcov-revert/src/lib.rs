// SPDX-License-Identifier: AGPL-3.0

//! Source-level stack traces for reverted executions
//!
//! Each call frame captured at the REVERT is resolved to its artifact, its program counter
//! to a source range, and the range to a short snippet: the enclosing definition's
//! signature when the range is exactly a definition, otherwise the source text itself.

use alloy_primitives::Address;
use evmcov_ast::{AstInfo, NodeKind};
use evmcov_contract::{CompiledArtifact, ContractContext, LineIndex, Location, SourceRange};
use evmcov_exceptions::EvmcovResult;
use evmcov_logs::ErrorCode;
use evmcov_mapper::SourceMapProvider;
use evmcov_traces::CallFrame;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Definitions and statements of one source file of an artifact
pub trait AstInfoProvider {
    /// `None` when the file has no AST
    fn ast_info(
        &self,
        artifact: &CompiledArtifact,
        file_index: usize,
    ) -> EvmcovResult<Option<Arc<AstInfo>>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertFrame {
    pub file: String,
    pub location: Location,
    pub snippet: String,
}

impl RevertFrame {
    pub fn line(&self) -> usize {
        self.location.start.line
    }

    pub fn column(&self) -> usize {
        self.location.start.column
    }
}

impl fmt::Display for RevertFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}\n{}", self.file, self.line(), self.column(), self.snippet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RevertStackTrace {
    /// Outermost frame first
    Frames(Vec<RevertFrame>),
    /// No frame could be mapped back to source
    Undeterminable,
}

impl RevertStackTrace {
    pub fn frames(&self) -> &[RevertFrame] {
        match self {
            RevertStackTrace::Frames(frames) => frames,
            RevertStackTrace::Undeterminable => &[],
        }
    }

    pub fn is_undeterminable(&self) -> bool {
        matches!(self, RevertStackTrace::Undeterminable)
    }

    /// Colored, human readable rendering for terminals
    pub fn render(&self) -> String {
        match self {
            RevertStackTrace::Undeterminable => {
                evmcov_utils::yellow("Could not determine the revert stack trace")
            }
            RevertStackTrace::Frames(frames) => {
                let mut lines = vec![evmcov_utils::red("Stack trace for the REVERT:")];
                for frame in frames {
                    lines.push(format!(
                        "{}:{}:{}",
                        evmcov_utils::cyan(&frame.file),
                        frame.line(),
                        frame.column()
                    ));
                    lines.push(evmcov_utils::indent_text(&frame.snippet, 4));
                }
                lines.join("\n")
            }
        }
    }
}

/// Source text covered by `location`
fn source_text<'a>(text: &'a str, location: &Location) -> Option<&'a str> {
    let lines = LineIndex::new(text);
    let start = lines.offset(location.start)?;
    let end = lines.offset(location.end)?;
    text.get(start..end)
}

/// Snippet for a mapped range; `None` drops the frame
fn snippet(
    artifact: &CompiledArtifact,
    range: &SourceRange,
    info: Option<&AstInfo>,
) -> Option<String> {
    if let Some(node) = info.and_then(|info| info.lookup(&range.location)) {
        let name = node.name.as_deref().unwrap_or_default();
        match node.kind {
            NodeKind::ContractDefinition => return Some(format!("contract {}", name)),
            NodeKind::FunctionDefinition => return Some(format!("function {}", name)),
            NodeKind::ModifierDefinition => return Some(format!("modifier {}", name)),
            // conditions of a failed `if` say nothing about the revert
            NodeKind::IfStatement => return None,
            _ => {}
        }
    }
    let text = artifact.source_texts.get(range.file_index)?;
    source_text(text, &range.location).map(str::to_string)
}

/// Builds the source-level stack trace for `frames` (outermost first).
///
/// The outermost frame runs in `context`; every nested frame runs deployed code.
pub fn report(
    frames: &[CallFrame<'_>],
    context: ContractContext,
    resolve_artifact: &dyn Fn(&Address) -> Option<Arc<CompiledArtifact>>,
    maps: &dyn SourceMapProvider,
    infos: &dyn AstInfoProvider,
) -> EvmcovResult<RevertStackTrace> {
    let mut result: Vec<RevertFrame> = Vec::new();

    for (depth, frame) in frames.iter().enumerate().rev() {
        let Some(artifact) = resolve_artifact(&frame.address) else {
            evmcov_logs::warn_code(
                ErrorCode::UnresolvedContract,
                &format!("no artifact matches the code at {}", frame.address),
                false,
            );
            continue;
        };
        let frame_context = if depth == 0 {
            context
        } else {
            ContractContext::Runtime
        };

        let map = maps.source_map(&artifact, frame_context)?;
        let Some((_, range)) = map.at_or_before(frame.pc()) else {
            evmcov_logs::warn_code(
                ErrorCode::UnmappedRevert,
                &format!(
                    "pc {} of {} ({}) does not map to any source",
                    frame.pc(),
                    artifact.name,
                    frame_context
                ),
                true,
            );
            continue;
        };

        let info = infos.ast_info(&artifact, range.file_index)?;
        let Some(snippet) = snippet(&artifact, range, info.as_deref()) else {
            continue;
        };

        let frame = RevertFrame {
            file: range.file.to_string(),
            location: range.location,
            snippet,
        };
        let duplicate = result
            .last()
            .is_some_and(|last| last.file == frame.file && last.snippet == frame.snippet);
        if !duplicate {
            result.push(frame);
        }
    }

    if result.is_empty() {
        return Ok(RevertStackTrace::Undeterminable);
    }
    result.reverse();
    Ok(RevertStackTrace::Frames(result))
}
