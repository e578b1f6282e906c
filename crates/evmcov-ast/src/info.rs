// SPDX-License-Identifier: AGPL-3.0

//! Definitions and statements of a file, looked up by source location when rendering
//! revert stack traces.

use crate::node::{walk, AstNode, NodeKind};
use evmcov_contract::{LineIndex, Location, SourceUnit};
use evmcov_exceptions::AstError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstNodeInfo {
    pub kind: NodeKind,
    pub name: Option<String>,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AstInfo {
    nodes: Vec<AstNodeInfo>,
}

impl AstInfo {
    pub fn collect(unit: &SourceUnit) -> Result<Self, AstError> {
        let ast = unit
            .ast
            .ok_or_else(|| AstError::MissingAst(unit.path.to_string()))?;
        let root = AstNode::root(ast)?;
        let lines = LineIndex::new(unit.text);

        let mut nodes = Vec::new();
        walk(&root, &mut |node| {
            let kind = node.kind;
            if matches!(kind, NodeKind::ContractDefinition) || kind.is_function_like() {
                nodes.push(AstNodeInfo {
                    kind,
                    name: node.display_name().map(str::to_string),
                    location: node.location(&lines)?,
                });
            } else if kind.is_statement() {
                nodes.push(AstNodeInfo {
                    kind,
                    name: None,
                    location: node.location(&lines)?,
                });
            }
            Ok(true)
        })?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[AstNodeInfo] {
        &self.nodes
    }

    /// Node whose location equals `location`. The end column may be off by one, as source
    /// maps sometimes include or drop a trailing `;` or `}`.
    pub fn lookup(&self, location: &Location) -> Option<&AstNodeInfo> {
        self.nodes
            .iter()
            .find(|n| n.location == *location)
            .or_else(|| {
                self.nodes.iter().find(|n| {
                    n.location.start == location.start
                        && n.location.end.line == location.end.line
                        && n.location.end.column.abs_diff(location.end.column) == 1
                })
            })
    }
}
