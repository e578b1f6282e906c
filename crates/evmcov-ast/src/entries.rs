// SPDX-License-Identifier: AGPL-3.0

//! Instrumentation points of one source file

use crate::node::{walk, AstNode, NodeKind};
use evmcov_constants::BUILTIN_MODIFIERS;
use evmcov_contract::{LineIndex, Location, SourceUnit};
use evmcov_exceptions::AstError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

lazy_static! {
    static ref IGNORE_NEXT: Regex = Regex::new(r"/\*\s*solcov\s+ignore\s+next\s*\*/\s*")
        .unwrap_or_else(|e| panic!("invalid ignore-comment regex: {e}"));
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    pub line: usize,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchKind {
    #[serde(rename = "if")]
    If,
    #[serde(rename = "cond-expr")]
    CondExpr,
    #[serde(rename = "binary-expr")]
    BinaryExpr,
}

impl BranchKind {
    pub fn name(&self) -> &'static str {
        match self {
            BranchKind::If => "if",
            BranchKind::CondExpr => "cond-expr",
            BranchKind::BinaryExpr => "binary-expr",
        }
    }
}

/// A two-way branch: the first location is taken when the condition holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEntry {
    pub line: usize,
    pub kind: BranchKind,
    pub locations: [Location; 2],
}

/// Functions, statements and branches of a file. Ids are positions in each table,
/// assigned in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEntries {
    pub functions: Vec<FunctionEntry>,
    pub statements: Vec<Location>,
    pub branches: Vec<BranchEntry>,
    /// Statement ids of modifier invocations without arguments
    pub zero_arg_modifier_statement_ids: Vec<usize>,
}

impl CoverageEntries {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.statements.is_empty() && self.branches.is_empty()
    }
}

/// Byte offsets right after each `/* solcov ignore next */` comment
pub fn ignored_offsets(text: &str) -> HashSet<usize> {
    IGNORE_NEXT.find_iter(text).map(|m| m.end()).collect()
}

/// Walks the AST of `unit` and lists its instrumentation points.
pub fn extract(unit: &SourceUnit) -> Result<CoverageEntries, AstError> {
    let ast = unit
        .ast
        .ok_or_else(|| AstError::MissingAst(unit.path.to_string()))?;
    let root = AstNode::root(ast)?;
    let lines = LineIndex::new(unit.text);
    let ignored = ignored_offsets(unit.text);

    let mut entries = CoverageEntries::default();
    walk(&root, &mut |node| {
        if ignored.contains(&node.src.offset) {
            return Ok(false);
        }
        record(&mut entries, node, &lines)?;
        Ok(true)
    })?;
    Ok(entries)
}

fn record(
    entries: &mut CoverageEntries,
    node: &AstNode<'_>,
    lines: &LineIndex,
) -> Result<(), AstError> {
    match node.kind {
        NodeKind::FunctionDefinition | NodeKind::ModifierDefinition => {
            // interface and abstract declarations have no code to cover
            if node.field("implemented").and_then(|v| v.as_bool()) == Some(false) {
                return Ok(());
            }
            let location = node.location(lines)?;
            entries.functions.push(FunctionEntry {
                name: node.display_name().unwrap_or_default().to_string(),
                line: location.start.line,
                location,
            });
        }
        NodeKind::ModifierInvocation => {
            let name = node
                .child("modifierName")?
                .str_field("name")
                .ok_or_else(|| AstError::MissingField {
                    node_type: node.node_type.to_string(),
                    field: "modifierName.name".to_string(),
                })?;
            if BUILTIN_MODIFIERS.contains(&name) {
                return Ok(());
            }
            let no_arguments = match node.field("arguments").and_then(|a| a.as_array()) {
                Some(arguments) => arguments.is_empty(),
                None => true,
            };
            if no_arguments {
                entries
                    .zero_arg_modifier_statement_ids
                    .push(entries.statements.len());
            }
            entries.statements.push(node.location(lines)?);
        }
        NodeKind::Conditional => {
            let location = node.location(lines)?;
            entries.branches.push(BranchEntry {
                line: location.start.line,
                kind: BranchKind::CondExpr,
                locations: [
                    node.child("trueExpression")?.location(lines)?,
                    node.child("falseExpression")?.location(lines)?,
                ],
            });
        }
        NodeKind::BinaryOperation => {
            if matches!(node.str_field("operator"), Some("&&") | Some("||")) {
                let location = node.location(lines)?;
                entries.branches.push(BranchEntry {
                    line: location.start.line,
                    kind: BranchKind::BinaryExpr,
                    locations: [
                        node.child("leftExpression")?.location(lines)?,
                        node.child("rightExpression")?.location(lines)?,
                    ],
                });
            }
        }
        kind if kind.is_statement() => {
            let location = node.location(lines)?;
            entries.statements.push(location);
            if kind == NodeKind::IfStatement {
                let otherwise = match node.optional_child("falseBody")? {
                    Some(false_body) => false_body.location(lines)?,
                    None => location,
                };
                entries.branches.push(BranchEntry {
                    line: location.start.line,
                    kind: BranchKind::If,
                    locations: [node.child("trueBody")?.location(lines)?, otherwise],
                });
            }
        }
        _ => {}
    }
    Ok(())
}
