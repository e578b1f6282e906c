// SPDX-License-Identifier: AGPL-3.0

//! Typed view over the compiler's JSON AST

use evmcov_contract::{LineIndex, Location};
use evmcov_exceptions::AstError;
use serde_json::{Map, Value as JsonValue};
use std::cmp::Reverse;

/// AST node kinds the analysis cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    SourceUnit,
    ContractDefinition,
    FunctionDefinition,
    ModifierDefinition,
    ModifierInvocation,
    IfStatement,
    ForStatement,
    WhileStatement,
    DoWhileStatement,
    Return,
    Break,
    Continue,
    Throw,
    EmitStatement,
    RevertStatement,
    InlineAssembly,
    VariableDeclarationStatement,
    ExpressionStatement,
    Conditional,
    BinaryOperation,
    Other,
}

impl NodeKind {
    pub fn from_node_type(node_type: &str) -> Self {
        match node_type {
            "SourceUnit" => NodeKind::SourceUnit,
            "ContractDefinition" => NodeKind::ContractDefinition,
            "FunctionDefinition" => NodeKind::FunctionDefinition,
            "ModifierDefinition" => NodeKind::ModifierDefinition,
            "ModifierInvocation" => NodeKind::ModifierInvocation,
            "IfStatement" => NodeKind::IfStatement,
            "ForStatement" => NodeKind::ForStatement,
            "WhileStatement" => NodeKind::WhileStatement,
            "DoWhileStatement" => NodeKind::DoWhileStatement,
            "Return" => NodeKind::Return,
            "Break" => NodeKind::Break,
            "Continue" => NodeKind::Continue,
            "Throw" => NodeKind::Throw,
            "EmitStatement" => NodeKind::EmitStatement,
            "RevertStatement" => NodeKind::RevertStatement,
            "InlineAssembly" => NodeKind::InlineAssembly,
            "VariableDeclarationStatement" => NodeKind::VariableDeclarationStatement,
            "ExpressionStatement" => NodeKind::ExpressionStatement,
            "Conditional" => NodeKind::Conditional,
            "BinaryOperation" => NodeKind::BinaryOperation,
            _ => NodeKind::Other,
        }
    }

    /// Kinds that are coverage statements on their own. Modifier invocations count only
    /// when they name a user-defined modifier.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::IfStatement
                | NodeKind::ForStatement
                | NodeKind::WhileStatement
                | NodeKind::DoWhileStatement
                | NodeKind::Return
                | NodeKind::Break
                | NodeKind::Continue
                | NodeKind::Throw
                | NodeKind::EmitStatement
                | NodeKind::RevertStatement
                | NodeKind::InlineAssembly
                | NodeKind::VariableDeclarationStatement
                | NodeKind::ExpressionStatement
        )
    }

    pub fn is_function_like(&self) -> bool {
        matches!(self, NodeKind::FunctionDefinition | NodeKind::ModifierDefinition)
    }
}

/// Byte range of a node, from its `src` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Src {
    pub offset: usize,
    pub length: usize,
}

impl Src {
    /// Parses `start:length[:file]`
    pub fn parse(src: &str) -> Result<Self, AstError> {
        let mut parts = src.split(':');
        let mut number = || {
            parts
                .next()
                .and_then(|p| p.parse::<usize>().ok())
                .ok_or_else(|| AstError::InvalidSrc(src.to_string()))
        };
        let offset = number()?;
        let length = number()?;
        Ok(Self { offset, length })
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// A JSON object carrying a `nodeType`
#[derive(Debug, Clone, Copy)]
pub struct AstNode<'a> {
    pub kind: NodeKind,
    pub node_type: &'a str,
    pub src: Src,
    fields: &'a Map<String, JsonValue>,
}

impl<'a> AstNode<'a> {
    /// `None` when the value is not a node at all
    pub fn from_value(value: &'a JsonValue) -> Result<Option<Self>, AstError> {
        let Some(fields) = value.as_object() else {
            return Ok(None);
        };
        let Some(node_type) = fields.get("nodeType").and_then(|t| t.as_str()) else {
            return Ok(None);
        };
        let src = fields
            .get("src")
            .and_then(|s| s.as_str())
            .ok_or_else(|| AstError::MissingField {
                node_type: node_type.to_string(),
                field: "src".to_string(),
            })?;

        Ok(Some(Self {
            kind: NodeKind::from_node_type(node_type),
            node_type,
            src: Src::parse(src)?,
            fields,
        }))
    }

    pub fn root(value: &'a JsonValue) -> Result<Self, AstError> {
        Self::from_value(value)?.ok_or(AstError::NotANode)
    }

    pub fn field(&self, name: &str) -> Option<&'a JsonValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn str_field(&self, name: &str) -> Option<&'a str> {
        self.field(name).and_then(|v| v.as_str())
    }

    fn missing(&self, field: &str) -> AstError {
        AstError::MissingField {
            node_type: self.node_type.to_string(),
            field: field.to_string(),
        }
    }

    /// A child node that must be present
    pub fn child(&self, name: &str) -> Result<AstNode<'a>, AstError> {
        self.optional_child(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn optional_child(&self, name: &str) -> Result<Option<AstNode<'a>>, AstError> {
        match self.field(name) {
            Some(value) => AstNode::from_value(value),
            None => Ok(None),
        }
    }

    /// Every direct child node in document order: by start offset, enclosing nodes first.
    pub fn children(&self) -> Result<Vec<AstNode<'a>>, AstError> {
        let mut children = Vec::new();
        for value in self.fields.values() {
            match value {
                JsonValue::Array(items) => {
                    for item in items {
                        children.extend(AstNode::from_value(item)?);
                    }
                }
                JsonValue::Object(_) => children.extend(AstNode::from_value(value)?),
                _ => {}
            }
        }
        children.sort_by_key(|c| (c.src.offset, Reverse(c.src.length)));
        Ok(children)
    }

    pub fn location(&self, lines: &LineIndex) -> Result<Location, AstError> {
        lines
            .location(self.src.offset, self.src.length)
            .ok_or_else(|| AstError::InvalidSrc(format!("{}:{}", self.src.offset, self.src.length)))
    }

    /// Declared name, falling back to the function kind for unnamed special functions
    pub fn display_name(&self) -> Option<&'a str> {
        match self.str_field("name") {
            Some(name) if !name.is_empty() => Some(name),
            _ => self.str_field("kind"),
        }
    }
}

/// Depth-first walk in document order. `visit` returns whether to descend into the node.
pub fn walk<'a, F>(node: &AstNode<'a>, visit: &mut F) -> Result<(), AstError>
where
    F: FnMut(&AstNode<'a>) -> Result<bool, AstError>,
{
    if !visit(node)? {
        return Ok(());
    }
    for child in node.children()? {
        walk(&child, visit)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_src_parse() {
        assert_eq!(Src::parse("12:30:0").unwrap(), Src { offset: 12, length: 30 });
        assert_eq!(Src::parse("4:2").unwrap().end(), 6);
        assert!(matches!(Src::parse("x:1:0"), Err(AstError::InvalidSrc(_))));
        assert!(Src::parse("-1:-1:-1").is_err());
    }

    #[test]
    fn test_node_kind() {
        assert_eq!(NodeKind::from_node_type("IfStatement"), NodeKind::IfStatement);
        assert_eq!(NodeKind::from_node_type("YulBlock"), NodeKind::Other);
        assert!(NodeKind::Return.is_statement());
        assert!(!NodeKind::ModifierInvocation.is_statement());
        assert!(NodeKind::ModifierDefinition.is_function_like());
    }

    #[test]
    fn test_non_node_values() {
        assert!(AstNode::from_value(&json!(3)).unwrap().is_none());
        assert!(AstNode::from_value(&json!({"name": "x"})).unwrap().is_none());
        assert!(matches!(AstNode::root(&json!([])), Err(AstError::NotANode)));
    }

    #[test]
    fn test_missing_src() {
        let value = json!({"nodeType": "Block"});
        assert!(matches!(
            AstNode::from_value(&value),
            Err(AstError::MissingField { .. })
        ));
    }

    #[test]
    fn test_children_in_document_order() {
        let value = json!({
            "nodeType": "Block",
            "src": "0:50:0",
            "statements": [
                {"nodeType": "ExpressionStatement", "src": "30:5:0"},
                {"nodeType": "Return", "src": "10:8:0"}
            ],
            "documentation": {"nodeType": "StructuredDocumentation", "src": "10:3:0"},
            "id": 7
        });
        let node = AstNode::root(&value).unwrap();
        let kinds: Vec<&str> = node.children().unwrap().iter().map(|c| c.node_type).collect();
        assert_eq!(kinds, vec!["Return", "StructuredDocumentation", "ExpressionStatement"]);
    }

    #[test]
    fn test_display_name_falls_back_to_kind() {
        let value = json!({"nodeType": "FunctionDefinition", "src": "0:1:0", "name": "", "kind": "receive"});
        assert_eq!(AstNode::root(&value).unwrap().display_name(), Some("receive"));
    }
}
