// SPDX-License-Identifier: AGPL-3.0

//! Compiled contract artifacts, as handed over by the build-output loader.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Which code of a contract is executing: the constructor (init code) or the deployed code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractContext {
    Creation,
    Runtime,
}

impl ContractContext {
    pub fn name(&self) -> &'static str {
        match self {
            ContractContext::Creation => "creation",
            ContractContext::Runtime => "runtime",
        }
    }
}

impl fmt::Display for ContractContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One compiled contract together with every source file its source maps refer to.
///
/// `source_files`, `source_texts` and `source_asts` are indexed by the compiler's source id,
/// which is the `f` field of the source map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    pub name: String,
    pub creation_bytecode: String,
    pub runtime_bytecode: String,
    pub creation_source_map: String,
    pub runtime_source_map: String,
    pub source_files: Vec<String>,
    pub source_texts: Vec<String>,
    #[serde(default)]
    pub source_asts: Vec<JsonValue>,
    /// Runtime bytecode spans filled in at deployment
    #[serde(default)]
    pub immutable_references: Vec<ByteSpan>,
}

/// Byte span inside a bytecode, in the shape of solc's `immutableReferences` entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteSpan {
    pub start: usize,
    pub length: usize,
}

impl CompiledArtifact {
    pub fn bytecode(&self, context: ContractContext) -> &str {
        match context {
            ContractContext::Creation => &self.creation_bytecode,
            ContractContext::Runtime => &self.runtime_bytecode,
        }
    }

    pub fn source_map(&self, context: ContractContext) -> &str {
        match context {
            ContractContext::Creation => &self.creation_source_map,
            ContractContext::Runtime => &self.runtime_source_map,
        }
    }

    /// Borrowed view of the source with the given compiler id
    pub fn source_unit(&self, index: usize) -> Option<SourceUnit<'_>> {
        let path = self.source_files.get(index)?;
        let text = self.source_texts.get(index)?;
        Some(SourceUnit {
            index,
            path,
            text,
            ast: self.source_asts.get(index),
        })
    }

    pub fn file_index(&self, path: &str) -> Option<usize> {
        self.source_files.iter().position(|p| p == path)
    }

    pub fn source_units(&self) -> impl Iterator<Item = SourceUnit<'_>> {
        (0..self.source_files.len()).filter_map(move |i| self.source_unit(i))
    }
}

/// A source file as the analysis sees it: its path, its text and, when available, the
/// compiler's JSON AST for it.
#[derive(Debug, Clone, Copy)]
pub struct SourceUnit<'a> {
    pub index: usize,
    pub path: &'a str,
    pub text: &'a str,
    pub ast: Option<&'a JsonValue>,
}

impl<'a> SourceUnit<'a> {
    pub fn new(path: &'a str, text: &'a str, ast: Option<&'a JsonValue>) -> Self {
        Self {
            index: 0,
            path,
            text,
            ast,
        }
    }
}
