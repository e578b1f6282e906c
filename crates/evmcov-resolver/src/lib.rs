// SPDX-License-Identifier: AGPL-3.0

//! Maps bytecode observed on chain back to the compiled artifact it was built from.
//!
//! Deployed code differs from the artifact in places the compiler cannot know: the CBOR
//! metadata trailer, linked library addresses, the self address a library pushes at
//! startup, and immutables. A [`BytecodePattern`] keeps the artifact's hex and turns those
//! places into wildcard spans; everything else must match exactly.

use evmcov_constants::{
    CBOR_MAP_HEADERS, LIBRARY_PLACEHOLDER_HEX_LENGTH, LIBRARY_SELF_ADDRESS_PREFIX,
    METADATA_LENGTH_BYTES,
};
use evmcov_contract::{ByteSpan, CompiledArtifact, ContractContext};
use evmcov_utils::normalized_hex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// Any `n` hex characters
    Any(usize),
    /// Anything up to the end of the code
    Tail,
}

/// Artifact bytecode with wildcard spans, matched against whole observed codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodePattern {
    segments: Vec<Segment>,
    len: usize,
}

impl BytecodePattern {
    pub fn new(bytecode_hex: &str) -> Self {
        Self::with_wildcards(bytecode_hex, &[])
    }

    /// Like [`BytecodePattern::new`], with extra byte spans that may hold anything
    pub fn with_wildcards(bytecode_hex: &str, spans: &[ByteSpan]) -> Self {
        let code = normalized_hex(bytecode_hex);
        if !code.is_ascii() {
            return Self {
                len: code.len(),
                segments: vec![Segment::Literal(code)],
            };
        }
        let (body, has_metadata) = match metadata_start(&code) {
            Some(start) => (&code[..start], true),
            None => (code.as_str(), false),
        };

        let mut wild = vec![false; body.len()];
        for span in spans {
            let start = (span.start * 2).min(body.len());
            let end = ((span.start + span.length) * 2).min(body.len());
            wild[start..end].iter_mut().for_each(|w| *w = true);
        }
        if body.starts_with(LIBRARY_SELF_ADDRESS_PREFIX) {
            wild[2..LIBRARY_SELF_ADDRESS_PREFIX.len()]
                .iter_mut()
                .for_each(|w| *w = true);
        }
        let bytes = body.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'_' {
                let end = (i + LIBRARY_PLACEHOLDER_HEX_LENGTH).min(bytes.len());
                wild[i..end].iter_mut().for_each(|w| *w = true);
                i = end;
            } else {
                i += 1;
            }
        }

        let mut segments = Vec::new();
        let mut start = 0;
        while start < body.len() {
            let is_wild = wild[start];
            let end = (start..body.len())
                .find(|&j| wild[j] != is_wild)
                .unwrap_or(body.len());
            segments.push(if is_wild {
                Segment::Any(end - start)
            } else {
                Segment::Literal(body[start..end].to_string())
            });
            start = end;
        }
        if has_metadata {
            segments.push(Segment::Tail);
        }

        Self {
            segments,
            len: body.len(),
        }
    }

    /// Hex characters covered before any trailing wildcard
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_metadata(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Tail))
    }

    /// True when `observed_hex` is an instance of this pattern
    pub fn matches(&self, observed_hex: &str) -> bool {
        let observed = normalized_hex(observed_hex);
        if !observed.is_ascii() {
            return false;
        }
        let mut cursor = 0;
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    if !observed[cursor..].starts_with(literal.as_str()) {
                        return false;
                    }
                    cursor += literal.len();
                }
                Segment::Any(n) => {
                    cursor += n;
                    if cursor > observed.len() {
                        return false;
                    }
                }
                Segment::Tail => return true,
            }
        }
        cursor == observed.len()
    }
}

/// Start (in hex chars) of the CBOR metadata trailer, if the code ends with one
fn metadata_start(code: &str) -> Option<usize> {
    let length_hex = METADATA_LENGTH_BYTES * 2;
    if code.len() < length_hex || !code.is_ascii() {
        return None;
    }
    let length = usize::from_str_radix(&code[code.len() - length_hex..], 16).ok()?;
    let start = code.len().checked_sub(length_hex + length * 2)?;
    let header = u8::from_str_radix(code.get(start..start + 2)?, 16).ok()?;
    CBOR_MAP_HEADERS.contains(&header).then_some(start)
}

#[derive(Debug, Clone)]
struct Candidate {
    artifact: Arc<CompiledArtifact>,
    creation: Option<BytecodePattern>,
    runtime: Option<BytecodePattern>,
}

/// Matches observed code against a catalog of artifacts
#[derive(Debug, Clone, Default)]
pub struct ContractResolver {
    candidates: Vec<Candidate>,
}

impl ContractResolver {
    /// Patterns shorter than `min_len` hex characters (abstract contracts, interfaces) are
    /// never matched.
    pub fn new(artifacts: Vec<Arc<CompiledArtifact>>, min_len: usize) -> Self {
        let candidates = artifacts
            .into_iter()
            .filter_map(|artifact| {
                let creation = Some(BytecodePattern::new(&artifact.creation_bytecode))
                    .filter(|p| p.len() >= min_len);
                let runtime = Some(BytecodePattern::with_wildcards(
                    &artifact.runtime_bytecode,
                    &artifact.immutable_references,
                ))
                .filter(|p| p.len() >= min_len);
                if creation.is_none() && runtime.is_none() {
                    evmcov_logs::debug(&format!(
                        "skipping {}: bytecode shorter than {} hex chars",
                        artifact.name, min_len
                    ));
                    return None;
                }
                Some(Candidate {
                    artifact,
                    creation,
                    runtime,
                })
            })
            .collect();
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn resolve(&self, observed_hex: &str) -> Option<&Arc<CompiledArtifact>> {
        self.resolve_with_context(observed_hex)
            .map(|(artifact, _)| artifact)
    }

    /// First artifact whose creation or runtime pattern matches, and which of the two did
    pub fn resolve_with_context(
        &self,
        observed_hex: &str,
    ) -> Option<(&Arc<CompiledArtifact>, ContractContext)> {
        self.candidates.iter().find_map(|candidate| {
            if matches!(&candidate.creation, Some(p) if p.matches(observed_hex)) {
                Some((&candidate.artifact, ContractContext::Creation))
            } else if matches!(&candidate.runtime, Some(p) if p.matches(observed_hex)) {
                Some((&candidate.artifact, ContractContext::Runtime))
            } else {
                None
            }
        })
    }
}
