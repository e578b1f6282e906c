// SPDX-License-Identifier: AGPL-3.0

//! Compiler source-map decoding
//!
//! A solc source map is a `;`-separated list with one entry per instruction of the
//! bytecode it was emitted for. Each entry is `s:l:f:j:m` (byte offset, byte length, source
//! id, jump type, modifier depth); empty or missing fields repeat the previous entry.
//! [`decode`] turns that list into a table from program counter to [`SourceRange`].

use evmcov_constants::GENERATED_SOURCE_INDEX;
use evmcov_contract::{insn_len, CompiledArtifact, ContractContext, LineIndex, SourceRange};
use evmcov_exceptions::{EvmcovResult, MapperError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

const MAX_ENTRY_FIELDS: usize = 5;

/// Jump annotation of a source-map entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JumpType {
    /// `i`: jump into a function
    Into,
    /// `o`: return from a function
    Out,
    /// `-`: ordinary jump or no jump
    #[default]
    Regular,
}

impl JumpType {
    fn parse(field: &str) -> Option<Self> {
        match field {
            "i" => Some(JumpType::Into),
            "o" => Some(JumpType::Out),
            "-" => Some(JumpType::Regular),
            _ => None,
        }
    }
}

impl fmt::Display for JumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JumpType::Into => "i",
            JumpType::Out => "o",
            JumpType::Regular => "-",
        })
    }
}

/// One fully expanded source-map entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceMapEntry {
    pub offset: usize,
    pub length: usize,
    /// Source id, `-1` for compiler-generated code
    pub file: i64,
    pub jump: JumpType,
    pub modifier_depth: usize,
}

impl Default for SourceMapEntry {
    fn default() -> Self {
        Self {
            offset: 0,
            length: 0,
            file: GENERATED_SOURCE_INDEX,
            jump: JumpType::Regular,
            modifier_depth: 0,
        }
    }
}

impl SourceMapEntry {
    /// Source id as an index, `None` for generated code
    pub fn file_index(&self) -> Option<usize> {
        if self.file == GENERATED_SOURCE_INDEX {
            return None;
        }
        usize::try_from(self.file).ok()
    }
}

/// Expands a compressed source map into one entry per instruction.
pub fn parse_source_map(source_map: &str) -> Result<Vec<SourceMapEntry>, MapperError> {
    let source_map = source_map.trim();
    if source_map.is_empty() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    let mut last = SourceMapEntry::default();

    for (index, raw) in source_map.split(';').enumerate() {
        let fields: Vec<&str> = raw.split(':').collect();
        if fields.len() > MAX_ENTRY_FIELDS {
            return Err(MapperError::malformed(index, raw, "too many fields"));
        }

        let mut entry = last;
        for (position, field) in fields.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            match position {
                0 => entry.offset = parse_number(index, raw, field, "offset")?,
                1 => entry.length = parse_number(index, raw, field, "length")?,
                2 => {
                    entry.file = field.parse::<i64>().ok().filter(|f| *f >= GENERATED_SOURCE_INDEX).ok_or_else(
                        || MapperError::malformed(index, raw, format!("bad source id {:?}", field)),
                    )?
                }
                3 => {
                    entry.jump = JumpType::parse(field).ok_or_else(|| {
                        MapperError::malformed(index, raw, format!("bad jump type {:?}", field))
                    })?
                }
                _ => entry.modifier_depth = parse_number(index, raw, field, "modifier depth")?,
            }
        }

        entries.push(entry);
        last = entry;
    }

    Ok(entries)
}

fn parse_number(index: usize, raw: &str, field: &str, what: &str) -> Result<usize, MapperError> {
    field
        .parse::<usize>()
        .map_err(|_| MapperError::malformed(index, raw, format!("non-numeric {} {:?}", what, field)))
}

/// Program counters at which an instruction starts, in order.
///
/// Only opcode positions have to be hex: the immediate of a PUSH may hold an unlinked
/// library placeholder.
pub fn instruction_offsets(bytecode_hex: &str) -> Result<Vec<usize>, MapperError> {
    let code = evmcov_utils::stripped(bytecode_hex.trim());
    if !code.is_ascii() {
        return Err(MapperError::InvalidHex("non-ASCII characters".to_string()));
    }
    if code.len() % 2 != 0 {
        return Err(MapperError::InvalidHex(format!(
            "odd number of hex digits ({})",
            code.len()
        )));
    }

    let size = code.len() / 2;
    let mut offsets = Vec::new();
    let mut pc = 0;
    while pc < size {
        let pair = &code[2 * pc..2 * pc + 2];
        let opcode = u8::from_str_radix(pair, 16)
            .map_err(|_| MapperError::InvalidHex(format!("{:?} at pc {}", pair, pc)))?;
        offsets.push(pc);
        pc += insn_len(opcode);
    }
    Ok(offsets)
}

/// A source file the decoder can resolve byte ranges in
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: Arc<str>,
    pub lines: LineIndex,
}

impl SourceFile {
    pub fn new(path: &str, text: &str) -> Self {
        Self {
            path: Arc::from(path),
            lines: LineIndex::new(text),
        }
    }

    /// All sources of an artifact, indexed by source id
    pub fn from_artifact(artifact: &CompiledArtifact) -> Vec<SourceFile> {
        artifact
            .source_files
            .iter()
            .zip(artifact.source_texts.iter())
            .map(|(path, text)| SourceFile::new(path, text))
            .collect()
    }
}

/// Program counter → source range, for one bytecode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionSourceMap {
    ranges: BTreeMap<usize, SourceRange>,
}

impl InstructionSourceMap {
    pub fn get(&self, pc: usize) -> Option<&SourceRange> {
        self.ranges.get(&pc)
    }

    /// Range of the closest mapped instruction at or below `pc`
    pub fn at_or_before(&self, pc: usize) -> Option<(usize, &SourceRange)> {
        self.ranges.range(..=pc).next_back().map(|(pc, r)| (*pc, r))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &SourceRange)> {
        self.ranges.iter().map(|(pc, r)| (*pc, r))
    }
}

/// Builds the program counter → source range table for `bytecode_hex`.
///
/// Instructions whose entry names generated code, an unknown source id or a byte range
/// outside the file stay unmapped, as do instructions past the last entry.
pub fn decode(
    source_map: &str,
    bytecode_hex: &str,
    sources: &[SourceFile],
) -> Result<InstructionSourceMap, MapperError> {
    let entries = parse_source_map(source_map)?;
    let offsets = instruction_offsets(bytecode_hex)?;

    let mut ranges = BTreeMap::new();
    for (pc, entry) in offsets.into_iter().zip(entries.iter()) {
        let Some(file_index) = entry.file_index() else {
            continue;
        };
        let Some(source) = sources.get(file_index) else {
            continue;
        };
        if let Some(location) = source.lines.location(entry.offset, entry.length) {
            ranges.insert(
                pc,
                SourceRange {
                    file_index,
                    file: source.path.clone(),
                    location,
                },
            );
        }
    }

    Ok(InstructionSourceMap { ranges })
}

/// Decoded source map of an artifact's creation or runtime code, usually from a cache
pub trait SourceMapProvider {
    fn source_map(
        &self,
        artifact: &CompiledArtifact,
        context: ContractContext,
    ) -> EvmcovResult<Arc<InstructionSourceMap>>;
}

/// Decodes the creation or runtime source map of an artifact against its own bytecode.
pub fn decode_artifact(
    artifact: &CompiledArtifact,
    context: ContractContext,
) -> Result<InstructionSourceMap, MapperError> {
    decode(
        artifact.source_map(context),
        artifact.bytecode(context),
        &SourceFile::from_artifact(artifact),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmcov_contract::Position;

    #[test]
    fn test_parse_inherits_empty_fields() {
        let entries = parse_source_map("0:10:0:-:0;;5::;:3:1:i").unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1], entries[0]);
        assert_eq!(entries[2].offset, 5);
        assert_eq!(entries[2].length, 10);
        assert_eq!(entries[3].offset, 5);
        assert_eq!(entries[3].length, 3);
        assert_eq!(entries[3].file, 1);
        assert_eq!(entries[3].jump, JumpType::Into);
    }

    #[test]
    fn test_parse_generated_code() {
        let entries = parse_source_map("0:0:-1:-;;1:2:2").unwrap();
        assert_eq!(entries[0].file, GENERATED_SOURCE_INDEX);
        assert_eq!(entries[0].file_index(), None);
        assert_eq!(entries[1].file_index(), None);
        assert_eq!(entries[2].file_index(), Some(2));
        assert!(parse_source_map("0:0:-2").is_err());
        assert_eq!(SourceMapEntry::default().file_index(), None);
    }

    #[test]
    fn test_parse_empty_map() {
        assert!(parse_source_map("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            parse_source_map("0:1:0:-:0:9"),
            Err(MapperError::MalformedEntry { index: 0, .. })
        ));
        assert!(matches!(
            parse_source_map("0:1:0;a:1:0"),
            Err(MapperError::MalformedEntry { index: 1, .. })
        ));
        assert!(parse_source_map("0:1:0:x").is_err());
        assert!(parse_source_map("0:1:-2").is_err());
    }

    #[test]
    fn test_instruction_offsets_skip_push_data() {
        // PUSH1 0x80, PUSH2 0x0102, STOP
        assert_eq!(instruction_offsets("0x608061010200").unwrap(), vec![0, 2, 5]);
    }

    #[test]
    fn test_instruction_offsets_truncated_push() {
        // PUSH2 with a single byte of data left
        assert_eq!(instruction_offsets("6101").unwrap(), vec![0]);
    }

    #[test]
    fn test_instruction_offsets_placeholder_in_immediate() {
        let code = format!("73{}00", "__$1234567890abcdef1234567890abcdef12$__");
        assert_eq!(instruction_offsets(&code).unwrap(), vec![0, 21]);
    }

    #[test]
    fn test_instruction_offsets_invalid_hex() {
        assert!(matches!(instruction_offsets("0x600"), Err(MapperError::InvalidHex(_))));
        assert!(matches!(instruction_offsets("zz"), Err(MapperError::InvalidHex(_))));
    }

    #[test]
    fn test_decode_maps_each_instruction() {
        let text = "contract A {\n  function f() public {}\n}\n";
        let sources = vec![SourceFile::new("A.sol", text)];
        // PUSH1 0x80, PUSH1 0x40, MSTORE
        let map = decode("0:39:0:-;15:22:0;", "0x6080604052", &sources).unwrap();

        assert_eq!(map.len(), 3);
        let first = map.get(0).unwrap();
        assert_eq!(&*first.file, "A.sol");
        assert_eq!(first.start(), Position::new(1, 0));
        assert_eq!(first.end(), Position::new(3, 1));
        let second = map.get(2).unwrap();
        assert_eq!(second.start(), Position::new(2, 2));
        assert_eq!(second.end(), Position::new(2, 24));
        assert_eq!(map.get(4), map.get(2));
        assert!(map.get(1).is_none());
    }

    #[test]
    fn test_decode_leaves_generated_and_out_of_range_unmapped() {
        let sources = vec![SourceFile::new("A.sol", "contract A {}")];
        let map = decode("0:13:0;0:0:-1;0:13:3;5:100:0", "00000000", &sources).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.get(0).is_some());
    }

    #[test]
    fn test_decode_more_instructions_than_entries() {
        let sources = vec![SourceFile::new("A.sol", "contract A {}")];
        let map = decode("0:13:0", "000000", &sources).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.get(1).is_none());
    }

    #[test]
    fn test_at_or_before() {
        let sources = vec![SourceFile::new("A.sol", "contract A {}")];
        let map = decode("0:13:0;0:0:-1;0:0:-1", "000000", &sources).unwrap();
        let (pc, range) = map.at_or_before(2).unwrap();
        assert_eq!(pc, 0);
        assert_eq!(range.start(), Position::new(1, 0));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let sources = vec![SourceFile::new("A.sol", "contract A {\n uint x;\n}\n")];
        let a = decode("0:24:0;13:7:0;13:7:0", "0x600160025500", &sources).unwrap();
        let b = decode("0:24:0;13:7:0;13:7:0", "0x600160025500", &sources).unwrap();
        assert_eq!(a, b);
    }
}
