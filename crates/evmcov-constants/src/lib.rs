// SPDX-License-Identifier: AGPL-3.0

use alloy_primitives::Address;

/// Common EVM constants
pub const WORD_SIZE: usize = 32;
pub const ADDRESS_SIZE: usize = 20;

/// Position of the callee address for CALL-like opcodes, counted from the top of the stack.
/// The top holds the gas argument, the entry right below it the address.
pub const CALLEE_STACK_OFFSET: usize = 1;

/// Placeholder address for the execution context of a contract under construction.
pub const NEW_CONTRACT: Address = Address::ZERO;

/// Bytecode patterns shorter than this many hex characters never match anything.
/// Abstract contracts and interfaces compile to (almost) empty bytecode.
pub const MIN_CONTRACT_BYTECODE_LENGTH: usize = 88;

/// Length in hex characters of a library link placeholder (`__$<34 hex>$__` or `__Name___...`).
pub const LIBRARY_PLACEHOLDER_HEX_LENGTH: usize = 40;

/// Runtime prefix of a library: `PUSH20 <address>` where the compiler leaves the address zeroed
/// and the deployer patches in the library's own address.
pub const LIBRARY_SELF_ADDRESS_PREFIX: &str = "730000000000000000000000000000000000000000";

/// The CBOR-encoded metadata length is stored big-endian in the last two bytes of the code.
pub const METADATA_LENGTH_BYTES: usize = 2;

/// First bytes of a CBOR map with 1..=6 entries, which is how solc starts its metadata.
pub const CBOR_MAP_HEADERS: std::ops::RangeInclusive<u8> = 0xa1..=0xa6;

/// Modifier keywords that the parser reports as modifier invocations but that never execute code.
pub const BUILTIN_MODIFIERS: &[&str] = &[
    "public", "view", "payable", "external", "internal", "pure", "constant",
];

/// Source-map file index used for compiler-generated code.
pub const GENERATED_SOURCE_INDEX: i64 = -1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evm_constants() {
        assert_eq!(WORD_SIZE, 32);
        assert_eq!(ADDRESS_SIZE, 20);
    }

    #[test]
    fn test_library_prefix() {
        assert_eq!(LIBRARY_SELF_ADDRESS_PREFIX.len(), 2 + ADDRESS_SIZE * 2);
        assert!(LIBRARY_SELF_ADDRESS_PREFIX.starts_with("73"));
        assert_eq!(LIBRARY_PLACEHOLDER_HEX_LENGTH, ADDRESS_SIZE * 2);
    }

    #[test]
    fn test_cbor_headers() {
        assert!(CBOR_MAP_HEADERS.contains(&0xa2));
        assert!(!CBOR_MAP_HEADERS.contains(&0x60));
    }

    #[test]
    fn test_builtin_modifiers() {
        assert!(BUILTIN_MODIFIERS.contains(&"view"));
        assert!(!BUILTIN_MODIFIERS.contains(&"onlyOwner"));
    }
}
