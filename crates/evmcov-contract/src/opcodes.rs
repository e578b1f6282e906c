// SPDX-License-Identifier: AGPL-3.0

//! EVM opcodes as seen by the trace analysis.
//!
//! Only the opcodes that change the execution context, or whose encoding matters when
//! walking bytecode, get a dedicated variant. Everything else is carried as
//! [`Opcode::Other`] so that a trace round-trips without losing information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const OP_STOP: u8 = 0x00;
pub const OP_ADD: u8 = 0x01;
pub const OP_MUL: u8 = 0x02;
pub const OP_SUB: u8 = 0x03;
pub const OP_DIV: u8 = 0x04;
pub const OP_SDIV: u8 = 0x05;
pub const OP_MOD: u8 = 0x06;
pub const OP_SMOD: u8 = 0x07;
pub const OP_ADDMOD: u8 = 0x08;
pub const OP_MULMOD: u8 = 0x09;
pub const OP_EXP: u8 = 0x0A;
pub const OP_SIGNEXTEND: u8 = 0x0B;
pub const OP_LT: u8 = 0x10;
pub const OP_GT: u8 = 0x11;
pub const OP_SLT: u8 = 0x12;
pub const OP_SGT: u8 = 0x13;
pub const OP_EQ: u8 = 0x14;
pub const OP_ISZERO: u8 = 0x15;
pub const OP_AND: u8 = 0x16;
pub const OP_OR: u8 = 0x17;
pub const OP_XOR: u8 = 0x18;
pub const OP_NOT: u8 = 0x19;
pub const OP_BYTE: u8 = 0x1A;
pub const OP_SHL: u8 = 0x1B;
pub const OP_SHR: u8 = 0x1C;
pub const OP_SAR: u8 = 0x1D;
pub const OP_SHA3: u8 = 0x20;
pub const OP_ADDRESS: u8 = 0x30;
pub const OP_BALANCE: u8 = 0x31;
pub const OP_ORIGIN: u8 = 0x32;
pub const OP_CALLER: u8 = 0x33;
pub const OP_CALLVALUE: u8 = 0x34;
pub const OP_CALLDATALOAD: u8 = 0x35;
pub const OP_CALLDATASIZE: u8 = 0x36;
pub const OP_CALLDATACOPY: u8 = 0x37;
pub const OP_CODESIZE: u8 = 0x38;
pub const OP_CODECOPY: u8 = 0x39;
pub const OP_GASPRICE: u8 = 0x3A;
pub const OP_EXTCODESIZE: u8 = 0x3B;
pub const OP_EXTCODECOPY: u8 = 0x3C;
pub const OP_RETURNDATASIZE: u8 = 0x3D;
pub const OP_RETURNDATACOPY: u8 = 0x3E;
pub const OP_EXTCODEHASH: u8 = 0x3F;
pub const OP_BLOCKHASH: u8 = 0x40;
pub const OP_COINBASE: u8 = 0x41;
pub const OP_TIMESTAMP: u8 = 0x42;
pub const OP_NUMBER: u8 = 0x43;
pub const OP_DIFFICULTY: u8 = 0x44;
pub const OP_GASLIMIT: u8 = 0x45;
pub const OP_CHAINID: u8 = 0x46;
pub const OP_SELFBALANCE: u8 = 0x47;
pub const OP_BASEFEE: u8 = 0x48;
pub const OP_BLOBHASH: u8 = 0x49;
pub const OP_BLOBBASEFEE: u8 = 0x4A;
pub const OP_POP: u8 = 0x50;
pub const OP_MLOAD: u8 = 0x51;
pub const OP_MSTORE: u8 = 0x52;
pub const OP_MSTORE8: u8 = 0x53;
pub const OP_SLOAD: u8 = 0x54;
pub const OP_SSTORE: u8 = 0x55;
pub const OP_JUMP: u8 = 0x56;
pub const OP_JUMPI: u8 = 0x57;
pub const OP_PC: u8 = 0x58;
pub const OP_MSIZE: u8 = 0x59;
pub const OP_GAS: u8 = 0x5A;
pub const OP_JUMPDEST: u8 = 0x5B;
pub const OP_TLOAD: u8 = 0x5C;
pub const OP_TSTORE: u8 = 0x5D;
pub const OP_MCOPY: u8 = 0x5E;
pub const OP_PUSH0: u8 = 0x5F;
pub const OP_PUSH1: u8 = 0x60;
pub const OP_PUSH32: u8 = 0x7F;
pub const OP_DUP1: u8 = 0x80;
pub const OP_DUP16: u8 = 0x8F;
pub const OP_SWAP1: u8 = 0x90;
pub const OP_SWAP16: u8 = 0x9F;
pub const OP_LOG0: u8 = 0xA0;
pub const OP_LOG4: u8 = 0xA4;
pub const OP_CREATE: u8 = 0xF0;
pub const OP_CALL: u8 = 0xF1;
pub const OP_CALLCODE: u8 = 0xF2;
pub const OP_RETURN: u8 = 0xF3;
pub const OP_DELEGATECALL: u8 = 0xF4;
pub const OP_CREATE2: u8 = 0xF5;
pub const OP_STATICCALL: u8 = 0xFA;
pub const OP_REVERT: u8 = 0xFD;
pub const OP_INVALID: u8 = 0xFE;
pub const OP_SELFDESTRUCT: u8 = 0xFF;

/// Mnemonics of the opcodes without a dedicated [`Opcode`] variant
const PLAIN_MNEMONICS: &[(u8, &str)] = &[
    (OP_ADD, "ADD"),
    (OP_MUL, "MUL"),
    (OP_SUB, "SUB"),
    (OP_DIV, "DIV"),
    (OP_SDIV, "SDIV"),
    (OP_MOD, "MOD"),
    (OP_SMOD, "SMOD"),
    (OP_ADDMOD, "ADDMOD"),
    (OP_MULMOD, "MULMOD"),
    (OP_EXP, "EXP"),
    (OP_SIGNEXTEND, "SIGNEXTEND"),
    (OP_LT, "LT"),
    (OP_GT, "GT"),
    (OP_SLT, "SLT"),
    (OP_SGT, "SGT"),
    (OP_EQ, "EQ"),
    (OP_ISZERO, "ISZERO"),
    (OP_AND, "AND"),
    (OP_OR, "OR"),
    (OP_XOR, "XOR"),
    (OP_NOT, "NOT"),
    (OP_BYTE, "BYTE"),
    (OP_SHL, "SHL"),
    (OP_SHR, "SHR"),
    (OP_SAR, "SAR"),
    (OP_SHA3, "SHA3"),
    (OP_ADDRESS, "ADDRESS"),
    (OP_BALANCE, "BALANCE"),
    (OP_ORIGIN, "ORIGIN"),
    (OP_CALLER, "CALLER"),
    (OP_CALLVALUE, "CALLVALUE"),
    (OP_CALLDATALOAD, "CALLDATALOAD"),
    (OP_CALLDATASIZE, "CALLDATASIZE"),
    (OP_CALLDATACOPY, "CALLDATACOPY"),
    (OP_CODESIZE, "CODESIZE"),
    (OP_CODECOPY, "CODECOPY"),
    (OP_GASPRICE, "GASPRICE"),
    (OP_EXTCODESIZE, "EXTCODESIZE"),
    (OP_EXTCODECOPY, "EXTCODECOPY"),
    (OP_RETURNDATASIZE, "RETURNDATASIZE"),
    (OP_RETURNDATACOPY, "RETURNDATACOPY"),
    (OP_EXTCODEHASH, "EXTCODEHASH"),
    (OP_BLOCKHASH, "BLOCKHASH"),
    (OP_COINBASE, "COINBASE"),
    (OP_TIMESTAMP, "TIMESTAMP"),
    (OP_NUMBER, "NUMBER"),
    (OP_DIFFICULTY, "DIFFICULTY"),
    (OP_GASLIMIT, "GASLIMIT"),
    (OP_CHAINID, "CHAINID"),
    (OP_SELFBALANCE, "SELFBALANCE"),
    (OP_BASEFEE, "BASEFEE"),
    (OP_BLOBHASH, "BLOBHASH"),
    (OP_BLOBBASEFEE, "BLOBBASEFEE"),
    (OP_POP, "POP"),
    (OP_MLOAD, "MLOAD"),
    (OP_MSTORE, "MSTORE"),
    (OP_MSTORE8, "MSTORE8"),
    (OP_SLOAD, "SLOAD"),
    (OP_SSTORE, "SSTORE"),
    (OP_JUMP, "JUMP"),
    (OP_JUMPI, "JUMPI"),
    (OP_PC, "PC"),
    (OP_MSIZE, "MSIZE"),
    (OP_GAS, "GAS"),
    (OP_JUMPDEST, "JUMPDEST"),
    (OP_TLOAD, "TLOAD"),
    (OP_TSTORE, "TSTORE"),
    (OP_MCOPY, "MCOPY"),
];

/// Aliases used by various clients for the same byte
const MNEMONIC_ALIASES: &[(&str, u8)] = &[
    ("KECCAK256", OP_SHA3),
    ("PREVRANDAO", OP_DIFFICULTY),
    ("RANDOM", OP_DIFFICULTY),
    ("SUICIDE", OP_SELFDESTRUCT),
];

/// Returns the length of an instruction with the given opcode
pub fn insn_len(opcode: u8) -> usize {
    if (OP_PUSH1..=OP_PUSH32).contains(&opcode) {
        1 + (opcode - OP_PUSH0) as usize
    } else {
        1
    }
}

/// Opcode of a single execution step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Opcode {
    Stop,
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
    Return,
    Revert,
    Invalid,
    SelfDestruct,
    /// PUSH0..=PUSH32, carrying the immediate size in bytes
    Push(u8),
    Other(u8),
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            OP_STOP => Opcode::Stop,
            OP_CALL => Opcode::Call,
            OP_CALLCODE => Opcode::CallCode,
            OP_DELEGATECALL => Opcode::DelegateCall,
            OP_STATICCALL => Opcode::StaticCall,
            OP_CREATE => Opcode::Create,
            OP_CREATE2 => Opcode::Create2,
            OP_RETURN => Opcode::Return,
            OP_REVERT => Opcode::Revert,
            OP_INVALID => Opcode::Invalid,
            OP_SELFDESTRUCT => Opcode::SelfDestruct,
            OP_PUSH0..=OP_PUSH32 => Opcode::Push(byte - OP_PUSH0),
            other => Opcode::Other(other),
        }
    }

    pub fn byte(&self) -> u8 {
        match *self {
            Opcode::Stop => OP_STOP,
            Opcode::Call => OP_CALL,
            Opcode::CallCode => OP_CALLCODE,
            Opcode::DelegateCall => OP_DELEGATECALL,
            Opcode::StaticCall => OP_STATICCALL,
            Opcode::Create => OP_CREATE,
            Opcode::Create2 => OP_CREATE2,
            Opcode::Return => OP_RETURN,
            Opcode::Revert => OP_REVERT,
            Opcode::Invalid => OP_INVALID,
            Opcode::SelfDestruct => OP_SELFDESTRUCT,
            Opcode::Push(n) => OP_PUSH0 + n,
            Opcode::Other(byte) => byte,
        }
    }

    /// Opcodes that may enter a new execution context at a known address
    pub fn is_call_like(&self) -> bool {
        matches!(
            self,
            Opcode::Call | Opcode::CallCode | Opcode::DelegateCall | Opcode::StaticCall
        )
    }

    /// Opcodes that end the current execution context
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Opcode::Return | Opcode::Stop | Opcode::Revert | Opcode::Invalid | Opcode::SelfDestruct
        )
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Opcode::Create | Opcode::Create2)
    }

    /// Number of immediate bytes following the opcode in the bytecode
    pub fn immediate_len(&self) -> usize {
        insn_len(self.byte()) - 1
    }

    pub fn mnemonic(&self) -> String {
        match *self {
            Opcode::Stop => "STOP".to_string(),
            Opcode::Call => "CALL".to_string(),
            Opcode::CallCode => "CALLCODE".to_string(),
            Opcode::DelegateCall => "DELEGATECALL".to_string(),
            Opcode::StaticCall => "STATICCALL".to_string(),
            Opcode::Create => "CREATE".to_string(),
            Opcode::Create2 => "CREATE2".to_string(),
            Opcode::Return => "RETURN".to_string(),
            Opcode::Revert => "REVERT".to_string(),
            Opcode::Invalid => "INVALID".to_string(),
            Opcode::SelfDestruct => "SELFDESTRUCT".to_string(),
            Opcode::Push(n) => format!("PUSH{}", n),
            Opcode::Other(byte) => match byte {
                n @ OP_DUP1..=OP_DUP16 => format!("DUP{}", n - OP_DUP1 + 1),
                n @ OP_SWAP1..=OP_SWAP16 => format!("SWAP{}", n - OP_SWAP1 + 1),
                n @ OP_LOG0..=OP_LOG4 => format!("LOG{}", n - OP_LOG0),
                _ => PLAIN_MNEMONICS
                    .iter()
                    .find(|(b, _)| *b == byte)
                    .map(|(_, name)| name.to_string())
                    .unwrap_or_else(|| format!("0x{:02x}", byte)),
            },
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic())
    }
}

/// Parses a numbered family mnemonic like `PUSH12` or `DUP3`
fn numbered(name: &str, prefix: &str, base: u8, range: std::ops::RangeInclusive<u8>) -> Option<u8> {
    let n: u8 = name.strip_prefix(prefix)?.parse().ok()?;
    range.contains(&n).then(|| base + n)
}

impl FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();

        let special = match name.as_str() {
            "STOP" => Some(OP_STOP),
            "CALL" => Some(OP_CALL),
            "CALLCODE" => Some(OP_CALLCODE),
            "DELEGATECALL" => Some(OP_DELEGATECALL),
            "STATICCALL" => Some(OP_STATICCALL),
            "CREATE" => Some(OP_CREATE),
            "CREATE2" => Some(OP_CREATE2),
            "RETURN" => Some(OP_RETURN),
            "REVERT" => Some(OP_REVERT),
            "INVALID" => Some(OP_INVALID),
            "SELFDESTRUCT" => Some(OP_SELFDESTRUCT),
            _ => None,
        };

        let byte = special
            .or_else(|| numbered(&name, "PUSH", OP_PUSH0, 0..=32))
            .or_else(|| numbered(&name, "DUP", OP_DUP1 - 1, 1..=16))
            .or_else(|| numbered(&name, "SWAP", OP_SWAP1 - 1, 1..=16))
            .or_else(|| numbered(&name, "LOG", OP_LOG0, 0..=4))
            .or_else(|| {
                PLAIN_MNEMONICS
                    .iter()
                    .find(|(_, m)| *m == name)
                    .map(|(b, _)| *b)
            })
            .or_else(|| {
                MNEMONIC_ALIASES
                    .iter()
                    .find(|(m, _)| *m == name)
                    .map(|(_, b)| *b)
            })
            .or_else(|| {
                name.strip_prefix("0X")
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            });

        byte.map(Opcode::from_byte)
            .ok_or_else(|| format!("unknown opcode mnemonic: {}", s))
    }
}

impl TryFrom<String> for Opcode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Opcode> for String {
    fn from(opcode: Opcode) -> Self {
        opcode.mnemonic()
    }
}
