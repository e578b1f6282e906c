// SPDX-License-Identifier: AGPL-3.0

//! Terminal colouring and hex string helpers

use colored::Colorize;

pub fn red(text: &str) -> String {
    text.red().to_string()
}

pub fn yellow(text: &str) -> String {
    text.yellow().to_string()
}

pub fn cyan(text: &str) -> String {
    text.cyan().to_string()
}

/// Prefixes every line of `text` with `n` spaces
pub fn indent_text(text: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    let lines: Vec<String> = text.lines().map(|line| format!("{pad}{line}")).collect();
    lines.join("\n")
}

/// `hexstring` without its `0x`/`0X` prefix
pub fn stripped(hexstring: &str) -> &str {
    hexstring
        .strip_prefix("0x")
        .or_else(|| hexstring.strip_prefix("0X"))
        .unwrap_or(hexstring)
}

/// Lowercase hex without prefix, the canonical form bytecode is compared in
pub fn normalized_hex(hexstring: &str) -> String {
    stripped(hexstring.trim()).to_ascii_lowercase()
}

/// Abbreviates long hex strings for log output: `0x60806040…0033`
pub fn shorten_hex(hexstring: &str, keep: usize) -> String {
    let body = stripped(hexstring);
    match (body.get(..keep), body.get(body.len().saturating_sub(keep)..)) {
        (Some(head), Some(tail)) if body.len() > keep * 2 => format!("0x{head}…{tail}"),
        _ => format!("0x{body}"),
    }
}
