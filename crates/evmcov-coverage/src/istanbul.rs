// SPDX-License-Identifier: AGPL-3.0

//! Istanbul JSON and LCOV renderings of the reports

use crate::profile::ProfileReport;
use crate::report::CoverageReport;
use evmcov_ast::CoverageEntries;
use evmcov_contract::Location;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt::Write;

fn loc(location: &Location) -> JsonValue {
    json!({
        "start": {"line": location.start.line, "column": location.start.column},
        "end": {"line": location.end.line, "column": location.end.column},
    })
}

fn indexed<T>(items: impl IntoIterator<Item = T>, f: impl Fn(T) -> JsonValue) -> JsonValue {
    JsonValue::Object(
        items
            .into_iter()
            .enumerate()
            .map(|(id, item)| (id.to_string(), f(item)))
            .collect::<Map<_, _>>(),
    )
}

/// `path`, `fnMap`, `statementMap` and `branchMap` of one file
fn file_maps(path: &str, entries: &CoverageEntries) -> Map<String, JsonValue> {
    let mut file = Map::new();
    file.insert("path".to_string(), json!(path));
    file.insert(
        "fnMap".to_string(),
        indexed(&entries.functions, |f| {
            json!({"name": f.name, "line": f.line, "loc": loc(&f.location)})
        }),
    );
    file.insert("statementMap".to_string(), indexed(&entries.statements, loc));
    file.insert(
        "branchMap".to_string(),
        indexed(&entries.branches, |b| {
            json!({
                "line": b.line,
                "type": b.kind.name(),
                "locations": [loc(&b.locations[0]), loc(&b.locations[1])],
            })
        }),
    );
    file
}

fn count(hit: bool) -> u64 {
    u64::from(hit)
}

impl CoverageReport {
    /// Istanbul `coverage.json` object: one entry per file, hits as 0/1 counts
    pub fn to_istanbul(&self) -> JsonValue {
        let files = self
            .files
            .iter()
            .map(|(path, coverage)| {
                let mut file = file_maps(path, &coverage.entries);
                file.insert("f".to_string(), indexed(&coverage.functions, |h| json!(count(*h))));
                file.insert("s".to_string(), indexed(&coverage.statements, |h| json!(count(*h))));
                file.insert(
                    "b".to_string(),
                    indexed(&coverage.branches, |h| json!([count(h[0]), count(h[1])])),
                );
                (path.clone(), JsonValue::Object(file))
            })
            .collect::<Map<_, _>>();
        JsonValue::Object(files)
    }

    /// LCOV tracefile with function, branch and line records
    pub fn to_lcov(&self) -> String {
        let mut out = String::new();
        for (path, coverage) in &self.files {
            let entries = &coverage.entries;
            let _ = writeln!(out, "TN:");
            let _ = writeln!(out, "SF:{}", path);

            for function in &entries.functions {
                let _ = writeln!(out, "FN:{},{}", function.line, function.name);
            }
            for (function, hit) in entries.functions.iter().zip(&coverage.functions) {
                let _ = writeln!(out, "FNDA:{},{}", count(*hit), function.name);
            }
            let _ = writeln!(out, "FNF:{}", entries.functions.len());
            let _ = writeln!(out, "FNH:{}", coverage.functions.iter().filter(|h| **h).count());

            for (id, (branch, hits)) in entries.branches.iter().zip(&coverage.branches).enumerate() {
                for (arm, hit) in hits.iter().enumerate() {
                    let _ = writeln!(out, "BRDA:{},{},{},{}", branch.line, id, arm, count(*hit));
                }
            }
            let _ = writeln!(out, "BRF:{}", coverage.branches.len() * 2);
            let _ = writeln!(
                out,
                "BRH:{}",
                coverage.branches.iter().flatten().filter(|h| **h).count()
            );

            // a line is hit when any statement starting on it is
            let mut lines: BTreeMap<usize, bool> = BTreeMap::new();
            for (statement, hit) in entries.statements.iter().zip(&coverage.statements) {
                *lines.entry(statement.start.line).or_default() |= *hit;
            }
            for (line, hit) in &lines {
                let _ = writeln!(out, "DA:{},{}", line, count(*hit));
            }
            let _ = writeln!(out, "LF:{}", lines.len());
            let _ = writeln!(out, "LH:{}", lines.values().filter(|h| **h).count());
            let _ = writeln!(out, "end_of_record");
        }
        out
    }
}

impl ProfileReport {
    /// Istanbul-shaped object whose counts are gas instead of hits
    pub fn to_istanbul(&self) -> JsonValue {
        let files = self
            .files
            .iter()
            .map(|(path, profile)| {
                let mut file = file_maps(path, &profile.entries);
                file.insert("f".to_string(), indexed(&profile.functions, |g| json!(g)));
                file.insert("s".to_string(), indexed(&profile.statements, |g| json!(g)));
                file.insert(
                    "b".to_string(),
                    indexed(&profile.entries.branches, |_| json!([0, 0])),
                );
                (path.clone(), JsonValue::Object(file))
            })
            .collect::<Map<_, _>>();
        JsonValue::Object(files)
    }
}
