// SPDX-License-Identifier: AGPL-3.0

//! Cumulative coverage, merged by boolean union

use evmcov_ast::CoverageEntries;
use evmcov_contract::Location;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Hit flags of one file, indexed like the tables of its entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCoverage {
    pub entries: Arc<CoverageEntries>,
    pub functions: Vec<bool>,
    pub statements: Vec<bool>,
    pub branches: Vec<[bool; 2]>,
}

impl FileCoverage {
    pub fn new(entries: Arc<CoverageEntries>) -> Self {
        Self {
            functions: vec![false; entries.functions.len()],
            statements: vec![false; entries.statements.len()],
            branches: vec![[false; 2]; entries.branches.len()],
            entries,
        }
    }

    /// Hits of a single execution whose instructions mapped to `ranges`
    pub fn from_ranges(entries: Arc<CoverageEntries>, ranges: &[Location]) -> Self {
        let hit = |location: &Location| ranges.iter().any(|r| location.contains(r));

        let mut coverage = Self::new(entries.clone());
        for (id, function) in entries.functions.iter().enumerate() {
            coverage.functions[id] = hit(&function.location);
        }
        for (id, statement) in entries.statements.iter().enumerate() {
            coverage.statements[id] = hit(statement);
        }
        for (id, branch) in entries.branches.iter().enumerate() {
            coverage.branches[id] = [hit(&branch.locations[0]), hit(&branch.locations[1])];
        }
        coverage.infer_modifier_invocations();
        coverage
    }

    /// Modifiers invoked without arguments leave no instruction mapped to the invocation
    /// itself, so they count as executed when a statement of the function they decorate ran.
    ///
    /// Approximation: a function that reverts inside an earlier modifier still marks the
    /// later invocations as covered.
    fn infer_modifier_invocations(&mut self) {
        for &id in &self.entries.zero_arg_modifier_statement_ids {
            if self.statements.get(id).copied().unwrap_or(true) {
                continue;
            }
            let invocation = self.entries.statements[id];
            let enclosing = self
                .entries
                .functions
                .iter()
                .position(|f| f.location.contains(&invocation));
            if let Some(function) = enclosing {
                let body = self.entries.functions[function].location;
                self.statements[id] = self.has_covered_statement_in(&body);
            }
        }
    }

    /// True when a statement inside `scope` was hit. Zero-argument modifier invocations are
    /// themselves inferred and do not count.
    fn has_covered_statement_in(&self, scope: &Location) -> bool {
        let inferred = &self.entries.zero_arg_modifier_statement_ids;
        self.entries
            .statements
            .iter()
            .zip(&self.statements)
            .enumerate()
            .any(|(id, (location, hit))| {
                *hit && !inferred.contains(&id) && scope.contains(location)
            })
    }

    /// Boolean union with another coverage of the same file
    pub fn merge(&mut self, other: &FileCoverage) {
        fn union(into: &mut [bool], from: &[bool]) {
            into.iter_mut().zip(from).for_each(|(a, b)| *a |= *b);
        }
        union(&mut self.functions, &other.functions);
        union(&mut self.statements, &other.statements);
        for (a, b) in self.branches.iter_mut().zip(&other.branches) {
            a[0] |= b[0];
            a[1] |= b[1];
        }
    }

    pub fn summary(&self) -> CoverageSummary {
        CoverageSummary {
            functions: Counter::of(&self.functions),
            statements: Counter::of(&self.statements),
            branches: Counter::of(
                &self
                    .branches
                    .iter()
                    .flat_map(|b| b.iter().copied())
                    .collect::<Vec<_>>(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub hit: usize,
    pub total: usize,
}

impl Counter {
    fn of(flags: &[bool]) -> Self {
        Self {
            hit: flags.iter().filter(|f| **f).count(),
            total: flags.len(),
        }
    }

    fn add(&mut self, other: Counter) {
        self.hit += other.hit;
        self.total += other.total;
    }

    /// Percentage covered; 100 when there is nothing to cover
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.hit as f64 * 100.0 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoverageSummary {
    pub functions: Counter,
    pub statements: Counter,
    pub branches: Counter,
}

/// Coverage of every file seen so far, keyed by source path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    pub files: BTreeMap<String, FileCoverage>,
}

impl CoverageReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Union of a single file's coverage into the report
    pub fn add_file(&mut self, path: &str, coverage: FileCoverage) {
        match self.files.get_mut(path) {
            Some(existing) => existing.merge(&coverage),
            None => {
                self.files.insert(path.to_string(), coverage);
            }
        }
    }

    /// Boolean union; merging a report into itself changes nothing
    pub fn merge(&mut self, other: &CoverageReport) {
        for (path, coverage) in &other.files {
            self.add_file(path, coverage.clone());
        }
    }

    pub fn summary(&self) -> CoverageSummary {
        let mut total = CoverageSummary::default();
        for file in self.files.values() {
            let summary = file.summary();
            total.functions.add(summary.functions);
            total.statements.add(summary.statements);
            total.branches.add(summary.branches);
        }
        total
    }

    /// Hands out the accumulated report and starts over
    pub fn take(&mut self) -> CoverageReport {
        std::mem::take(self)
    }
}
