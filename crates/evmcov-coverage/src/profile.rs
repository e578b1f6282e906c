// SPDX-License-Identifier: AGPL-3.0

//! Gas spent per statement and function, merged by addition

use evmcov_ast::CoverageEntries;
use evmcov_contract::Location;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProfile {
    pub entries: Arc<CoverageEntries>,
    pub functions: Vec<u64>,
    pub statements: Vec<u64>,
}

impl FileProfile {
    pub fn new(entries: Arc<CoverageEntries>) -> Self {
        Self {
            functions: vec![0; entries.functions.len()],
            statements: vec![0; entries.statements.len()],
            entries,
        }
    }

    /// Gas of a single execution, given as `(range, gas)` per distinct mapped range
    pub fn from_costs(entries: Arc<CoverageEntries>, costs: &[(Location, u64)]) -> Self {
        let spent = |location: &Location| -> u64 {
            costs
                .iter()
                .filter(|(range, _)| location.contains(range))
                .map(|(_, gas)| gas)
                .sum()
        };

        let mut profile = Self::new(entries.clone());
        for (id, function) in entries.functions.iter().enumerate() {
            profile.functions[id] = spent(&function.location);
        }
        for (id, statement) in entries.statements.iter().enumerate() {
            profile.statements[id] = spent(statement);
        }
        profile
    }

    pub fn merge(&mut self, other: &FileProfile) {
        fn add(into: &mut [u64], from: &[u64]) {
            into.iter_mut()
                .zip(from)
                .for_each(|(a, b)| *a = a.saturating_add(*b));
        }
        add(&mut self.functions, &other.functions);
        add(&mut self.statements, &other.statements);
    }
}

/// Gas profile of every file seen so far, keyed by source path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileReport {
    pub files: BTreeMap<String, FileProfile>,
}

impl ProfileReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileProfile> {
        self.files.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn add_file(&mut self, path: &str, profile: FileProfile) {
        match self.files.get_mut(path) {
            Some(existing) => existing.merge(&profile),
            None => {
                self.files.insert(path.to_string(), profile);
            }
        }
    }

    pub fn merge(&mut self, other: &ProfileReport) {
        for (path, profile) in &other.files {
            self.add_file(path, profile.clone());
        }
    }

    pub fn take(&mut self) -> ProfileReport {
        std::mem::take(self)
    }
}
