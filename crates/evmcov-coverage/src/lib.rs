// SPDX-License-Identifier: AGPL-3.0

//! Coverage and gas profiling over per-contract subtraces
//!
//! The aggregator never parses or decodes anything itself: source maps and coverage
//! entries come from providers, which the engine backs with its caches.

pub mod istanbul;
pub mod profile;
pub mod report;

pub use profile::{FileProfile, ProfileReport};
pub use report::{CoverageReport, CoverageSummary, Counter, FileCoverage};
pub use evmcov_mapper::SourceMapProvider;

use evmcov_ast::CoverageEntries;
use evmcov_contract::{CompiledArtifact, ContractContext, ExecutionStep, Location};
use evmcov_exceptions::EvmcovResult;
use evmcov_mapper::InstructionSourceMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Coverage entries of one source file of an artifact
pub trait EntriesProvider {
    /// `None` when the file takes no part in the reports (no AST, or ignored).
    fn entries(
        &self,
        artifact: &CompiledArtifact,
        file_index: usize,
    ) -> EvmcovResult<Option<Arc<CoverageEntries>>>;
}

/// Distinct source ranges hit by `subtrace`, grouped by source id
fn ranges_by_file(
    subtrace: &[&ExecutionStep],
    map: &InstructionSourceMap,
) -> BTreeMap<usize, BTreeSet<Location>> {
    let mut by_file: BTreeMap<usize, BTreeSet<Location>> = BTreeMap::new();
    for step in subtrace {
        if let Some(range) = map.get(step.pc) {
            by_file
                .entry(range.file_index)
                .or_default()
                .insert(range.location);
        }
    }
    by_file
}

/// Gas per distinct source range hit by `subtrace`, grouped by source id
fn costs_by_file(
    subtrace: &[&ExecutionStep],
    map: &InstructionSourceMap,
) -> BTreeMap<usize, BTreeMap<Location, u64>> {
    let mut by_file: BTreeMap<usize, BTreeMap<Location, u64>> = BTreeMap::new();
    for step in subtrace {
        if let Some(range) = map.get(step.pc) {
            let gas = by_file
                .entry(range.file_index)
                .or_default()
                .entry(range.location)
                .or_default();
            *gas = gas.saturating_add(step.gas_cost);
        }
    }
    by_file
}

/// Records one contract's subtrace into `report`.
pub fn add_trace(
    report: &mut CoverageReport,
    subtrace: &[&ExecutionStep],
    artifact: &CompiledArtifact,
    context: ContractContext,
    entries: &dyn EntriesProvider,
    maps: &dyn SourceMapProvider,
) -> EvmcovResult<()> {
    let map = maps.source_map(artifact, context)?;

    for (file_index, ranges) in ranges_by_file(subtrace, &map) {
        let Some(path) = artifact.source_files.get(file_index) else {
            continue;
        };
        let Some(file_entries) = entries.entries(artifact, file_index)? else {
            continue;
        };
        let ranges: Vec<Location> = ranges.into_iter().collect();
        report.add_file(path, FileCoverage::from_ranges(file_entries, &ranges));
    }
    Ok(())
}

/// Adds the gas of one contract's subtrace to `report`.
pub fn add_profile(
    report: &mut ProfileReport,
    subtrace: &[&ExecutionStep],
    artifact: &CompiledArtifact,
    context: ContractContext,
    entries: &dyn EntriesProvider,
    maps: &dyn SourceMapProvider,
) -> EvmcovResult<()> {
    let map = maps.source_map(artifact, context)?;

    for (file_index, costs) in costs_by_file(subtrace, &map) {
        let Some(path) = artifact.source_files.get(file_index) else {
            continue;
        };
        let Some(file_entries) = entries.entries(artifact, file_index)? else {
            continue;
        };
        let costs: Vec<(Location, u64)> = costs.into_iter().collect();
        report.add_file(path, FileProfile::from_costs(file_entries, &costs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmcov_ast::{BranchEntry, BranchKind, FunctionEntry};
    use evmcov_contract::{Opcode, Position};
    use evmcov_mapper::{decode, SourceFile};

    fn at(line: usize, start: usize, end: usize) -> Location {
        Location::new(Position::new(line, start), Position::new(line, end))
    }

    fn span(from: (usize, usize), to: (usize, usize)) -> Location {
        Location::new(Position::new(from.0, from.1), Position::new(to.0, to.1))
    }

    fn entries() -> Arc<CoverageEntries> {
        Arc::new(CoverageEntries {
            functions: vec![
                FunctionEntry {
                    name: "set".to_string(),
                    line: 2,
                    location: span((2, 0), (4, 1)),
                },
                FunctionEntry {
                    name: "get".to_string(),
                    line: 5,
                    location: span((5, 0), (7, 1)),
                },
            ],
            statements: vec![at(2, 20, 29), at(3, 4, 10), at(6, 4, 12)],
            branches: vec![BranchEntry {
                line: 3,
                kind: BranchKind::If,
                locations: [at(3, 4, 6), at(3, 7, 10)],
            }],
            zero_arg_modifier_statement_ids: vec![0],
        })
    }

    #[test]
    fn test_hits_by_containment() {
        let coverage = FileCoverage::from_ranges(entries(), &[at(3, 5, 6)]);
        assert_eq!(coverage.functions, vec![true, false]);
        assert_eq!(coverage.statements, vec![true, true, false]);
        assert_eq!(coverage.branches, vec![[true, false]]);
    }

    #[test]
    fn test_modifier_inference_needs_function_hit() {
        let coverage = FileCoverage::from_ranges(entries(), &[at(6, 4, 12)]);
        assert_eq!(coverage.functions, vec![false, true]);
        assert_eq!(coverage.statements, vec![false, false, true]);
    }

    #[test]
    fn test_modifier_inference_needs_statement_hit() {
        // the dispatcher jump maps to the whole function and runs none of its statements
        let coverage = FileCoverage::from_ranges(entries(), &[span((2, 0), (4, 1))]);
        assert_eq!(coverage.functions, vec![true, false]);
        assert_eq!(coverage.statements, vec![false, false, false]);
    }

    #[test]
    fn test_merge_is_idempotent_and_commutative() {
        let mut a = CoverageReport::new();
        a.add_file("A.sol", FileCoverage::from_ranges(entries(), &[at(3, 5, 6)]));
        let mut b = CoverageReport::new();
        b.add_file("A.sol", FileCoverage::from_ranges(entries(), &[at(6, 4, 12)]));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);

        let mut twice = ab.clone();
        twice.merge(&ab);
        assert_eq!(twice, ab);
        assert_eq!(ab.get("A.sol").unwrap().functions, vec![true, true]);
    }

    #[test]
    fn test_summary() {
        let mut report = CoverageReport::new();
        report.add_file("A.sol", FileCoverage::from_ranges(entries(), &[at(3, 5, 6)]));
        let summary = report.summary();
        assert_eq!(summary.functions, Counter { hit: 1, total: 2 });
        assert_eq!(summary.statements, Counter { hit: 2, total: 3 });
        assert_eq!(summary.branches, Counter { hit: 1, total: 2 });
        assert_eq!(summary.branches.percent(), 50.0);
        assert_eq!(Counter::default().percent(), 100.0);
    }

    #[test]
    fn test_profile_sums_contained_gas() {
        let costs = vec![(at(3, 4, 10), 20_000), (at(3, 5, 6), 3), (at(6, 4, 12), 2_100)];
        let profile = FileProfile::from_costs(entries(), &costs);
        assert_eq!(profile.statements, vec![0, 20_003, 2_100]);
        assert_eq!(profile.functions, vec![20_003, 2_100]);
    }

    #[test]
    fn test_profile_merge_adds() {
        let costs = vec![(at(6, 4, 12), 100)];
        let mut report = ProfileReport::new();
        report.add_file("A.sol", FileProfile::from_costs(entries(), &costs));
        let copy = report.clone();
        report.merge(&copy);
        assert_eq!(report.get("A.sol").unwrap().statements[2], 200);
    }

    #[test]
    fn test_take_resets() {
        let mut report = CoverageReport::new();
        report.add_file("A.sol", FileCoverage::new(entries()));
        let taken = report.take();
        assert!(report.is_empty());
        assert_eq!(taken.files.len(), 1);
    }

    struct Fixed {
        entries: Arc<CoverageEntries>,
        map: Arc<InstructionSourceMap>,
    }

    impl EntriesProvider for Fixed {
        fn entries(&self, _: &CompiledArtifact, file_index: usize) -> EvmcovResult<Option<Arc<CoverageEntries>>> {
            Ok((file_index == 0).then(|| self.entries.clone()))
        }
    }

    impl SourceMapProvider for Fixed {
        fn source_map(&self, _: &CompiledArtifact, _: ContractContext) -> EvmcovResult<Arc<InstructionSourceMap>> {
            Ok(self.map.clone())
        }
    }

    #[test]
    fn test_add_trace_and_profile() {
        let text = "contract C {\nfunction set() public {\n    x = 1;\n}\nfunction get() public {\n    return x;\n}\n}\n";
        let artifact = CompiledArtifact {
            name: "C".to_string(),
            source_files: vec!["C.sol".to_string()],
            source_texts: vec![text.to_string()],
            ..Default::default()
        };
        // three one-byte instructions; the second maps to `x = 1`
        let x_assign = text.find("x = 1").unwrap();
        let source_map = format!("0:0:-1;{}:5:0;0:0:-1", x_assign);
        let map = decode(&source_map, "5b5b00", &[SourceFile::new("C.sol", text)]).unwrap();
        let provider = Fixed {
            entries: entries(),
            map: Arc::new(map),
        };

        let steps = vec![
            ExecutionStep::new(0, Opcode::Other(0x5b), 0).with_gas_cost(1),
            ExecutionStep::new(1, Opcode::Other(0x5b), 0).with_gas_cost(5),
            ExecutionStep::new(1, Opcode::Other(0x5b), 0).with_gas_cost(5),
            ExecutionStep::new(2, Opcode::Stop, 0),
        ];
        let subtrace: Vec<&ExecutionStep> = steps.iter().collect();

        let mut coverage = CoverageReport::new();
        add_trace(&mut coverage, &subtrace, &artifact, ContractContext::Runtime, &provider, &provider).unwrap();
        let file = coverage.get("C.sol").unwrap();
        assert_eq!(file.statements, vec![true, true, false]);

        let mut profile = ProfileReport::new();
        add_profile(&mut profile, &subtrace, &artifact, ContractContext::Runtime, &provider, &provider).unwrap();
        assert_eq!(profile.get("C.sol").unwrap().statements[1], 10);
    }
}
