// SPDX-License-Identifier: AGPL-3.0

use crate::cache::Cache;
use alloy_primitives::Address;
use anyhow::Result;
use evmcov_ast::{AstInfo, CoverageEntries};
use evmcov_config::{EngineConfig, FileFilter};
use evmcov_constants::NEW_CONTRACT;
use evmcov_contract::{CompiledArtifact, ContractContext, Opcode, Trace};
use evmcov_coverage::{CoverageReport, EntriesProvider, ProfileReport};
use evmcov_exceptions::EvmcovResult;
use evmcov_logs::ErrorCode;
use evmcov_mapper::{InstructionSourceMap, SourceMapProvider};
use evmcov_resolver::ContractResolver;
use evmcov_revert::{AstInfoProvider, RevertStackTrace};
use std::sync::{Arc, Mutex, PoisonError};

/// Code currently deployed at an address, as lowercase or uppercase hex
pub trait CodeSource {
    fn code_at(&self, address: &Address) -> Option<String>;
}

impl<F> CodeSource for F
where
    F: Fn(&Address) -> Option<String>,
{
    fn code_at(&self, address: &Address) -> Option<String> {
        self(address)
    }
}

/// What the first step of a trace executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceTarget {
    /// A call into code already deployed at the address
    Call(Address),
    /// A deployment running `initcode` (constructor arguments included)
    Creation { initcode: String },
}

impl TraceTarget {
    pub fn start_address(&self) -> Address {
        match self {
            TraceTarget::Call(address) => *address,
            TraceTarget::Creation { .. } => NEW_CONTRACT,
        }
    }

    pub fn context(&self) -> ContractContext {
        match self {
            TraceTarget::Call(_) => ContractContext::Runtime,
            TraceTarget::Creation { .. } => ContractContext::Creation,
        }
    }
}

/// Artifact running some code, and whether the code is its creation or runtime code
pub type Resolution = Option<(Arc<CompiledArtifact>, ContractContext)>;

pub type SourceMapCache = Cache<u64, InstructionSourceMap>;
pub type EntriesCache = Cache<u64, CoverageEntries>;
pub type AstInfoCache = Cache<u64, AstInfo>;
pub type CodeCache = Cache<[u8; 32], Resolution>;

/// Owns the artifact catalog, the caches and the cumulative reports.
///
/// Every method takes `&self`; a recorded trace is merged into the reports only once it has
/// been processed entirely, so a failing trace leaves them untouched.
pub struct Engine {
    config: EngineConfig,
    filter: FileFilter,
    resolver: ContractResolver,
    source_maps: SourceMapCache,
    entries: EntriesCache,
    ast_infos: AstInfoCache,
    codes: CodeCache,
    coverage: Mutex<CoverageReport>,
    profile: Mutex<ProfileReport>,
}

impl Engine {
    pub fn new(config: EngineConfig, artifacts: Vec<CompiledArtifact>) -> Result<Self> {
        let filter = config.file_filter()?;
        let resolver = ContractResolver::new(
            artifacts.into_iter().map(Arc::new).collect(),
            config.min_contract_length,
        );
        evmcov_logs::info(&format!(
            "{} artifact(s) available for resolution",
            resolver.len()
        ));

        Ok(Self {
            config,
            filter,
            resolver,
            source_maps: Cache::new(),
            entries: Cache::new(),
            ast_infos: Cache::new(),
            codes: Cache::new(),
            coverage: Mutex::new(CoverageReport::new()),
            profile: Mutex::new(ProfileReport::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Adds one trace to the cumulative reports selected by the configured mode.
    ///
    /// With `revert_traces` on, a trace whose last step is a REVERT also yields its
    /// source-level stack trace.
    pub fn record_trace(
        &self,
        trace: &Trace,
        target: &TraceTarget,
        code: &dyn CodeSource,
    ) -> EvmcovResult<Option<RevertStackTrace>> {
        let trace = trace.normalized();
        let segmentation = evmcov_traces::segment(&trace, target.start_address())?;

        let mut coverage = CoverageReport::new();
        let mut profile = ProfileReport::new();
        for (address, subtrace) in &segmentation.subtraces {
            let Some((artifact, context)) = self.resolve(address, target, code) else {
                continue;
            };
            if self.config.mode.collects_coverage() {
                evmcov_coverage::add_trace(
                    &mut coverage,
                    subtrace,
                    &artifact,
                    context,
                    self,
                    self,
                )?;
            }
            if self.config.mode.collects_profile() {
                evmcov_coverage::add_profile(
                    &mut profile,
                    subtrace,
                    &artifact,
                    context,
                    self,
                    self,
                )?;
            }
        }

        let reverted = trace.last().is_some_and(|s| s.opcode == Opcode::Revert);
        let revert_trace = if self.config.revert_traces && reverted {
            Some(self.revert_stack_trace(&trace, target, code)?)
        } else {
            None
        };

        self.coverage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(&coverage);
        self.profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(&profile);
        Ok(revert_trace)
    }

    /// Source-level stack trace for the first REVERT of `trace`
    pub fn revert_stack_trace(
        &self,
        trace: &Trace,
        target: &TraceTarget,
        code: &dyn CodeSource,
    ) -> EvmcovResult<RevertStackTrace> {
        let trace = trace.normalized();
        let frames = evmcov_traces::capture_revert_stack(&trace, target.start_address())?;
        let resolve = |address: &Address| {
            self.resolve(address, target, code)
                .map(|(artifact, _)| artifact)
        };
        evmcov_revert::report(&frames, target.context(), &resolve, self, self)
    }

    pub fn coverage(&self) -> CoverageReport {
        self.coverage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn profile(&self) -> ProfileReport {
        self.profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the coverage collected so far and starts over from an empty report
    pub fn take_coverage(&self) -> CoverageReport {
        self.coverage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn take_profile(&self) -> ProfileReport {
        self.profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Artifact and context executing at `address` during a trace of `target`
    fn resolve(
        &self,
        address: &Address,
        target: &TraceTarget,
        code: &dyn CodeSource,
    ) -> Resolution {
        if let TraceTarget::Creation { initcode } = target {
            if *address == NEW_CONTRACT {
                return self.resolve_code(initcode, address);
            }
        }
        let Some(deployed) = code.code_at(address) else {
            evmcov_logs::warn_code(
                ErrorCode::UnresolvedContract,
                &format!("no code known for {}", address),
                false,
            );
            return None;
        };
        self.resolve_code(&deployed, address)
    }

    fn resolve_code(&self, code: &str, address: &Address) -> Resolution {
        let normalized = evmcov_utils::normalized_hex(code);
        let key = evmcov_hashes::keccak256(normalized.as_bytes());
        let resolved = self
            .codes
            .get_or_insert_with(key, || {
                self.resolver
                    .resolve_with_context(&normalized)
                    .map(|(artifact, context)| (artifact.clone(), context))
            });

        if resolved.is_none() {
            evmcov_logs::warn_code(
                ErrorCode::UnresolvedContract,
                &format!(
                    "code at {} ({}) matches no artifact",
                    address,
                    evmcov_utils::shorten_hex(&normalized, 8)
                ),
                false,
            );
        }
        (*resolved).clone()
    }
}

impl SourceMapProvider for Engine {
    fn source_map(
        &self,
        artifact: &CompiledArtifact,
        context: ContractContext,
    ) -> EvmcovResult<Arc<InstructionSourceMap>> {
        let mut parts: Vec<&[u8]> = vec![
            context.name().as_bytes(),
            artifact.source_map(context).as_bytes(),
            artifact.bytecode(context).as_bytes(),
        ];
        parts.extend(artifact.source_files.iter().map(|p| p.as_bytes()));
        parts.extend(artifact.source_texts.iter().map(|t| t.as_bytes()));
        let key = evmcov_hashes::composite_hash(&parts);

        Ok(self
            .source_maps
            .get_or_try_insert_with(key, || evmcov_mapper::decode_artifact(artifact, context))?)
    }
}

impl EntriesProvider for Engine {
    fn entries(
        &self,
        artifact: &CompiledArtifact,
        file_index: usize,
    ) -> EvmcovResult<Option<Arc<CoverageEntries>>> {
        let Some(unit) = artifact.source_unit(file_index) else {
            return Ok(None);
        };
        if self.filter.ignored(unit.path) {
            return Ok(None);
        }
        if unit.ast.is_none() {
            evmcov_logs::warn_code(
                ErrorCode::MissingSource,
                &format!("no AST for {}; it is left out of the reports", unit.path),
                false,
            );
            return Ok(None);
        }

        let key = evmcov_hashes::content_hash(unit.text);
        let entries = self
            .entries
            .get_or_try_insert_with(key, || evmcov_ast::extract(&unit))?;
        Ok(Some(entries))
    }
}

impl AstInfoProvider for Engine {
    fn ast_info(
        &self,
        artifact: &CompiledArtifact,
        file_index: usize,
    ) -> EvmcovResult<Option<Arc<AstInfo>>> {
        let Some(unit) = artifact.source_unit(file_index) else {
            return Ok(None);
        };
        if unit.ast.is_none() {
            return Ok(None);
        }
        let key = evmcov_hashes::content_hash(unit.text);
        let info = self
            .ast_infos
            .get_or_try_insert_with(key, || AstInfo::collect(&unit))?;
        Ok(Some(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn artifact(name: &str, runtime: &str) -> CompiledArtifact {
        CompiledArtifact {
            name: name.to_string(),
            runtime_bytecode: runtime.to_string(),
            ..Default::default()
        }
    }

    fn engine(artifacts: Vec<CompiledArtifact>) -> Engine {
        let config = EngineConfig {
            min_contract_length: 2,
            ..Default::default()
        };
        Engine::new(config, artifacts).unwrap()
    }

    #[test]
    fn test_target_context() {
        let call = TraceTarget::Call(address!("00000000000000000000000000000000000000aa"));
        assert_eq!(call.context(), ContractContext::Runtime);
        assert_eq!(
            call.start_address(),
            address!("00000000000000000000000000000000000000aa")
        );
        let creation = TraceTarget::Creation {
            initcode: "0x6080".to_string(),
        };
        assert_eq!(creation.context(), ContractContext::Creation);
        assert_eq!(creation.start_address(), NEW_CONTRACT);
    }

    #[test]
    fn test_resolution_is_cached_by_code() {
        let engine = engine(vec![artifact("A", "0x6001600055")]);
        let code = |_: &Address| Some("0x6001600055".to_string());
        let target = TraceTarget::Call(Address::repeat_byte(1));

        let (a, context) = engine
            .resolve(&Address::repeat_byte(1), &target, &code)
            .unwrap();
        assert_eq!(a.name, "A");
        assert_eq!(context, ContractContext::Runtime);
        engine.resolve(&Address::repeat_byte(2), &target, &code);
        assert_eq!(engine.codes.len(), 1);
    }

    #[test]
    fn test_unknown_code_is_unresolved() {
        let engine = engine(vec![artifact("A", "0x6001600055")]);
        let target = TraceTarget::Call(Address::repeat_byte(1));
        let no_code = |_: &Address| -> Option<String> { None };
        assert!(engine
            .resolve(&Address::repeat_byte(1), &target, &no_code)
            .is_none());
        let other = |_: &Address| Some("0x6002600055".to_string());
        assert!(engine
            .resolve(&Address::repeat_byte(1), &target, &other)
            .is_none());
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let config = EngineConfig {
            ignore_files: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(Engine::new(config, vec![]).is_err());
    }
}
