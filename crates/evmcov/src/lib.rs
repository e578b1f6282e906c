// SPDX-License-Identifier: AGPL-3.0

//! EVM execution-trace analysis: coverage, gas profiling and revert stack traces
//!
//! An [`Engine`] is built once from the compiled artifacts of a project. Traces fed to
//! [`Engine::record_trace`] accumulate into coverage and profile reports; reverted traces
//! can be turned into source-level stack traces with [`Engine::revert_stack_trace`].

pub mod cache;
mod engine;

pub use engine::{
    AstInfoCache, CodeCache, CodeSource, Engine, EntriesCache, Resolution, SourceMapCache,
    TraceTarget,
};

pub use evmcov_config::{CoverageMode, EngineConfig};
pub use evmcov_contract::{CompiledArtifact, ContractContext, ExecutionStep, Opcode, Trace};
pub use evmcov_coverage::{CoverageReport, CoverageSummary, ProfileReport};
pub use evmcov_exceptions::EvmcovException as EngineError;
pub use evmcov_revert::{RevertFrame, RevertStackTrace};

pub type EngineResult<T> = Result<T, EngineError>;
