//! The load pipeline.
//!
//! Loading a system works as follows:
//! 1. **Compile**: bundle the entry module and every relative import
//! 2. **Evaluate**: run the bundle in a fresh sandbox and read `system`
//! 3. **Resolve**: invoke factories and force deferred values
//! 4. **Normalize**: validate into a [`SystemDefinition`]
//!
//! Failures in steps 1 and 2 are logged and yield `Ok(None)`; later failures
//! are returned as [`LoadError`].

use game_rules::SystemDefinition;
use rhai::Module;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::compiler::{compile, CompilerRuntime};
use crate::config::LoaderConfig;
use crate::error::{CompileError, Diagnostic, LoadError};
use crate::normalize::SystemNormalizer;
use crate::sandbox::SandboxEvaluator;
use crate::source::{normalize_path, ContentSource};

/// Identifies one `load_system` call in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadId(pub Uuid);

impl LoadId {
    /// Create a new random load ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LoadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a load is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Uninitialized,
    Compiling,
    CompileFailed,
    Compiled,
    Evaluating,
    EvalFailed,
    Evaluated,
    ResolvingFactories,
    FactoryFailed,
    Resolved,
    Normalizing,
    NormalizeFailed,
    Ready,
}

impl LoadStage {
    /// Check whether `next` may follow this stage.
    pub fn can_advance_to(self, next: LoadStage) -> bool {
        use LoadStage::*;
        matches!(
            (self, next),
            (Uninitialized, Compiling)
                | (Compiling, CompileFailed | Compiled)
                | (Compiled, Evaluating)
                | (Evaluating, EvalFailed | Evaluated)
                | (Evaluated, ResolvingFactories)
                | (ResolvingFactories, FactoryFailed | Resolved)
                | (Resolved, Normalizing)
                | (Normalizing, NormalizeFailed | Ready)
        )
    }

    /// Check whether the load stopped here.
    pub fn is_terminal(self) -> bool {
        self.is_failure() || self == LoadStage::Ready
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            LoadStage::CompileFailed
                | LoadStage::EvalFailed
                | LoadStage::FactoryFailed
                | LoadStage::NormalizeFailed
        )
    }

    /// Soft failures are logged and surface as `Ok(None)`.
    pub fn is_soft_failure(self) -> bool {
        matches!(self, LoadStage::CompileFailed | LoadStage::EvalFailed)
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStage::Uninitialized => "uninitialized",
            LoadStage::Compiling => "compiling",
            LoadStage::CompileFailed => "compile_failed",
            LoadStage::Compiled => "compiled",
            LoadStage::Evaluating => "evaluating",
            LoadStage::EvalFailed => "eval_failed",
            LoadStage::Evaluated => "evaluated",
            LoadStage::ResolvingFactories => "resolving_factories",
            LoadStage::FactoryFailed => "factory_failed",
            LoadStage::Resolved => "resolved",
            LoadStage::Normalizing => "normalizing",
            LoadStage::NormalizeFailed => "normalize_failed",
            LoadStage::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Everything a single load produced.
#[derive(Debug)]
pub struct LoadReport {
    pub load_id: LoadId,
    pub entry: String,
    /// The terminal stage.
    pub stage: LoadStage,
    pub diagnostics: Vec<Diagnostic>,
    pub outcome: Result<Option<SystemDefinition>, LoadError>,
}

impl LoadReport {
    fn new(entry: String) -> Self {
        Self {
            load_id: LoadId::new(),
            entry,
            stage: LoadStage::Uninitialized,
            diagnostics: Vec::new(),
            outcome: Ok(None),
        }
    }

    fn advance(&mut self, next: LoadStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "invalid stage transition {} -> {}",
            self.stage,
            next
        );
        debug!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }

    fn fail(mut self, stage: LoadStage, error: LoadError) -> Self {
        self.advance(stage);
        self.outcome = Err(error);
        self
    }

    /// The public result of the load.
    pub fn into_result(self) -> Result<Option<SystemDefinition>, LoadError> {
        self.outcome
    }
}

/// Loads rules systems from a content source.
pub struct RulesLoader {
    runtime: Arc<CompilerRuntime>,
    source: Arc<dyn ContentSource>,
    config: LoaderConfig,
    sandbox: SandboxEvaluator,
}

impl RulesLoader {
    /// Create a loader on the process-wide compiler runtime.
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            runtime: CompilerRuntime::global(),
            source,
            config: LoaderConfig::default(),
            sandbox: SandboxEvaluator::new(),
        }
    }

    /// Use a dedicated compiler runtime.
    pub fn with_runtime(mut self, runtime: Arc<CompilerRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Make a host module importable by authored scripts.
    pub fn with_host_module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.sandbox = self.sandbox.with_host_module(name, module);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Path of the entry module inside `folder`.
    pub fn entry_path(&self, folder: &str) -> String {
        normalize_path(&format!("{}/{}", folder, self.config.entry_file))
    }

    /// Load the system whose entry module lives in `folder`.
    pub async fn load_system(&self, folder: &str) -> Result<Option<SystemDefinition>, LoadError> {
        self.load(folder).await.into_result()
    }

    /// Load a system and report how far the load got.
    pub async fn load(&self, folder: &str) -> LoadReport {
        let report = LoadReport::new(self.entry_path(folder));
        let span = info_span!("load_system", load_id = %report.load_id, entry = %report.entry);
        self.run(report).instrument(span).await
    }

    async fn run(&self, mut report: LoadReport) -> LoadReport {
        self.runtime
            .initialize(self.config.backend_profile.as_deref())
            .await;

        report.advance(LoadStage::Compiling);
        let bundle = match compile(&self.runtime, &report.entry, self.source.clone())
            .await
            .into_result()
        {
            Ok(bundle) => bundle,
            Err(diagnostics) => {
                for diagnostic in &diagnostics {
                    error!(
                        path = diagnostic.path.as_deref().unwrap_or_default(),
                        line = diagnostic.line,
                        "{}",
                        diagnostic.message
                    );
                }
                let failure = CompileError(diagnostics);
                warn!(error = %failure, "system not loaded");
                report.diagnostics = failure.0;
                report.advance(LoadStage::CompileFailed);
                return report;
            }
        };
        report.advance(LoadStage::Compiled);

        report.advance(LoadStage::Evaluating);
        let evaluated = match self.sandbox.try_evaluate(bundle, self.source.clone()).await {
            Ok(evaluated) => evaluated,
            Err(e) => {
                warn!(error = %e, "system not loaded");
                report.advance(LoadStage::EvalFailed);
                return report;
            }
        };
        report.advance(LoadStage::Evaluated);

        let normalizer = SystemNormalizer::new(evaluated.runtime.clone());
        report.advance(LoadStage::ResolvingFactories);
        let config = match normalizer.resolve_raw(evaluated.system, &evaluated.wiki).await {
            Ok(config) => config,
            Err(e) => return report.fail(LoadStage::FactoryFailed, e),
        };
        report.advance(LoadStage::Resolved);

        report.advance(LoadStage::Normalizing);
        match normalizer.build_exported(config) {
            Ok(system) => {
                report.advance(LoadStage::Ready);
                report.outcome = Ok(Some(system));
                report
            }
            Err(e) => report.fail(LoadStage::NormalizeFailed, e.into()),
        }
    }
}

/// Load a system with the process-wide compiler runtime and default settings.
pub async fn load_system(
    source: Arc<dyn ContentSource>,
    entry_folder: &str,
) -> Result<Option<SystemDefinition>, LoadError> {
    RulesLoader::new(source).load_system(entry_folder).await
}

/// Initialize the process-wide compiler runtime ahead of the first load.
pub async fn initialize_compiler(backend_location_override: Option<&Path>) {
    CompilerRuntime::global()
        .initialize(backend_location_override)
        .await;
}
