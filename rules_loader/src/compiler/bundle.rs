//! Bundling an entry module and its resolved imports.

use rhai::{ASTNode, Expr, ParseError, Stmt, AST};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

use super::resolver::{ImportKind, Resolved, VaultResolver};
use super::runtime::{Backend, CompilerRuntime};
use crate::config::BackendProfile;
use crate::error::Diagnostic;
use crate::source::ContentSource;

/// One self-contained compiled module graph.
#[derive(Debug, Clone)]
pub struct Bundle {
    entry: String,
    modules: BTreeMap<String, AST>,
    links: HashMap<(String, String), String>,
    profile: BackendProfile,
}

impl Bundle {
    /// Path of the entry module.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Parsed entry module.
    pub fn entry_ast(&self) -> &AST {
        // The entry is inserted before a bundle is ever built.
        &self.modules[&self.entry]
    }

    /// Parsed module at `path`.
    pub fn module(&self, path: &str) -> Option<&AST> {
        self.modules.get(path)
    }

    /// Every bundled module, entry included.
    pub fn modules(&self) -> impl Iterator<Item = (&str, &AST)> {
        self.modules.iter().map(|(path, ast)| (path.as_str(), ast))
    }

    /// The bundled path an importer's specifier resolved to.
    pub fn link(&self, importer: &str, specifier: &str) -> Option<&str> {
        self.links
            .get(&(importer.to_string(), specifier.to_string()))
            .map(String::as_str)
    }

    /// Limits of the backend that produced this bundle.
    pub fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    /// Number of modules in the bundle.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Always false: a bundle holds at least its entry.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// A single-module bundle parsed straight from text.
    #[cfg(test)]
    pub(crate) fn from_source(path: &str, text: &str, profile: BackendProfile) -> Self {
        let mut engine = rhai::Engine::new_raw();
        profile.apply(&mut engine);
        let mut ast = engine.compile(text).unwrap();
        ast.set_source(path);
        Self {
            entry: path.to_string(),
            modules: BTreeMap::from([(path.to_string(), ast)]),
            links: HashMap::new(),
            profile,
        }
    }
}

/// Result of a compile: a bundle, or the diagnostics that prevented one.
#[derive(Debug, Clone)]
pub struct CompiledBundle {
    pub bundle: Option<Bundle>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledBundle {
    fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            bundle: None,
            diagnostics,
        }
    }

    /// Check whether a bundle was produced.
    pub fn is_ok(&self) -> bool {
        self.bundle.is_some()
    }

    /// Split into the bundle or its diagnostics.
    pub fn into_result(self) -> Result<Bundle, Vec<Diagnostic>> {
        match self.bundle {
            Some(bundle) if self.diagnostics.is_empty() => Ok(bundle),
            _ if self.diagnostics.is_empty() => {
                Err(vec![Diagnostic::new("compiler produced no output")])
            }
            _ => Err(self.diagnostics),
        }
    }
}

/// Compile the module graph rooted at `entry_path`.
///
/// Any diagnostic means no bundle: a partial graph is never returned.
pub async fn compile(
    runtime: &CompilerRuntime,
    entry_path: &str,
    source: Arc<dyn ContentSource>,
) -> CompiledBundle {
    runtime.initialize(None).await;
    let backend = match runtime.backend() {
        Ok(backend) => backend,
        Err(reason) => {
            return CompiledBundle::failed(vec![Diagnostic::new(format!(
                "compiler backend unavailable: {}",
                reason
            ))])
        }
    };

    let entry = entry_path.to_string();
    let resolver = VaultResolver::new(source);
    match tokio::task::spawn_blocking(move || bundle_graph(&backend, &resolver, &entry)).await {
        Ok(compiled) => compiled,
        Err(e) => CompiledBundle::failed(vec![Diagnostic::new(format!("compile task failed: {}", e))]),
    }
}

fn bundle_graph(backend: &Backend, resolver: &VaultResolver, entry: &str) -> CompiledBundle {
    let engine = backend.parser();
    let entry = match resolver.resolve(entry, ImportKind::EntryPoint, None) {
        Resolved::Internal(path) => path,
        Resolved::External => {
            return CompiledBundle::failed(vec![Diagnostic::at(entry, "entry point is not a vault module")])
        }
    };

    let mut diagnostics = Vec::new();
    let mut modules = BTreeMap::new();
    let mut links = HashMap::new();
    let mut seen = HashSet::from([entry.clone()]);
    let mut queue = VecDeque::from([entry.clone()]);

    while let Some(path) = queue.pop_front() {
        let text = match resolver.load(&path) {
            Ok(text) => text,
            Err(diagnostic) => {
                diagnostics.push(diagnostic);
                continue;
            }
        };

        let mut ast = match engine.compile(&text) {
            Ok(ast) => ast,
            Err(err) => {
                diagnostics.push(parse_diagnostic(&path, &err));
                continue;
            }
        };
        if path == entry && ast.statements().is_empty() {
            diagnostics.push(Diagnostic::at(&path, "entry module is empty"));
            continue;
        }
        ast.set_source(path.as_str());

        for specifier in collect_imports(&ast) {
            match resolver.resolve(&specifier, ImportKind::Import, Some(&path)) {
                Resolved::Internal(target) => {
                    trace!(importer = %path, %specifier, %target, "bundling import");
                    links.insert((path.clone(), specifier), target.clone());
                    if seen.insert(target.clone()) {
                        queue.push_back(target);
                    }
                }
                Resolved::External => debug!(importer = %path, %specifier, "external import"),
            }
        }
        modules.insert(path, ast);
    }

    if !diagnostics.is_empty() {
        return CompiledBundle::failed(diagnostics);
    }

    CompiledBundle {
        bundle: Some(Bundle {
            entry,
            modules,
            links,
            profile: backend.profile().clone(),
        }),
        diagnostics,
    }
}

fn parse_diagnostic(path: &str, err: &ParseError) -> Diagnostic {
    Diagnostic::at(path, err.err_type().to_string()).with_line(err.position().line())
}

/// String-literal `import` specifiers in a module, in order of appearance.
fn collect_imports(ast: &AST) -> Vec<String> {
    let mut imports: Vec<String> = Vec::new();
    ast.walk(&mut |path: &[ASTNode]| {
        if let Some(ASTNode::Stmt(Stmt::Import(import, ..))) = path.last() {
            if let Expr::StringConstant(specifier, ..) = &import.0 {
                if !imports.iter().any(|i| i == specifier.as_str()) {
                    imports.push(specifier.to_string());
                }
            }
        }
        true
    });
    imports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    async fn compile_source(source: MemorySource, entry: &str) -> CompiledBundle {
        let runtime = CompilerRuntime::new();
        compile(&runtime, entry, Arc::new(source)).await
    }

    #[tokio::test]
    async fn test_bundles_relative_imports() {
        let source = MemorySource::new()
            .with_file(
                "sys/index.rhai",
                "import \"./lib/stats\" as stats;\nimport \"rules\" as rules;\nlet system = stats::value;",
            )
            .with_file("sys/lib/stats.rhai", "import \"../shared\" as shared;\nexport const value = 1;")
            .with_file("sys/shared.rhai", "export const dice = 6;");

        let bundle = compile_source(source, "sys/index.rhai").await.into_result().unwrap();

        assert_eq!(bundle.entry(), "sys/index.rhai");
        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.link("sys/index.rhai", "./lib/stats"), Some("sys/lib/stats.rhai"));
        assert_eq!(bundle.link("sys/lib/stats.rhai", "../shared"), Some("sys/shared.rhai"));
        assert_eq!(bundle.link("sys/index.rhai", "rules"), None);
        assert_eq!(bundle.entry_ast().source(), Some("sys/index.rhai"));
    }

    #[tokio::test]
    async fn test_missing_import_single_diagnostic() {
        let source = MemorySource::new().with_file(
            "sys/index.rhai",
            "import \"./missing\" as m;\nlet system = #{};",
        );

        let compiled = compile_source(source, "sys/index.rhai").await;
        assert!(!compiled.is_ok());
        assert_eq!(compiled.diagnostics.len(), 1);
        assert_eq!(compiled.diagnostics[0].path.as_deref(), Some("sys/missing.rhai"));
    }

    #[tokio::test]
    async fn test_syntax_error_reports_line() {
        let source = MemorySource::new().with_file("sys/index.rhai", "let a = 1;\nlet system = #{ name: };");

        let diagnostics = compile_source(source, "sys/index.rhai").await.into_result().unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].path.as_deref(), Some("sys/index.rhai"));
        assert_eq!(diagnostics[0].line, Some(2));
    }

    #[tokio::test]
    async fn test_empty_entry_is_an_error() {
        let source = MemorySource::new().with_file("sys/index.rhai", "// nothing here\n");

        let diagnostics = compile_source(source, "sys/index.rhai").await.into_result().unwrap_err();
        assert_eq!(diagnostics[0].message, "entry module is empty");
    }

    #[tokio::test]
    async fn test_import_cycle_bundles_once() {
        let source = MemorySource::new()
            .with_file("sys/index.rhai", "import \"./a\" as a;\nlet system = 1;")
            .with_file("sys/a.rhai", "import \"./b\" as b;\nexport const x = 1;")
            .with_file("sys/b.rhai", "import \"./a\" as a;\nexport const y = 1;");

        let bundle = compile_source(source, "sys/index.rhai").await.into_result().unwrap();
        assert_eq!(bundle.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_backend_blocks_compile() {
        let runtime = CompilerRuntime::new();
        runtime
            .initialize(Some(std::path::Path::new("/nonexistent/profile.toml")))
            .await;

        let source = MemorySource::new().with_file("sys/index.rhai", "let system = 1;");
        let compiled = compile(&runtime, "sys/index.rhai", Arc::new(source)).await;
        assert!(compiled.diagnostics[0].message.starts_with("compiler backend unavailable"));
    }
}
