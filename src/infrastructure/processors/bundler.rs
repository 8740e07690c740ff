// Single-file bundler on top of oxc.
// Modules are linked through a small runtime table: each module becomes a
// function that fills an `exports` object. Its dependencies run first, in
// source order, from a prologue in front of the body.

use crate::core::{interfaces::JsBundler, models::*};
use crate::infrastructure::processors::helpers::{referenced_helpers, render_helpers};
use crate::infrastructure::processors::minifier::OxcMinifier;
use crate::utils::{ErrorContext, KilnError, Logger, Result, Timer};
use oxc_allocator::Allocator;
use oxc_ast::ast::{Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier, Statement};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{GetSpan, SourceType};
use oxc_transformer::{HelperLoaderMode, TransformOptions, Transformer};
use sourcemap::{SourceMap, SourceMapBuilder};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RUNTIME_PRELUDE: &str = r#"(function () {
"use strict";
var __modules = {};
var __cache = {};
function __require(id) {
  var cached = __cache[id];
  if (cached) return cached.exports;
  var module = (__cache[id] = { exports: {} });
  __modules[id](module.exports);
  return module.exports;
}
function __export(target, getters) {
  for (var name in getters) Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
}
function __exportStar(target, source) {
  Object.keys(source).forEach(function (name) {
    if (name !== "default" && !Object.prototype.hasOwnProperty.call(target, name)) {
      Object.defineProperty(target, name, { enumerable: true, get: function () { return source[name]; } });
    }
  });
}
"#;

const RUNTIME_EPILOGUE: &str = "__require(0);\n})();\n";

/// Local name bound by `export default <expression>`
const DEFAULT_BINDING: &str = "__default";

const RESOLVE_EXTENSIONS: [&str; 2] = ["js", "mjs"];

#[derive(Debug, Clone, PartialEq)]
enum ImportBinding {
    Default(String),
    Named { imported: String, local: String },
    Namespace(String),
}

#[derive(Debug, Clone, PartialEq)]
enum ExportBinding {
    Local {
        exported: String,
        local: String,
    },
    /// `imported: None` re-exports the whole namespace
    Reexport {
        exported: String,
        specifier: String,
        imported: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct ImportRecord {
    specifier: String,
    bindings: Vec<ImportBinding>,
}

#[derive(Debug, Clone)]
struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

/// What linking needs to know about one module, extracted from its AST.
#[derive(Debug, Default)]
struct ModuleAnalysis {
    /// Specifier and the byte offset of the statement requesting it, in source order
    requests: Vec<(String, usize)>,
    imports: Vec<ImportRecord>,
    /// Specifiers of `export * from`
    star_exports: Vec<String>,
    edits: Vec<Edit>,
    exports: Vec<ExportBinding>,
}

impl ModuleAnalysis {
    fn request(&mut self, specifier: &str, offset: u32) {
        if !self.requests.iter().any(|(s, _)| s == specifier) {
            self.requests.push((specifier.to_string(), offset as usize));
        }
    }

    fn edit(&mut self, start: u32, end: u32, replacement: impl Into<String>) {
        self.edits.push(Edit {
            start: start as usize,
            end: end as usize,
            replacement: replacement.into(),
        });
    }
}

struct ModuleRecord {
    id: usize,
    path: PathBuf,
    display_name: String,
    source: String,
    analysis: ModuleAnalysis,
    deps: HashMap<String, usize>,
}

struct CompiledModule {
    code: String,
    map: Option<String>,
    helpers: BTreeSet<String>,
}

/// Bundles an ES module graph into one script, lowering syntax with `oxc_transformer`.
#[derive(Clone)]
pub struct OxcBundler {
    root: PathBuf,
    search_paths: Vec<PathBuf>,
    target: String,
    minifier: Arc<OxcMinifier>,
}

impl OxcBundler {
    pub fn new(root: &Path, target: &str) -> Result<Self> {
        TransformOptions::from_target(target)
            .map_err(|e| KilnError::config(format!("Invalid target '{}': {}", target, e)))?;

        Ok(Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            search_paths: Vec::new(),
            target: target.to_string(),
            minifier: Arc::new(OxcMinifier::new()),
        })
    }

    /// Directory searched for bare specifiers such as `import x from "scenes/boot"`.
    pub fn with_search_path(mut self, dir: &Path) -> Self {
        self.search_paths
            .push(dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()));
        self
    }

    pub fn bundle_sync(&self, entry: &Path, mode: BuildMode, output_file: &str) -> Result<BundleOutput> {
        let _timer = Timer::start("Bundling JavaScript modules");

        let modules = self.collect_modules(entry)?;
        Logger::debug(&format!("Resolved {} module(s)", modules.len()));

        let with_map = mode.emits_source_map();
        let compiled = modules
            .iter()
            .map(|module| self.compile_module(module, with_map))
            .collect::<Result<Vec<_>>>()?;

        let linked = link_modules(&modules, compiled, output_file, with_map)?;

        if mode.minifies() {
            let minified = self.minifier.minify(&linked.code, output_file)?;
            Logger::debug(&self.minifier.stats(&linked.code, &minified).to_string());
            return Ok(BundleOutput {
                code: minified,
                source_map: None,
            });
        }

        Ok(linked)
    }

    fn collect_modules(&self, entry: &Path) -> Result<Vec<ModuleRecord>> {
        let entry = entry.canonicalize().map_err(|e| {
            KilnError::build(format!("Cannot read entry {}: {}", entry.display(), e))
        })?;

        let mut ids: HashMap<PathBuf, usize> = HashMap::new();
        let mut modules = vec![self.load_module(0, entry.clone())?];
        ids.insert(entry, 0);

        let mut next = 0;
        while next < modules.len() {
            let requests = modules[next].analysis.requests.clone();
            let mut deps = HashMap::new();

            for (specifier, offset) in requests {
                let resolved = self
                    .resolve(&specifier, &modules[next].path)
                    .ok_or_else(|| unresolved(&modules[next], &specifier, offset))?;

                let id = match ids.get(&resolved) {
                    Some(id) => *id,
                    None => {
                        let id = modules.len();
                        ids.insert(resolved.clone(), id);
                        modules.push(self.load_module(id, resolved)?);
                        id
                    }
                };
                deps.insert(specifier, id);
            }

            modules[next].deps = deps;
            next += 1;
        }

        Ok(modules)
    }

    fn load_module(&self, id: usize, path: PathBuf) -> Result<ModuleRecord> {
        let source = std::fs::read_to_string(&path)?;
        let display_name = self.display_name(&path);
        let analysis = analyze_module(&source, &path, &display_name)?;

        Ok(ModuleRecord {
            id,
            path,
            display_name,
            source,
            analysis,
            deps: HashMap::new(),
        })
    }

    fn resolve(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        let is_relative = specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier.starts_with('/');

        let bases: Vec<PathBuf> = if is_relative {
            let dir = importer.parent().unwrap_or(Path::new("."));
            vec![dir.join(specifier)]
        } else {
            self.search_paths.iter().map(|p| p.join(specifier)).collect()
        };

        for base in bases {
            let mut candidates = vec![base.clone()];
            for ext in RESOLVE_EXTENSIONS {
                let mut with_ext = base.clone().into_os_string();
                with_ext.push(".");
                with_ext.push(ext);
                candidates.push(PathBuf::from(with_ext));
            }
            candidates.push(base.join("index.js"));

            if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
                return found.canonicalize().ok();
            }
        }

        None
    }

    fn compile_module(&self, module: &ModuleRecord, with_map: bool) -> Result<CompiledModule> {
        let rewritten = render_module(module);

        let allocator = Allocator::default();
        let source_type = source_type_for(&module.path);
        let parsed = Parser::new(&allocator, &rewritten, source_type).parse();
        if let Some(error) = parsed.errors.first() {
            return Err(KilnError::parse_with_context(
                error.to_string(),
                ErrorContext::new().with_file(PathBuf::from(&module.display_name)),
            ));
        }
        let mut program = parsed.program;

        let mut options = TransformOptions::from_target(&self.target)
            .map_err(|e| KilnError::config(e.to_string()))?;
        // Helpers resolve against the bundle's own `babelHelpers` object.
        options.helper_loader.mode = HelperLoaderMode::External;
        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
        let transformed = Transformer::new(&allocator, &module.path, &options)
            .build_with_scoping(scoping, &mut program);
        if let Some(error) = transformed.errors.first() {
            return Err(KilnError::build_with_context(
                error.to_string(),
                ErrorContext::new().with_file(PathBuf::from(&module.display_name)),
            ));
        }

        if program.body.iter().any(is_module_syntax) {
            return Err(KilnError::build_with_context(
                "Module syntax left after linking".to_string(),
                ErrorContext::new().with_file(PathBuf::from(&module.display_name)),
            ));
        }

        let codegen_options = CodegenOptions {
            source_map_path: with_map.then(|| PathBuf::from(&module.display_name)),
            ..CodegenOptions::default()
        };
        let generated = Codegen::new().with_options(codegen_options).build(&program);

        Ok(CompiledModule {
            helpers: referenced_helpers(&generated.code),
            code: generated.code,
            map: generated.map.map(|map| map.to_json_string()),
        })
    }

    fn display_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[async_trait::async_trait]
impl JsBundler for OxcBundler {
    async fn bundle(&self, entry: &Path, mode: BuildMode, output_file: &str) -> Result<BundleOutput> {
        let bundler = self.clone();
        let entry = entry.to_path_buf();
        let output_file = output_file.to_string();

        // Parsing and printing are CPU bound
        tokio::task::spawn_blocking(move || bundler.bundle_sync(&entry, mode, &output_file))
            .await
            .map_err(|e| KilnError::build(format!("Bundling task failed: {}", e)))?
    }
}

fn source_type_for(path: &Path) -> SourceType {
    SourceType::from_path(path)
        .unwrap_or_default()
        .with_module(true)
}

fn is_module_syntax(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::ImportDeclaration(_)
            | Statement::ExportAllDeclaration(_)
            | Statement::ExportDefaultDeclaration(_)
            | Statement::ExportNamedDeclaration(_)
    )
}

fn unresolved(importer: &ModuleRecord, specifier: &str, offset: usize) -> KilnError {
    KilnError::build_with_context(
        format!("Cannot resolve '{}'", specifier),
        ErrorContext::new()
            .with_file(PathBuf::from(&importer.display_name))
            .at_offset(&importer.source, offset),
    )
}

fn analyze_module(source: &str, path: &Path, display_name: &str) -> Result<ModuleAnalysis> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type_for(path)).parse();

    if let Some(error) = parsed.errors.first() {
        return Err(KilnError::parse_with_context(
            error.to_string(),
            ErrorContext::new().with_file(PathBuf::from(display_name)),
        ));
    }

    let mut analysis = ModuleAnalysis::default();

    for stmt in &parsed.program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                let specifier = decl.source.value.to_string();
                let bindings = decl
                    .specifiers
                    .iter()
                    .flatten()
                    .map(|spec| match spec {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => ImportBinding::Named {
                            imported: s.imported.name().to_string(),
                            local: s.local.name.to_string(),
                        },
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            ImportBinding::Default(s.local.name.to_string())
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            ImportBinding::Namespace(s.local.name.to_string())
                        }
                    })
                    .collect();

                analysis.request(&specifier, decl.span.start);
                analysis.imports.push(ImportRecord { specifier, bindings });
                analysis.edit(decl.span.start, decl.span.end, "");
            }
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(declaration) = &decl.declaration {
                    for name in declared_names(declaration) {
                        analysis.exports.push(ExportBinding::Local {
                            exported: name.clone(),
                            local: name,
                        });
                    }
                    // Keep the declaration, drop the `export` keyword.
                    analysis.edit(decl.span.start, declaration.span().start, "");
                } else {
                    let specifier = decl.source.as_ref().map(|s| s.value.to_string());
                    if let Some(specifier) = &specifier {
                        analysis.request(specifier, decl.span.start);
                    }

                    for spec in &decl.specifiers {
                        let exported = spec.exported.name().to_string();
                        let local = spec.local.name().to_string();
                        analysis.exports.push(match &specifier {
                            Some(specifier) => ExportBinding::Reexport {
                                exported,
                                specifier: specifier.clone(),
                                imported: Some(local),
                            },
                            None => ExportBinding::Local { exported, local },
                        });
                    }
                    analysis.edit(decl.span.start, decl.span.end, "");
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let inner = decl.declaration.span();
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        f.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        c.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };
                let is_declaration = matches!(
                    &decl.declaration,
                    ExportDefaultDeclarationKind::FunctionDeclaration(_)
                        | ExportDefaultDeclarationKind::ClassDeclaration(_)
                );

                match named {
                    Some(local) => {
                        analysis.exports.push(ExportBinding::Local {
                            exported: "default".to_string(),
                            local,
                        });
                        analysis.edit(decl.span.start, inner.start, "");
                    }
                    None => {
                        analysis.exports.push(ExportBinding::Local {
                            exported: "default".to_string(),
                            local: DEFAULT_BINDING.to_string(),
                        });
                        analysis.edit(
                            decl.span.start,
                            inner.start,
                            format!("var {} = ", DEFAULT_BINDING),
                        );
                        if is_declaration {
                            analysis.edit(inner.end, inner.end, ";");
                        }
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                let specifier = decl.source.value.to_string();
                analysis.request(&specifier, decl.span.start);

                match &decl.exported {
                    Some(name) => {
                        analysis.exports.push(ExportBinding::Reexport {
                            exported: name.name().to_string(),
                            specifier,
                            imported: None,
                        });
                        analysis.edit(decl.span.start, decl.span.end, "");
                    }
                    None => {
                        analysis.star_exports.push(specifier);
                        analysis.edit(decl.span.start, decl.span.end, "");
                    }
                }
            }
            _ => {}
        }
    }

    Ok(analysis)
}

fn declared_names(declaration: &Declaration) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(f) => f.id.iter().map(|id| id.name.to_string()).collect(),
        Declaration::ClassDeclaration(c) => c.id.iter().map(|id| id.name.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Apply the module's edits. Replaced text keeps its line count so source maps stay aligned.
fn render_module(module: &ModuleRecord) -> String {
    let mut edits = module.analysis.edits.clone();
    edits.sort_by_key(|e| (e.start, e.end));

    let source = &module.source;
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;

    for edit in &edits {
        out.push_str(&source[cursor..edit.start]);
        out.push_str(&edit.replacement);
        out.push_str(&"\n".repeat(source[edit.start..edit.end].matches('\n').count()));
        cursor = edit.end;
    }
    out.push_str(&source[cursor..]);

    out
}

/// Runs every dependency before the body, then binds the imported names.
fn module_prologue(module: &ModuleRecord) -> Result<String> {
    let mut required: Vec<usize> = Vec::new();
    for (specifier, _) in &module.analysis.requests {
        let id = dep_id(&module.deps, specifier)?;
        if !required.contains(&id) {
            required.push(id);
        }
    }
    if required.is_empty() {
        return Ok(String::new());
    }

    let mut declarators: Vec<String> = required
        .iter()
        .map(|id| format!("__m{} = __require({})", id, id))
        .collect();

    for import in &module.analysis.imports {
        let namespace = format!("__m{}", dep_id(&module.deps, &import.specifier)?);
        for binding in &import.bindings {
            declarators.push(match binding {
                ImportBinding::Default(local) => {
                    format!("{} = {}", local, member(&namespace, "default"))
                }
                ImportBinding::Named { imported, local } => {
                    format!("{} = {}", local, member(&namespace, imported))
                }
                ImportBinding::Namespace(local) => format!("{} = {}", local, namespace),
            });
        }
    }

    let mut out = format!(" var {};", declarators.join(", "));
    for specifier in &module.analysis.star_exports {
        out.push_str(&format!(
            " __exportStar(exports, __m{});",
            dep_id(&module.deps, specifier)?
        ));
    }
    Ok(out)
}

/// `__export(exports, {...})` call declaring live getters for every export
fn export_header(module: &ModuleRecord) -> Result<String> {
    if module.analysis.exports.is_empty() {
        return Ok(String::new());
    }

    let mut getters = Vec::with_capacity(module.analysis.exports.len());
    for export in &module.analysis.exports {
        let (exported, value) = match export {
            ExportBinding::Local { exported, local } => (exported, local.clone()),
            ExportBinding::Reexport { exported, specifier, imported } => {
                let source = format!("__require({})", dep_id(&module.deps, specifier)?);
                let value = match imported {
                    Some(name) => member(&source, name),
                    None => source,
                };
                (exported, value)
            }
        };
        getters.push(format!(
            "{}: function () {{ return {}; }}",
            quote(exported),
            value
        ));
    }

    Ok(format!(" __export(exports, {{ {} }});", getters.join(", ")))
}

fn link_modules(
    modules: &[ModuleRecord],
    compiled: Vec<CompiledModule>,
    output_file: &str,
    with_map: bool,
) -> Result<BundleOutput> {
    let helpers: BTreeSet<String> = compiled
        .iter()
        .flat_map(|module| module.helpers.iter().cloned())
        .collect();

    let mut code = String::from(RUNTIME_PRELUDE);
    code.push_str(&render_helpers(&helpers)?);
    let mut line = count_lines(&code);
    let mut builder = with_map.then(|| SourceMapBuilder::new(Some(output_file)));

    for (module, compiled) in modules.iter().zip(compiled) {
        let opening = format!(
            "// {}\n__modules[{}] = function (exports) {{{}{}\n",
            module.display_name,
            module.id,
            export_header(module)?,
            module_prologue(module)?
        );
        code.push_str(&opening);
        line += count_lines(&opening);

        if let (Some(builder), Some(map)) = (builder.as_mut(), compiled.map.as_deref()) {
            append_source_map(builder, map, line, module)?;
        }

        code.push_str(&compiled.code);
        line += count_lines(&compiled.code);
        if !compiled.code.ends_with('\n') {
            code.push('\n');
            line += 1;
        }
        code.push_str("};\n");
        line += 1;
    }
    code.push_str(RUNTIME_EPILOGUE);

    let source_map = match builder {
        Some(builder) => {
            let mut buf = Vec::new();
            builder
                .into_sourcemap()
                .to_writer(&mut buf)
                .map_err(|e| KilnError::build(format!("Cannot serialize source map: {}", e)))?;
            Some(String::from_utf8(buf).map_err(|e| KilnError::build(e.to_string()))?)
        }
        None => None,
    };

    Ok(BundleOutput { code, source_map })
}

/// Copy a module's tokens into the bundle map, shifted down by `line_offset`.
fn append_source_map(
    builder: &mut SourceMapBuilder,
    map_json: &str,
    line_offset: u32,
    module: &ModuleRecord,
) -> Result<()> {
    let map = SourceMap::from_slice(map_json.as_bytes())
        .map_err(|e| KilnError::build(format!("Invalid source map for {}: {}", module.display_name, e)))?;

    let src_id = builder.add_source(&module.display_name);
    builder.set_source_contents(src_id, Some(module.source.as_str()));

    for token in map.tokens() {
        if token.get_source().is_none() {
            continue;
        }
        builder.add(
            token.get_dst_line() + line_offset,
            token.get_dst_col(),
            token.get_src_line(),
            token.get_src_col(),
            Some(module.display_name.as_str()),
            token.get_name(),
            false,
        );
    }

    Ok(())
}

fn dep_id(deps: &HashMap<String, usize>, specifier: &str) -> Result<usize> {
    deps.get(specifier)
        .copied()
        .ok_or_else(|| KilnError::build(format!("Unlinked import '{}'", specifier)))
}

fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, quote(name))
    }
}

fn quote(name: &str) -> String {
    serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn count_lines(text: &str) -> u32 {
    text.matches('\n').count() as u32
}
