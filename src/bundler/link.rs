//! Module linking.
//!
//! Every module becomes a factory `function (module, exports, require)` in a
//! registry array, and the registry plus a small loader is wrapped in an
//! IIFE. ES module syntax is rewritten onto that loader:
//!
//! - import declarations are removed, the dependency is required at the top
//!   of the factory, and every reference to an imported binding is rewritten
//!   to a property read on the dependency's exports, so bindings stay live
//!   and cyclic imports see partially initialized modules;
//! - exports are installed as getters on `exports` before the body runs;
//! - string-literal `require()` and `import()` calls refer to module ids.
//!
//! Rewriting works on source text with spans from a fresh parse of the
//! transformed module, so the module body is otherwise emitted untouched.

use std::collections::HashMap;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, BindingPattern, BindingPatternKind, CallExpression, Declaration,
    ExportAllDeclaration, ExportDefaultDeclaration, ExportDefaultDeclarationKind,
    ExportNamedDeclaration, Expression, IdentifierReference, ImportDeclaration,
    ImportDeclarationSpecifier, ImportExpression, ModuleExportName, ObjectProperty, Statement,
    StaticMemberExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};

use crate::error::BundleError;

/// Index of a module in the bundle registry.
pub type ModuleId = usize;

/// A module body ready to be placed in the registry.
pub struct LinkedModule {
    /// Shown as a comment above the factory.
    pub label: String,
    pub body: String,
}

/// Loader shared by every bundle.
const RUNTIME: &str = r#"var __cache = {};
function __require(id) {
  var cached = __cache[id];
  if (cached) return cached.exports;
  if (typeof id !== "number" || !__modules[id]) throw new Error("Cannot find module '" + id + "'");
  var module = __cache[id] = { exports: {} };
  __modules[id].call(module.exports, module, module.exports, __require);
  return module.exports;
}
function __toESM(mod) {
  if (mod && mod.__esModule) return mod;
  var ns = { default: mod };
  if (mod != null && (typeof mod === "object" || typeof mod === "function")) {
    for (var key in mod) {
      if (key !== "default" && Object.prototype.hasOwnProperty.call(mod, key)) ns[key] = mod[key];
    }
  }
  return ns;
}
function __export(target, getters) {
  Object.defineProperty(target, "__esModule", { value: true });
  for (var name in getters) Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
}
function __reExport(target, mod) {
  Object.keys(mod).forEach(function (key) {
    if (key === "default" || Object.prototype.hasOwnProperty.call(target, key)) return;
    Object.defineProperty(target, key, { enumerable: true, get: function () { return mod[key]; } });
  });
}
"#;

/// Wrap linked modules into one IIFE; module 0 is the entry.
pub fn assemble(modules: &[LinkedModule]) -> String {
    let mut out = String::from("(function () {\nvar __modules = [\n");
    let factories: Vec<String> = modules
        .iter()
        .map(|m| {
            format!(
                "// {}\nfunction (module, exports, require) {{\n{}\n}}",
                m.label, m.body
            )
        })
        .collect();
    out.push_str(&factories.join(",\n"));
    out.push_str("\n];\n");
    out.push_str(RUNTIME);
    out.push_str("__require(0);\n})();\n");
    out
}

/// Rewrite one transformed module into a registry factory body.
///
/// `request` resolves a specifier found in the module to the id of the module
/// it names, scheduling that module for loading if it is new.
pub fn link_module(
    path: &Path,
    code: &str,
    source_type: SourceType,
    node_env: &str,
    request: &mut dyn FnMut(&str) -> Result<ModuleId, BundleError>,
) -> Result<String, BundleError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, source_type).parse();
    if let Some(error) = parsed.errors.first() {
        return Err(BundleError::Parse {
            path: path.display().to_string(),
            message: error.to_string(),
        });
    }
    let program = parsed.program;
    let semantic = SemanticBuilder::new().build(&program).semantic;

    let mut linker = Linker {
        request,
        node_env,
        scoping: semantic.scoping(),
        edits: Vec::new(),
        exports: Vec::new(),
        imports: String::new(),
        namespaces: HashMap::new(),
        bindings: HashMap::new(),
        is_esm: false,
        error: None,
    };

    for statement in &program.body {
        linker.statement(statement)?;
    }
    linker.visit_program(&program);
    if let Some(error) = linker.error.take() {
        return Err(error);
    }

    let mut body = String::with_capacity(code.len() + 256);
    if linker.is_esm {
        body.push_str("\"use strict\";\n");
        body.push_str(&linker.export_getters());
    }
    body.push_str(&linker.imports);
    body.push_str(&apply_edits(code, linker.edits));
    Ok(body)
}

struct Edit {
    start: u32,
    end: u32,
    text: String,
}

impl Edit {
    fn new(start: u32, end: u32, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    fn replace(span: Span, text: impl Into<String>) -> Self {
        Self::new(span.start, span.end, text)
    }
}

/// What an export getter returns.
enum ExportValue {
    Expr(String),
    /// A top-level binding, which may itself be an import.
    Local(String, Option<SymbolId>),
}

struct Linker<'r, 's> {
    request: &'r mut dyn FnMut(&str) -> Result<ModuleId, BundleError>,
    node_env: &'r str,
    scoping: &'s Scoping,
    edits: Vec<Edit>,
    exports: Vec<(String, ExportValue)>,
    /// Hoisted dependency requires, in source order.
    imports: String,
    namespaces: HashMap<ModuleId, String>,
    /// Imported symbol to the expression that reads it.
    bindings: HashMap<SymbolId, String>,
    is_esm: bool,
    error: Option<BundleError>,
}

impl Linker<'_, '_> {
    fn statement(&mut self, statement: &Statement<'_>) -> Result<(), BundleError> {
        match statement {
            Statement::ImportDeclaration(decl) => self.import(decl),
            Statement::ExportNamedDeclaration(decl) => self.export_named(decl),
            Statement::ExportDefaultDeclaration(decl) => {
                self.export_default(decl);
                Ok(())
            }
            Statement::ExportAllDeclaration(decl) => self.export_all(decl),
            _ => Ok(()),
        }
    }

    /// Variable holding the namespace object of module `id`, requiring it on first use.
    fn namespace(&mut self, id: ModuleId) -> String {
        if let Some(ns) = self.namespaces.get(&id) {
            return ns.clone();
        }
        let ns = format!("__ns{id}");
        self.imports
            .push_str(&format!("var {ns} = __toESM(require({id}));\n"));
        self.namespaces.insert(id, ns.clone());
        ns
    }

    fn import(&mut self, decl: &ImportDeclaration<'_>) -> Result<(), BundleError> {
        self.is_esm = true;
        self.edits.push(Edit::replace(decl.span, ""));
        let id = (self.request)(decl.source.value.as_str())?;

        let Some(specifiers) = decl.specifiers.as_ref().filter(|s| !s.is_empty()) else {
            self.imports.push_str(&format!("require({id});\n"));
            return Ok(());
        };

        let ns = self.namespace(id);
        for specifier in specifiers {
            let (local, value) = match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    (&s.local, member(&ns, s.imported.name().as_str()))
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    (&s.local, format!("{ns}.default"))
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => (&s.local, ns.clone()),
            };
            match local.symbol_id.get() {
                Some(symbol) => {
                    self.bindings.insert(symbol, value);
                }
                None => self
                    .imports
                    .push_str(&format!("var {} = {value};\n", local.name)),
            }
        }
        Ok(())
    }

    fn export_named(&mut self, decl: &ExportNamedDeclaration<'_>) -> Result<(), BundleError> {
        self.is_esm = true;

        if let Some(source) = &decl.source {
            self.edits.push(Edit::replace(decl.span, ""));
            let id = (self.request)(source.value.as_str())?;
            let ns = self.namespace(id);
            for specifier in &decl.specifiers {
                self.exports.push((
                    specifier.exported.name().to_string(),
                    ExportValue::Expr(member(&ns, specifier.local.name().as_str())),
                ));
            }
            return Ok(());
        }

        if let Some(declaration) = &decl.declaration {
            // Keep the declaration, drop the `export` keyword.
            self.edits
                .push(Edit::new(decl.span.start, declaration.span().start, ""));
            let mut names = Vec::new();
            declaration_names(declaration, &mut names);
            self.exports.extend(
                names
                    .into_iter()
                    .map(|name| (name.clone(), ExportValue::Local(name, None))),
            );
            return Ok(());
        }

        self.edits.push(Edit::replace(decl.span, ""));
        for specifier in &decl.specifiers {
            let symbol = match &specifier.local {
                ModuleExportName::IdentifierReference(ident) => self.symbol(ident),
                _ => None,
            };
            self.exports.push((
                specifier.exported.name().to_string(),
                ExportValue::Local(specifier.local.name().to_string(), symbol),
            ));
        }
        Ok(())
    }

    fn export_default(&mut self, decl: &ExportDefaultDeclaration<'_>) {
        self.is_esm = true;
        let start = decl.span.start;

        let named = match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                f.id.as_ref().map(|id| (f.span.start, id.name.to_string()))
            }
            ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                c.id.as_ref().map(|id| (c.span.start, id.name.to_string()))
            }
            _ => None,
        };

        if let Some((declaration_start, name)) = named {
            self.edits.push(Edit::new(start, declaration_start, ""));
            self.exports
                .push(("default".to_string(), ExportValue::Local(name, None)));
            return;
        }

        let kind = &decl.declaration;
        self.edits
            .push(Edit::new(start, kind.span().start, "var __export_default = "));
        if matches!(
            kind,
            ExportDefaultDeclarationKind::FunctionDeclaration(_)
                | ExportDefaultDeclarationKind::ClassDeclaration(_)
        ) {
            self.edits.push(Edit::new(decl.span.end, decl.span.end, ";"));
        }
        self.exports.push((
            "default".to_string(),
            ExportValue::Local("__export_default".to_string(), None),
        ));
    }

    fn export_all(&mut self, decl: &ExportAllDeclaration<'_>) -> Result<(), BundleError> {
        self.is_esm = true;
        self.edits.push(Edit::replace(decl.span, ""));
        let id = (self.request)(decl.source.value.as_str())?;

        match &decl.exported {
            Some(name) => {
                let ns = self.namespace(id);
                self.exports
                    .push((name.name().to_string(), ExportValue::Expr(ns)));
            }
            None => self
                .imports
                .push_str(&format!("__reExport(exports, require({id}));\n")),
        }
        Ok(())
    }

    fn symbol(&self, ident: &IdentifierReference<'_>) -> Option<SymbolId> {
        let reference = ident.reference_id.get()?;
        self.scoping.get_reference(reference).symbol_id()
    }

    /// Replacement text for a reference to an imported binding.
    fn binding(&self, ident: &IdentifierReference<'_>) -> Option<String> {
        self.bindings.get(&self.symbol(ident)?).cloned()
    }

    /// `__export(exports, {...})` installing one getter per export.
    fn export_getters(&self) -> String {
        let getters: Vec<String> = self
            .exports
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    ExportValue::Expr(expr) => expr,
                    ExportValue::Local(local, symbol) => symbol
                        .and_then(|symbol| self.bindings.get(&symbol))
                        .unwrap_or(local),
                };
                format!(
                    "  {}: function () {{ return {value}; }}",
                    serde_json::Value::String(name.clone())
                )
            })
            .collect();
        if getters.is_empty() {
            "__export(exports, {});\n".to_string()
        } else {
            format!("__export(exports, {{\n{}\n}});\n", getters.join(",\n"))
        }
    }

    fn request_or_record(&mut self, specifier: &str) -> Option<ModuleId> {
        match (self.request)(specifier) {
            Ok(id) => Some(id),
            Err(error) => {
                self.error.get_or_insert(error);
                None
            }
        }
    }
}

impl<'a> Visit<'a> for Linker<'_, '_> {
    // Removed statements; only an exported declaration survives.
    fn visit_import_declaration(&mut self, _decl: &ImportDeclaration<'a>) {}

    fn visit_export_all_declaration(&mut self, _decl: &ExportAllDeclaration<'a>) {}

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(declaration) = &decl.declaration {
            self.visit_declaration(declaration);
        }
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &call.callee {
            if callee.name.as_str() == "require" && call.arguments.len() == 1 {
                if let Some(Argument::StringLiteral(literal)) = call.arguments.first() {
                    if let Some(id) = self.request_or_record(literal.value.as_str()) {
                        self.edits.push(Edit::replace(literal.span, id.to_string()));
                    }
                    return;
                }
            }
            // Call an imported function without the exports object as `this`.
            if let Some(binding) = self.binding(callee) {
                self.edits
                    .push(Edit::replace(callee.span, format!("(0, {binding})")));
                for argument in &call.arguments {
                    self.visit_argument(argument);
                }
                return;
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_object_property(&mut self, property: &ObjectProperty<'a>) {
        if property.shorthand {
            if let Expression::Identifier(ident) = &property.value {
                if let Some(binding) = self.binding(ident) {
                    self.edits.push(Edit::replace(
                        property.span,
                        format!("{}: {binding}", ident.name),
                    ));
                    return;
                }
            }
        }
        walk::walk_object_property(self, property);
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if let Some(binding) = self.binding(ident) {
            self.edits.push(Edit::replace(ident.span, binding));
        }
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(literal) = &expr.source {
            if let Some(id) = self.request_or_record(literal.value.as_str()) {
                self.edits.push(Edit::replace(
                    expr.span,
                    format!("Promise.resolve().then(function () {{ return __toESM(require({id})); }})"),
                ));
            }
            return;
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        if is_node_env(expr) {
            let value = serde_json::Value::String(self.node_env.to_string()).to_string();
            self.edits.push(Edit::replace(expr.span, value));
            return;
        }
        walk::walk_static_member_expression(self, expr);
    }
}

/// Matches `process.env.NODE_ENV`.
fn is_node_env(expr: &StaticMemberExpression<'_>) -> bool {
    if expr.property.name.as_str() != "NODE_ENV" {
        return false;
    }
    let Expression::StaticMemberExpression(env) = &expr.object else {
        return false;
    };
    if env.property.name.as_str() != "env" {
        return false;
    }
    matches!(&env.object, Expression::Identifier(process) if process.name.as_str() == "process")
}

fn declaration_names(declaration: &Declaration<'_>, names: &mut Vec<String>) {
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                pattern_names(&declarator.id, names);
            }
        }
        Declaration::FunctionDeclaration(f) => {
            if let Some(id) = &f.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(c) => {
            if let Some(id) = &c.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
}

fn pattern_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                pattern_names(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                pattern_names(element, names);
            }
            if let Some(rest) = &array.rest {
                pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => pattern_names(&assign.left, names),
    }
}

/// Property access on `object`, dotted when `name` is a plain identifier.
fn member(object: &str, name: &str) -> String {
    let mut chars = name.chars();
    let is_identifier = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_identifier {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", serde_json::Value::String(name.to_string()))
    }
}

fn apply_edits(code: &str, mut edits: Vec<Edit>) -> String {
    // Back to front, so earlier offsets stay valid.
    edits.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
    let mut out = code.to_string();
    for edit in edits {
        out.replace_range(edit.start as usize..edit.end as usize, &edit.text);
    }
    out
}
