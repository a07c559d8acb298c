//! Front-end compilation of scripts and modules.
//!
//! A source text is parsed into a syntax tree and compiled to bytecode
//! without evaluating anything. Alongside the top-level chunk the unit
//! records what an embedder needs before running it: top-level
//! declarations, module dependency specifiers and exported names.

use crate::ast::{Export, ImportSpecifier, Program, Statement, VariableKind};
use crate::bytecode::BytecodeChunk;
use crate::codegen::{generate, var_declared_names};
use crate::parser::parse;
use core_types::{JsError, SourcePosition};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether a source is compiled as a classic script or an ES module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// Classic script
    Script,
    /// ES module
    Module,
}

impl UnitKind {
    /// Lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::Script => "script",
            UnitKind::Module => "module",
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            UnitKind::Script => 1,
            UnitKind::Module => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<UnitKind> {
        match tag {
            1 => Some(UnitKind::Script),
            2 => Some(UnitKind::Module),
            _ => None,
        }
    }
}

/// How a top-level binding was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclarationKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
    /// `function` declaration
    Function,
    /// `class` declaration
    Class,
    /// Binding created by an `import` declaration
    Import,
}

/// A top-level binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Bound name
    pub name: String,
    /// Declaration form
    pub kind: DeclarationKind,
    /// Where the name appears
    pub position: SourcePosition,
}

/// Result of compiling one source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledUnit {
    /// Script or module
    pub kind: UnitKind,
    /// Top-level bindings in source order
    pub declarations: Vec<Declaration>,
    /// Module specifiers from `import` and `export ... from`, first use order
    pub dependency_specifiers: Vec<String>,
    /// Exported names (modules only)
    pub exports: Vec<String>,
    /// Top-level bytecode; functions are nested inside it
    pub chunk: BytecodeChunk,
}

impl CompiledUnit {
    /// Whether `name` is a top-level binding.
    pub fn declares(&self, name: &str) -> bool {
        self.declarations.iter().any(|d| d.name == name)
    }

    /// Number of function chunks, the top level included.
    pub fn function_count(&self) -> usize {
        fn count(chunk: &BytecodeChunk) -> usize {
            1 + chunk.nested_functions().iter().map(count).sum::<usize>()
        }
        count(&self.chunk)
    }
}

/// Compile `source` as `kind`.
pub fn compile_unit(source: &str, kind: UnitKind) -> Result<CompiledUnit, JsError> {
    let program = parse(source, kind)?;
    let mut collector = UnitInfo::default();
    collector.collect(&program);
    let chunk = generate(&program, kind)?;
    debug!(
        kind = kind.name(),
        instructions = chunk.instruction_count(),
        declarations = collector.declarations.len(),
        "compiled unit"
    );
    Ok(CompiledUnit {
        kind,
        declarations: collector.declarations,
        dependency_specifiers: collector.dependencies.into_iter().collect(),
        exports: collector.exports.into_iter().collect(),
        chunk,
    })
}

/// Top-level facts gathered from a syntax tree.
#[derive(Default)]
struct UnitInfo {
    declarations: Vec<Declaration>,
    dependencies: IndexSet<String>,
    exports: IndexSet<String>,
}

impl UnitInfo {
    fn collect(&mut self, program: &Program) {
        for statement in &program.body {
            self.statement(statement);
        }
    }

    fn declare(&mut self, name: &str, kind: DeclarationKind, position: SourcePosition) {
        if self.declarations.iter().any(|d| d.name == name) {
            return;
        }
        self.declarations.push(Declaration {
            name: name.to_string(),
            kind,
            position,
        });
    }

    /// Record the bindings of a top-level statement and return their names.
    fn statement(&mut self, statement: &Statement) -> Vec<String> {
        let before = self.declarations.len();
        match statement {
            Statement::VariableDeclaration {
                kind: kind @ (VariableKind::Let | VariableKind::Const),
                declarations,
                ..
            } => {
                let kind = match kind {
                    VariableKind::Const => DeclarationKind::Const,
                    _ => DeclarationKind::Let,
                };
                for declaration in declarations {
                    for id in declaration.id.bound_names() {
                        self.declare(&id.name, kind, id.position);
                    }
                }
            }
            Statement::FunctionDeclaration { function, .. } => {
                if let Some(name) = &function.name {
                    self.declare(&name.name, DeclarationKind::Function, name.position);
                }
            }
            Statement::ClassDeclaration { class, .. } => {
                if let Some(name) = &class.name {
                    self.declare(&name.name, DeclarationKind::Class, name.position);
                }
            }
            Statement::ImportDeclaration {
                specifiers, source, ..
            } => {
                self.dependencies.insert(source.clone());
                for specifier in specifiers {
                    let local = match specifier {
                        ImportSpecifier::Default(local)
                        | ImportSpecifier::Namespace(local)
                        | ImportSpecifier::Named { local, .. } => local,
                    };
                    self.declare(&local.name, DeclarationKind::Import, local.position);
                }
            }
            Statement::ExportDeclaration { export, .. } => self.export(export),
            other => {
                let mut names = Vec::new();
                var_declared_names(other, &mut names);
                for id in names {
                    self.declare(&id.name, DeclarationKind::Var, id.position);
                }
            }
        }
        self.declarations[before..]
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    fn export(&mut self, export: &Export) {
        match export {
            Export::Named { specifiers, source } => {
                if let Some(source) = source {
                    self.dependencies.insert(source.clone());
                }
                for specifier in specifiers {
                    self.exports.insert(specifier.exported.clone());
                }
            }
            Export::All { alias, source } => {
                self.dependencies.insert(source.clone());
                if let Some(alias) = alias {
                    self.exports.insert(alias.clone());
                }
            }
            Export::Declaration(declaration) => {
                let names = self.statement(declaration);
                self.exports.extend(names);
            }
            Export::DefaultFunction(function) => {
                if let Some(name) = &function.name {
                    self.declare(&name.name, DeclarationKind::Function, name.position);
                }
                self.exports.insert("default".to_string());
            }
            Export::DefaultClass(class) => {
                if let Some(name) = &class.name {
                    self.declare(&name.name, DeclarationKind::Class, name.position);
                }
                self.exports.insert("default".to_string());
            }
            Export::DefaultExpression(_) => {
                self.exports.insert("default".to_string());
            }
        }
    }
}
