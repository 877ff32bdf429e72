//! Front end for the host's scripting language.

mod lexer;
mod module;
mod natives;
mod rewrite;
mod scope;

pub use module::PyModule;

use anyhow::Result;
use std::collections::HashSet;

use crate::core::WeaveError;
use crate::syntax::{
    ConstantTable, FrontEnd, ImportDecl, ImportNames, ImportedName, NativeModule, RewritePlan,
    TopLevel, TopLevelKind,
};
use module::{LineKind, PyStatementKind, parse_module};

/// Lossless front end: unparsing an untouched module reproduces its source exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonFrontEnd;

impl PythonFrontEnd {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FrontEnd for PythonFrontEnd {
    type Module = PyModule;

    fn extension(&self) -> &'static str {
        "py"
    }

    fn parse(&self, path: &str, source: &str) -> Result<PyModule> {
        parse_module(path, source).map_err(|e| {
            WeaveError::FragmentParseError {
                path: path.to_string(),
                line: e.line,
                reason: e.reason,
            }
            .into()
        })
    }

    fn imports(&self, module: &PyModule) -> Vec<ImportDecl> {
        let mut imports = Vec::new();
        for (index, statement) in module.statements.iter().enumerate() {
            if statement.removed {
                continue;
            }
            match &statement.kind {
                PyStatementKind::Import(modules) => {
                    imports.extend(modules.iter().map(|(name, alias)| ImportDecl {
                        statement: index,
                        line: statement.line,
                        level: 0,
                        module: name.clone(),
                        names: ImportNames::Module {
                            alias: alias.clone(),
                        },
                    }));
                }
                PyStatementKind::FromImport {
                    level,
                    module: name,
                    names,
                } => imports.push(ImportDecl {
                    statement: index,
                    line: statement.line,
                    level: *level,
                    module: name.clone(),
                    names: ImportNames::Members(
                        names
                            .iter()
                            .map(|n| ImportedName {
                                name: n.name.clone(),
                                alias: n.alias.clone(),
                            })
                            .collect(),
                    ),
                }),
                _ => {}
            }
        }
        imports
    }

    fn declarations(&self, module: &PyModule) -> Vec<TopLevel> {
        let mut declarations = Vec::new();
        for (index, statement) in module.statements.iter().enumerate() {
            if statement.removed {
                continue;
            }
            let (kind, defines) = match &statement.kind {
                PyStatementKind::Trivia => (TopLevelKind::Trivia, Vec::new()),
                PyStatementKind::Import(modules) => (
                    TopLevelKind::Import,
                    modules
                        .iter()
                        .map(|(name, alias)| {
                            alias.clone().unwrap_or_else(|| {
                                name.split('.').next().unwrap_or(name).to_string()
                            })
                        })
                        .collect(),
                ),
                PyStatementKind::FromImport {
                    names,
                    ..
                } => (
                    TopLevelKind::Import,
                    names
                        .iter()
                        .filter(|n| n.name != "*")
                        .map(|n| n.alias.clone().unwrap_or_else(|| n.name.clone()))
                        .collect(),
                ),
                PyStatementKind::FunctionDef(name) => {
                    (TopLevelKind::Function, vec![module.text(*name).to_string()])
                }
                PyStatementKind::ClassDef(name) => {
                    (TopLevelKind::Class, vec![module.text(*name).to_string()])
                }
                PyStatementKind::Assign {
                    targets,
                    ..
                } => (
                    TopLevelKind::Assignment,
                    targets.iter().flatten().map(|&i| module.text(i).to_string()).collect(),
                ),
                PyStatementKind::Other => (TopLevelKind::Other, scope::module_bindings(module, index)),
            };

            let has_code = statement.lines.iter().any(|l| l.kind == LineKind::Code);
            let references = if has_code && kind != TopLevelKind::Import {
                scope::module_references(module, index)
            } else {
                Default::default()
            };

            declarations.push(TopLevel {
                index,
                kind,
                defines,
                references,
                line: statement.line,
            });
        }
        declarations
    }

    fn rewrite(&self, module: &mut PyModule, plan: &RewritePlan) -> Result<()> {
        rewrite::apply_plan(module, plan)
    }

    fn constants(&self, module: &PyModule) -> ConstantTable {
        rewrite::collect_constants(module)
    }

    fn substitute_literals(
        &self,
        module: &mut PyModule,
        constants: &ConstantTable,
        call_sites: &[String],
    ) -> usize {
        rewrite::substitute_literals(module, constants, call_sites)
    }

    fn replace_annotation_names(
        &self,
        module: &mut PyModule,
        names: &HashSet<String>,
        replacement: &str,
    ) -> usize {
        rewrite::replace_annotation_names(module, names, replacement)
    }

    fn remove_statement(&self, module: &mut PyModule, index: usize) {
        if let Some(statement) = module.statements.get_mut(index) {
            statement.removed = true;
        }
    }

    fn unparse(&self, module: &PyModule) -> String {
        module.render()
    }

    fn render_import(&self, module: &str, names: &ImportNames) -> String {
        match names {
            ImportNames::Module {
                alias: Some(alias),
            } => format!("import {module} as {alias}"),
            ImportNames::Module {
                alias: None,
            } => format!("import {module}"),
            ImportNames::Members(members) => {
                let names: Vec<String> = members
                    .iter()
                    .map(|m| match &m.alias {
                        Some(alias) => format!("{} as {alias}", m.name),
                        None => m.name.clone(),
                    })
                    .collect();
                format!("from {module} import {}", names.join(", "))
            }
        }
    }

    fn catch_all_type(&self) -> (&'static str, &'static str) {
        ("typing", "Any")
    }

    fn is_builtin(&self, name: &str) -> bool {
        natives::is_builtin(name)
    }

    fn native_module(&self, module: &str) -> Option<NativeModule> {
        natives::native_module(module)
    }
}
