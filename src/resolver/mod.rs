//! Import graph resolution.
//!
//! Starting from a template, the resolver reads and parses every fragment reachable
//! through imports, classifies each import, and orders the fragments so that every
//! fragment comes after the fragments it imports. The template is always last.
//!
//! # Import classification
//!
//! Every top-level import falls in exactly one category:
//!
//! - **Ignored**: development-only modules (see [`ImportPolicy::ignored_modules`]); the
//!   import is dropped from the artifact
//! - **Host**: the host API (see [`ImportPolicy::host_modules`]); any name may be imported
//!   except `*`, and the import is hoisted to the top of the artifact
//! - **Native**: a module from the front end's natives table; only the listed names may
//!   be imported, and the import is hoisted
//! - **Fragment**: a file found on the search path; its definitions are inlined
//!
//! Anything else fails with [`WeaveError::UnresolvedFragment`].
//!
//! Relative imports resolve against the importing fragment's package and are always
//! fragment imports.
//!
//! # Determinism
//!
//! Fragments are discovered breadth-first in import order and ordered depth-first in
//! import order, so the same sources always produce the same order.

pub mod dependency_graph;

pub use dependency_graph::FragmentGraph;

use anyhow::{Context, Result};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_HOST_MODULES, DEFAULT_IGNORED_MODULES};
use crate::core::WeaveError;
use crate::fragment::{Fragment, ModuleLocator};
use crate::syntax::{FrontEnd, ImportDecl, ImportNames, ImportedName, NativeModule};

/// What an import binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// A fragment bound as a module: `import a.b as m`, `import a.b`, or
    /// `from a import b` where `b` is a fragment.
    ///
    /// `attribute_path` holds the path components between the binding and the fragment
    /// for unaliased dotted imports (`["b"]` for `import a.b`).
    Module {
        target: PathBuf,
        attribute_path: Vec<String>,
    },
    /// A single definition of a fragment: `from a.b import name`
    Symbol {
        target: PathBuf,
        name: String,
    },
    /// Every definition of a fragment: `from a.b import *`
    Glob {
        target: PathBuf,
    },
    /// Allowed native module import, hoisted into the artifact preamble
    Native {
        names: ImportNames,
    },
    /// Host API import, hoisted into the artifact preamble
    Host {
        names: ImportNames,
    },
    /// Development-only import, dropped; type hints using its names become `Any`
    Ignored {
        names: ImportNames,
    },
}

impl ImportKind {
    /// Fragment file this import pulls in, if any.
    #[must_use]
    pub fn target(&self) -> Option<&Path> {
        match self {
            Self::Module {
                target,
                ..
            }
            | Self::Symbol {
                target,
                ..
            }
            | Self::Glob {
                target,
            } => Some(target),
            Self::Native {
                ..
            }
            | Self::Host {
                ..
            }
            | Self::Ignored {
                ..
            } => None,
        }
    }
}

/// A classified import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    /// Index of the import statement in the importing module
    pub statement: usize,
    pub line: usize,
    /// Absolute dotted module name
    pub module: String,
    /// Name bound in the importing module; `None` for hoisted, ignored and glob imports
    pub binding: Option<String>,
    pub kind: ImportKind,
}

/// Which non-fragment modules may be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPolicy {
    /// Host API roots; `contracts_api` also covers `contracts_api.sub`
    pub host_modules: Vec<String>,
    /// Module names (or dotted path components) whose imports are dropped
    pub ignored_modules: Vec<String>,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            host_modules: DEFAULT_HOST_MODULES.iter().map(|s| (*s).to_string()).collect(),
            ignored_modules: DEFAULT_IGNORED_MODULES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl ImportPolicy {
    fn is_host(&self, module: &str) -> bool {
        self.host_modules
            .iter()
            .any(|host| module == host || module.starts_with(&format!("{host}.")))
    }

    fn is_ignored(&self, module: &str) -> bool {
        let dotted = format!(".{module}.");
        self.ignored_modules.iter().any(|ignored| dotted.contains(&format!(".{ignored}.")))
    }
}

/// Fragments reachable from a template, dependency-first.
#[derive(Debug)]
pub struct ResolvedGraph<M> {
    /// Fragments in output order; the template is last
    pub fragments: Vec<Fragment<M>>,
    pub graph: FragmentGraph,
    /// Locator used for resolution, including the template's directory
    pub locator: ModuleLocator,
}

impl<M> ResolvedGraph<M> {
    /// The composition entry point.
    #[must_use]
    pub fn template(&self) -> Option<&Fragment<M>> {
        self.fragments.last().filter(|f| f.is_template)
    }

    /// Look up a fragment by canonical path.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Fragment<M>> {
        self.fragments.iter().find(|f| f.path == path)
    }
}

/// Resolves a template's transitive fragment imports.
pub struct FragmentResolver<'a, F: FrontEnd> {
    front_end: &'a F,
    locator: ModuleLocator,
    policy: ImportPolicy,
}

impl<'a, F: FrontEnd> FragmentResolver<'a, F> {
    pub fn new(front_end: &'a F, locator: ModuleLocator, policy: ImportPolicy) -> Self {
        Self {
            front_end,
            locator,
            policy,
        }
    }

    /// Load, parse and order every fragment reachable from `template`.
    ///
    /// The template's directory is appended to the search path. Each fragment is read
    /// once no matter how many times it is imported. Nothing is returned unless the whole
    /// graph resolves and is acyclic.
    pub fn resolve(&self, template: &Path) -> Result<ResolvedGraph<F::Module>> {
        let template_path = template
            .canonicalize()
            .with_context(|| format!("Cannot read template {}", template.display()))?;

        let mut locator = self.locator.clone();
        if let Some(parent) = template_path.parent() {
            locator.push_root(parent.to_path_buf());
        }

        let mut loaded: HashMap<PathBuf, Fragment<F::Module>> = HashMap::new();
        let mut graph = FragmentGraph::new();
        let mut queue = VecDeque::from([(template_path.clone(), true)]);

        while let Some((path, is_template)) = queue.pop_front() {
            if loaded.contains_key(&path) {
                continue;
            }
            let label = display_label(&locator, &path);
            let fragment = self.load(&locator, &path, &label, is_template)?;
            graph.add_fragment(&path, label);

            for import in &fragment.imports {
                let Some(target) = import.kind.target() else {
                    continue;
                };
                graph.add_dependency(&path, target);
                if !loaded.contains_key(target) {
                    queue.push_back((target.to_path_buf(), false));
                }
            }
            loaded.insert(path, fragment);
        }

        let order = graph.topological_order(&template_path)?;
        tracing::debug!(
            target: "render",
            "Resolved {} fragment(s) with {} import edge(s)",
            graph.node_count(),
            graph.edge_count()
        );

        let fragments = order.into_iter().filter_map(|path| loaded.remove(&path)).collect();
        Ok(ResolvedGraph {
            fragments,
            graph,
            locator,
        })
    }

    fn load(
        &self,
        locator: &ModuleLocator,
        path: &Path,
        label: &str,
        is_template: bool,
    ) -> Result<Fragment<F::Module>> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fragment {}", path.display()))?;
        let module = self.front_end.parse(label, &source)?;

        let module_name = locator.module_name_for(path).unwrap_or_else(|| {
            path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        });
        let is_package = locator.is_package(path);

        let symbols = self
            .front_end
            .declarations(&module)
            .into_iter()
            .filter(|d| d.kind.declares_symbols())
            .flat_map(|d| d.defines)
            .collect();

        let mut imports = Vec::new();
        for decl in self.front_end.imports(&module) {
            imports.extend(self.classify(locator, &decl, &module_name, is_package, label)?);
        }

        tracing::debug!(
            target: "render",
            "Loaded {} as module '{}' ({} import(s))",
            label,
            module_name,
            imports.len()
        );

        Ok(Fragment {
            path: path.to_path_buf(),
            module_name,
            source,
            module,
            symbols,
            imports,
            is_template,
        })
    }

    /// Classify one import declaration.
    fn classify(
        &self,
        locator: &ModuleLocator,
        decl: &ImportDecl,
        importer_module: &str,
        importer_is_package: bool,
        importer: &str,
    ) -> Result<Vec<ResolvedImport>> {
        let module = absolute_module(decl, importer_module, importer_is_package, importer)?;
        let make = |binding: Option<String>, kind: ImportKind| ResolvedImport {
            statement: decl.statement,
            line: decl.line,
            module: module.clone(),
            binding,
            kind,
        };

        if decl.level == 0 {
            if self.policy.is_ignored(&module) {
                tracing::debug!(target: "render", "Dropping import of '{}' in {}", module, importer);
                return Ok(vec![make(
                    None,
                    ImportKind::Ignored {
                        names: decl.names.clone(),
                    },
                )]);
            }
            if self.policy.is_host(&module) {
                if let ImportNames::Members(names) = &decl.names
                    && names.iter().any(ImportedName::is_glob)
                {
                    return Err(disallowed(&module, "*", importer));
                }
                return Ok(vec![make(
                    None,
                    ImportKind::Host {
                        names: decl.names.clone(),
                    },
                )]);
            }
            if let Some(native) = self.front_end.native_module(&module) {
                check_native(&module, native, &decl.names, importer)?;
                return Ok(vec![make(
                    None,
                    ImportKind::Native {
                        names: decl.names.clone(),
                    },
                )]);
            }
        }

        match &decl.names {
            ImportNames::Module {
                alias,
            } => {
                let target = locator
                    .find(&module)
                    .ok_or_else(|| unresolved(locator, &module, importer))?;
                let (binding, attribute_path) = match alias {
                    Some(alias) => (alias.clone(), Vec::new()),
                    None => {
                        let mut parts = module.split('.').map(str::to_string);
                        let first = parts.next().unwrap_or_default();
                        (first, parts.collect())
                    }
                };
                Ok(vec![make(
                    Some(binding),
                    ImportKind::Module {
                        target,
                        attribute_path,
                    },
                )])
            }
            ImportNames::Members(names) => names
                .iter()
                .map(|imported| {
                    if imported.is_glob() {
                        let target = locator
                            .find(&module)
                            .ok_or_else(|| unresolved(locator, &module, importer))?;
                        return Ok(make(
                            None,
                            ImportKind::Glob {
                                target,
                            },
                        ));
                    }

                    let binding = Some(imported.binding().to_string());
                    let submodule = join_module(&module, &imported.name);
                    if let Some(target) = locator.find(&submodule) {
                        Ok(make(
                            binding,
                            ImportKind::Module {
                                target,
                                attribute_path: Vec::new(),
                            },
                        ))
                    } else if let Some(target) = locator.find(&module) {
                        Ok(make(
                            binding,
                            ImportKind::Symbol {
                                target,
                                name: imported.name.clone(),
                            },
                        ))
                    } else {
                        let missing = if module.is_empty() { &submodule } else { &module };
                        Err(unresolved(locator, missing, importer))
                    }
                })
                .collect(),
        }
    }
}

fn display_label(locator: &ModuleLocator, path: &Path) -> String {
    locator.relative_display(path).unwrap_or_else(|| path.display().to_string())
}

fn join_module(module: &str, name: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else {
        format!("{module}.{name}")
    }
}

/// Absolute module name of an import, resolving leading dots against the importer.
fn absolute_module(
    decl: &ImportDecl,
    importer_module: &str,
    importer_is_package: bool,
    importer: &str,
) -> Result<String> {
    if decl.level == 0 {
        return Ok(decl.module.clone());
    }

    let mut package: Vec<&str> = importer_module.split('.').filter(|p| !p.is_empty()).collect();
    if !importer_is_package {
        package.pop();
    }
    for _ in 1..decl.level {
        if package.pop().is_none() {
            return Err(WeaveError::UnresolvedFragment {
                module: format!("{}{}", ".".repeat(decl.level), decl.module),
                importer: importer.to_string(),
                suggestion: None,
            }
            .into());
        }
    }
    if !decl.module.is_empty() {
        package.push(&decl.module);
    }
    Ok(package.join("."))
}

fn check_native(module: &str, native: NativeModule, names: &ImportNames, importer: &str) -> Result<()> {
    match (native, names) {
        (
            NativeModule::WholeModule,
            ImportNames::Module {
                alias: Some(alias),
            },
        ) => Err(disallowed(module, &format!("{module} as {alias}"), importer)),
        (NativeModule::WholeModule, ImportNames::Members(members)) => {
            let name = members.first().map_or("*", |m| m.name.as_str());
            Err(disallowed(module, name, importer))
        }
        (NativeModule::Members(allowed), ImportNames::Members(members)) => {
            match members.iter().find(|m| !allowed.contains(&m.name.as_str())) {
                Some(member) => Err(disallowed(module, &member.name, importer)),
                None => Ok(()),
            }
        }
        (_, ImportNames::Module {
            ..
        }) => Ok(()),
    }
}

fn disallowed(module: &str, name: &str, importer: &str) -> anyhow::Error {
    WeaveError::DisallowedImport {
        module: module.to_string(),
        name: name.to_string(),
        importer: importer.to_string(),
    }
    .into()
}

fn unresolved(locator: &ModuleLocator, module: &str, importer: &str) -> anyhow::Error {
    WeaveError::UnresolvedFragment {
        module: module.to_string(),
        importer: importer.to_string(),
        suggestion: locator.suggest(module),
    }
    .into()
}
