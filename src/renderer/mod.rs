//! Template composition.
//!
//! The [`Composer`] turns a [`ResolvedGraph`] into one self-contained [`RenderedArtifact`]:
//!
//! 1. Every import statement is removed from every fragment and from the template.
//!    Native and host API imports are merged per module and hoisted to the top of the
//!    artifact; fragment imports disappear because the fragments are inlined.
//! 2. Every top-level definition of a fragment is renamed to `<prefix>_<name>`, where the
//!    prefix comes from the fragment's module name (see [`NamespaceStrategy`]). Uses are
//!    rewritten in the defining fragment and everywhere the definition is imported:
//!    `util.doit()` becomes `util_doit()` and `from util import doit` turns `doit` into
//!    `util_doit`.
//! 3. Every top-level name of the artifact is checked for collisions.
//! 4. Constants used inside literal call sites (`requires(...)` and friends) are replaced
//!    by their literal values.
//! 5. Optionally, definitions nothing reaches are pruned, and free names are checked.
//!
//! Each inlined fragment is preceded by a provenance header carrying the checksum of its
//! original bytes. The template body comes last, without a header.
//!
//! Composition works on in-memory copies and either produces a complete artifact or fails;
//! nothing is written until the caller serializes the result.

pub mod artifact;
pub mod namespace;

pub use artifact::{RenderedArtifact, RenderedSection};
pub use namespace::{NameRegistry, NamespaceStrategy};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_LITERAL_CALL_SITES;
use crate::core::WeaveError;
use crate::fragment::{Fragment, to_slash};
use crate::git::GitRepo;
use crate::provenance::{ChecksumAlgorithm, ProvenanceHeader};
use crate::resolver::{ImportKind, ResolvedGraph};
use crate::syntax::{
    ConstantTable, FrontEnd, ImportNames, ImportedName, Namespace, RewritePlan, TopLevel,
    TopLevelKind,
};

/// How fragment paths are written into provenance headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HeaderPathStyle {
    /// Relative to the repository root, or to the search root outside a repository
    #[default]
    Relative,
    /// Absolute filesystem path
    Absolute,
}

/// Composition settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeOptions {
    pub algorithm: ChecksumAlgorithm,
    pub namespace: NamespaceStrategy,
    pub header_paths: HeaderPathStyle,
    /// Callees whose arguments must be literals
    pub literal_call_sites: Vec<String>,
    /// Names the host runtime defines without an import
    pub injected_names: Vec<String>,
    pub prune_unused: bool,
    pub banner: bool,
    /// Fail instead of warning on free names with no definition
    pub strict_symbols: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            algorithm: ChecksumAlgorithm::default(),
            namespace: NamespaceStrategy::default(),
            header_paths: HeaderPathStyle::default(),
            literal_call_sites: DEFAULT_LITERAL_CALL_SITES.iter().map(|s| (*s).to_string()).collect(),
            injected_names: Vec::new(),
            prune_unused: false,
            banner: true,
            strict_symbols: false,
        }
    }
}

/// Where a fragment came from, as far as version control knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentOrigin {
    /// Path relative to the repository root, `/`-separated
    pub repo_path: Option<String>,
    /// Last commit whose blob matches the working-tree content
    pub commit: Option<String>,
}

/// Banner written as the first line of an artifact.
#[must_use]
pub fn banner_text() -> String {
    format!("Code auto-generated by weave {}", env!("CARGO_PKG_VERSION"))
}

/// Native and host API imports merged across the artifact.
#[derive(Debug, Default)]
struct HoistedImports {
    entries: Vec<(String, ImportNames)>,
}

impl HoistedImports {
    fn add(&mut self, module: &str, names: &ImportNames) {
        match names {
            ImportNames::Module {
                ..
            } => {
                if !self.entries.iter().any(|(m, n)| m == module && n == names) {
                    self.entries.push((module.to_string(), names.clone()));
                }
            }
            ImportNames::Members(members) => {
                let existing = self.entries.iter_mut().find_map(|(m, n)| match n {
                    ImportNames::Members(existing) if m == module => Some(existing),
                    _ => None,
                });
                match existing {
                    Some(existing) => {
                        for member in members {
                            if !existing.contains(member) {
                                existing.push(member.clone());
                            }
                        }
                    }
                    None => self.entries.push((module.to_string(), names.clone())),
                }
            }
        }
    }

    /// Every name the hoisted imports bind, with the module it comes from.
    fn bindings(&self) -> Vec<(String, &str)> {
        let mut bindings = Vec::new();
        for (module, names) in &self.entries {
            match names {
                ImportNames::Module {
                    alias,
                } => {
                    let binding = alias
                        .clone()
                        .unwrap_or_else(|| module.split('.').next().unwrap_or(module).to_string());
                    bindings.push((binding, module.as_str()));
                }
                ImportNames::Members(members) => {
                    bindings.extend(members.iter().map(|m| (m.binding().to_string(), module.as_str())));
                }
            }
        }
        bindings
    }
}

/// Composes resolved fragment graphs into artifacts.
pub struct Composer<'a, F: FrontEnd> {
    front_end: &'a F,
    options: ComposeOptions,
}

impl<'a, F: FrontEnd> Composer<'a, F> {
    pub fn new(front_end: &'a F, options: ComposeOptions) -> Self {
        Self {
            front_end,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ComposeOptions {
        &self.options
    }

    /// Compose `graph` into an artifact.
    ///
    /// `origins` supplies repository paths and commits for the provenance headers; fragments
    /// without an entry are labelled relative to their search root and carry no commit.
    pub fn compose(
        &self,
        graph: &ResolvedGraph<F::Module>,
        origins: &HashMap<PathBuf, FragmentOrigin>,
    ) -> Result<RenderedArtifact> {
        let fe = self.front_end;
        let strategy = self.options.namespace;
        let labels: Vec<String> = graph
            .fragments
            .iter()
            .map(|f| {
                graph.locator.relative_display(&f.path).unwrap_or_else(|| f.path.display().to_string())
            })
            .collect();

        let mut exports: HashMap<&Path, Namespace> = HashMap::new();
        let mut registry = NameRegistry::new();
        let mut hoisted = HoistedImports::default();
        let mut modules: Vec<F::Module> = Vec::with_capacity(graph.fragments.len());

        for (fragment, label) in graph.fragments.iter().zip(&labels) {
            let own: HashMap<String, String> = if fragment.is_template {
                HashMap::new()
            } else {
                fragment
                    .symbols
                    .iter()
                    .map(|s| (s.clone(), strategy.prefixed(&fragment.module_name, s)))
                    .collect()
            };
            for final_name in own.values() {
                registry.register(final_name, label)?;
            }

            let mut plan = import_plan(fragment, &exports, label)?;
            plan.renames.extend(own.clone());

            let mut module = fragment.module.clone();
            let mut dropped: HashSet<String> = HashSet::new();
            for import in &fragment.imports {
                match &import.kind {
                    ImportKind::Native {
                        names,
                    }
                    | ImportKind::Host {
                        names,
                    } => hoisted.add(&import.module, names),
                    ImportKind::Ignored {
                        names: ImportNames::Members(members),
                    } => {
                        dropped.extend(
                            members
                                .iter()
                                .filter(|m| !m.is_glob())
                                .map(|m| m.binding().to_string()),
                        );
                    }
                    _ => {}
                }
                fe.remove_statement(&mut module, import.statement);
            }
            fe.rewrite(&mut module, &plan)?;

            if !dropped.is_empty() {
                let (type_module, type_name) = fe.catch_all_type();
                let replaced = fe.replace_annotation_names(&mut module, &dropped, type_name);
                if replaced > 0 {
                    tracing::debug!(
                        target: "render",
                        "Replaced {} type hint(s) from dropped imports with {} in {}",
                        replaced,
                        type_name,
                        label
                    );
                    let any = ImportNames::Members(vec![ImportedName {
                        name: type_name.to_string(),
                        alias: None,
                    }]);
                    hoisted.add(type_module, &any);
                }
            }

            if fragment.is_template {
                for decl in fe.declarations(&module).iter().filter(|d| d.kind.declares_symbols()) {
                    for name in &decl.defines {
                        registry.register(name, label)?;
                    }
                }
            } else {
                exports.insert(&fragment.path, fragment_exports(fragment, plan));
            }
            modules.push(module);
        }

        let hoisted_bindings = hoisted.bindings();
        for (binding, module) in &hoisted_bindings {
            registry.register(binding, &format!("import {module}"))?;
        }
        tracing::debug!(
            target: "render",
            "Composed namespace holds {} top-level name(s)",
            registry.len()
        );

        let mut constants = ConstantTable::new();
        for module in &modules {
            constants.extend(fe.constants(module));
        }
        let substituted: usize = modules
            .iter_mut()
            .map(|m| fe.substitute_literals(m, &constants, &self.options.literal_call_sites))
            .sum();
        if substituted > 0 {
            tracing::debug!(target: "render", "Substituted {} literal argument(s)", substituted);
        }

        if self.options.prune_unused {
            let pruned = prune_unreachable(fe, &mut modules);
            tracing::info!(target: "render", "Pruned {} unused definition(s)", pruned);
        }

        let known: HashSet<String> = hoisted_bindings
            .into_iter()
            .map(|(binding, _)| binding)
            .chain(self.options.injected_names.iter().cloned())
            .collect();
        self.check_free_names(&modules, &labels, &known)?;

        let mut artifact = RenderedArtifact {
            banner: self.options.banner.then(banner_text),
            imports: hoisted.entries.iter().map(|(m, n)| fe.render_import(m, n)).collect(),
            ..RenderedArtifact::default()
        };
        for ((fragment, label), module) in graph.fragments.iter().zip(&labels).zip(&modules) {
            let body = fe.unparse(module);
            if fragment.is_template {
                artifact.template = body;
                continue;
            }
            let origin = origins.get(&fragment.path).cloned().unwrap_or_default();
            let path = match self.options.header_paths {
                HeaderPathStyle::Relative => origin.repo_path.unwrap_or_else(|| label.clone()),
                HeaderPathStyle::Absolute => to_slash(&fragment.path),
            };
            artifact.sections.push(RenderedSection {
                header: ProvenanceHeader::new(
                    path,
                    fragment.checksum(self.options.algorithm),
                    origin.commit,
                ),
                body,
            });
        }

        tracing::info!(
            target: "render",
            "Rendered {} fragment(s) into {}",
            artifact.sections.len(),
            labels.last().map_or("artifact", String::as_str)
        );
        Ok(artifact)
    }

    /// Report module-level names that nothing defines.
    fn check_free_names(
        &self,
        modules: &[F::Module],
        labels: &[String],
        known: &HashSet<String>,
    ) -> Result<()> {
        let fe = self.front_end;
        let defined: HashSet<String> = modules
            .iter()
            .flat_map(|m| fe.declarations(m))
            .flat_map(|d| d.defines)
            .collect();

        for (module, label) in modules.iter().zip(labels) {
            let free: BTreeSet<String> = fe
                .references(module)
                .into_iter()
                .filter(|name| !defined.contains(name) && !known.contains(name) && !fe.is_builtin(name))
                .collect();
            for name in free {
                if self.options.strict_symbols {
                    return Err(WeaveError::UnresolvedSymbol {
                        name,
                        fragment: label.clone(),
                    }
                    .into());
                }
                tracing::warn!(target: "render", "'{}' in {} is not defined anywhere in the artifact", name, label);
            }
        }
        Ok(())
    }
}

/// Renames and namespaces a fragment's imports give it.
fn import_plan<M>(
    fragment: &Fragment<M>,
    exports: &HashMap<&Path, Namespace>,
    label: &str,
) -> Result<RewritePlan> {
    let mut plan = RewritePlan::default();
    let empty = Namespace::default();

    for import in &fragment.imports {
        let exported = import.kind.target().map_or(&empty, |t| exports.get(t).unwrap_or(&empty));
        match (&import.kind, &import.binding) {
            (
                ImportKind::Module {
                    attribute_path,
                    ..
                },
                Some(binding),
            ) => {
                let path: Vec<&str> = attribute_path.iter().map(String::as_str).collect();
                plan.namespaces
                    .entry(binding.clone())
                    .or_default()
                    .descend(&path)
                    .merge(exported.clone());
            }
            (
                ImportKind::Symbol {
                    name,
                    ..
                },
                Some(binding),
            ) => {
                if let Some(target) = exported.members.get(name) {
                    plan.renames.insert(binding.clone(), target.clone());
                } else if let Some(child) = exported.children.get(name) {
                    plan.namespaces.insert(binding.clone(), child.clone());
                } else {
                    return Err(WeaveError::UnresolvedSymbol {
                        name: format!("{}.{name}", import.module),
                        fragment: label.to_string(),
                    }
                    .into());
                }
            }
            (
                ImportKind::Glob {
                    ..
                },
                _,
            ) => {
                for (name, target) in &exported.members {
                    plan.renames.entry(name.clone()).or_insert_with(|| target.clone());
                }
                for (name, child) in &exported.children {
                    plan.namespaces.entry(name.clone()).or_insert_with(|| child.clone());
                }
            }
            _ => {}
        }
    }
    Ok(plan)
}

/// What importers of `fragment` can reach through it.
fn fragment_exports<M>(fragment: &Fragment<M>, plan: RewritePlan) -> Namespace {
    let mut members: std::collections::BTreeMap<String, String> = plan.renames.into_iter().collect();
    for import in &fragment.imports {
        if let ImportKind::Native {
            names,
        }
        | ImportKind::Host {
            names,
        } = &import.kind
        {
            let bindings: Vec<String> = match names {
                ImportNames::Module {
                    alias,
                } => vec![alias.clone().unwrap_or_else(|| {
                    import.module.split('.').next().unwrap_or(&import.module).to_string()
                })],
                ImportNames::Members(names) => names.iter().map(|n| n.binding().to_string()).collect(),
            };
            for binding in bindings {
                members.entry(binding.clone()).or_insert(binding);
            }
        }
    }
    Namespace {
        members,
        children: plan.namespaces.into_iter().collect(),
    }
}

/// Drop fragment definitions not reachable from the template or from fragment statements
/// that run on import. Returns the number of definitions removed.
fn prune_unreachable<F: FrontEnd>(fe: &F, modules: &mut [F::Module]) -> usize {
    let Some(template) = modules.len().checked_sub(1) else {
        return 0;
    };
    let declarations: Vec<Vec<TopLevel>> = modules.iter().map(|m| fe.declarations(m)).collect();

    let mut definers: HashMap<&str, Vec<(usize, usize)>> = HashMap::new();
    for (m, decls) in declarations.iter().enumerate() {
        for (d, decl) in decls.iter().enumerate() {
            if decl.kind.is_definition() {
                for name in &decl.defines {
                    definers.entry(name.as_str()).or_default().push((m, d));
                }
            }
        }
    }

    let mut reached: HashSet<(usize, usize)> = HashSet::new();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    for (m, decls) in declarations.iter().enumerate() {
        for (d, decl) in decls.iter().enumerate() {
            let is_root = m == template || decl.kind == TopLevelKind::Other;
            if is_root && reached.insert((m, d)) {
                queue.push_back((m, d));
            }
        }
    }
    while let Some((m, d)) = queue.pop_front() {
        for name in &declarations[m][d].references {
            for &site in definers.get(name.as_str()).into_iter().flatten() {
                if reached.insert(site) {
                    queue.push_back(site);
                }
            }
        }
    }

    let mut pruned = 0;
    for (m, decls) in declarations.iter().enumerate().take(template) {
        for (d, decl) in decls.iter().enumerate() {
            if decl.kind.is_definition() && !reached.contains(&(m, d)) {
                tracing::debug!(target: "render", "Pruning unused {}", decl.defines.join(", "));
                fe.remove_statement(&mut modules[m], decl.index);
                pruned += 1;
            }
        }
    }
    pruned
}

/// Repository paths and verified commits for every inlined fragment.
///
/// A fragment's commit is the last commit touching its file, kept only when that commit's
/// blob has the same checksum as the working-tree file. Files with uncommitted changes get
/// no commit and a warning.
pub async fn collect_origins<M>(
    repo: &GitRepo,
    fragments: &[Fragment<M>],
    algorithm: ChecksumAlgorithm,
) -> Result<HashMap<PathBuf, FragmentOrigin>> {
    let mut origins = HashMap::new();

    for fragment in fragments.iter().filter(|f| !f.is_template) {
        let Some(repo_path) = repo.relative_path(&fragment.path) else {
            tracing::warn!(
                target: "render",
                "{} is outside repository {}; header will carry no commit",
                fragment.path.display(),
                repo.root().display()
            );
            origins.insert(fragment.path.clone(), FragmentOrigin::default());
            continue;
        };

        let mut commit = repo.last_commit_for(&repo_path).await?;
        if let Some(candidate) = &commit {
            let blob = repo.show_blob(candidate, &repo_path).await?;
            if algorithm.digest(&blob) != fragment.checksum(algorithm) {
                tracing::warn!(
                    target: "render",
                    "{} has uncommitted changes; omitting commit from its header",
                    repo_path
                );
                commit = None;
            }
        } else {
            tracing::warn!(target: "render", "{} is not committed; omitting commit from its header", repo_path);
        }

        origins.insert(
            fragment.path.clone(),
            FragmentOrigin {
                repo_path: Some(repo_path),
                commit,
            },
        );
    }
    Ok(origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::ModuleLocator;
    use crate::provenance::decode;
    use crate::resolver::{FragmentResolver, ImportPolicy};
    use crate::syntax::PythonFrontEnd;
    use crate::syntax::python::PyModule;
    use std::fs;

    fn layout(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    fn resolve(dir: &tempfile::TempDir, template: &str) -> ResolvedGraph<PyModule> {
        let locator = ModuleLocator::new([dir.path().to_path_buf()], "py");
        FragmentResolver::new(&PythonFrontEnd::new(), locator, ImportPolicy::default())
            .resolve(&dir.path().join(template))
            .unwrap()
    }

    fn render_with(dir: &tempfile::TempDir, template: &str, options: ComposeOptions) -> Result<String> {
        let graph = resolve(dir, template);
        let fe = PythonFrontEnd::new();
        Composer::new(&fe, options).compose(&graph, &HashMap::new())?.to_source()
    }

    fn render(dir: &tempfile::TempDir, template: &str) -> String {
        let options = ComposeOptions {
            banner: false,
            ..ComposeOptions::default()
        };
        render_with(dir, template, options).unwrap()
    }

    const UTIL: &str = "def doit():\n    return 1\n";
    const CALC: &str = "from decimal import Decimal\n\n\ndef doit():\n    return Decimal(2)\n";
    const TEMPLATE: &str = "\
from contracts_api import requires
import lib.util as util
import lib.calc as calc


def hook():
    return util.doit() + calc.doit()
";

    #[test]
    fn test_same_name_in_two_fragments_gets_distinct_prefixes() {
        let dir = layout(&[("lib/util.py", UTIL), ("lib/calc.py", CALC), ("t.py", TEMPLATE)]);
        let output = render(&dir, "t.py");

        assert!(output.starts_with("from decimal import Decimal\nfrom contracts_api import requires\n"));
        assert!(output.contains("def util_doit():\n    return 1\n"));
        assert!(output.contains("def calc_doit():\n    return Decimal(2)\n"));
        assert!(output.ends_with("def hook():\n    return util_doit() + calc_doit()\n"));
        assert!(!output.contains("import lib"));

        let headers = decode(&output).unwrap();
        let paths: Vec<&str> = headers.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["lib/util.py", "lib/calc.py"]);
        assert!(headers[0].checksum.matches(UTIL.as_bytes()));
        assert!(headers[1].checksum.matches(CALC.as_bytes()));
        assert_eq!(headers[0].commit, None);
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let dir = layout(&[("lib/util.py", UTIL), ("lib/calc.py", CALC), ("t.py", TEMPLATE)]);
        let first = render_with(&dir, "t.py", ComposeOptions::default()).unwrap();
        let second = render_with(&dir, "t.py", ComposeOptions::default()).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(&format!("# {}\n", banner_text())));
    }

    #[test]
    fn test_symbol_imports_and_transitive_rewrites() {
        let dir = layout(&[
            ("lib/common.py", "RATE = 5\n\n\ndef scale(x):\n    return x * RATE\n"),
            ("lib/util.py", "from lib.common import scale as s\n\n\ndef doit(x):\n    return s(x)\n"),
            ("t.py", "from lib.util import doit\n\nVALUE = doit(2)\n"),
        ]);
        let output = render(&dir, "t.py");
        assert!(output.contains("common_RATE = 5\n"));
        assert!(output.contains("def common_scale(x):\n    return x * common_RATE\n"));
        assert!(output.contains("def util_doit(x):\n    return common_scale(x)\n"));
        assert!(output.ends_with("VALUE = util_doit(2)\n"));
    }

    #[test]
    fn test_collision_names_both_fragments() {
        let dir = layout(&[
            ("a/util.py", UTIL),
            ("b/util.py", UTIL),
            ("t.py", "import a.util as first\nimport b.util as second\n"),
        ]);
        let err = render_with(&dir, "t.py", ComposeOptions::default()).unwrap_err();
        match err.downcast_ref::<WeaveError>() {
            Some(WeaveError::SymbolCollision {
                name,
                first,
                second,
            }) => {
                assert_eq!(name, "util_doit");
                assert_eq!(first, "a/util.py");
                assert_eq!(second, "b/util.py");
            }
            other => panic!("unexpected {other:?}"),
        }

        let qualified = ComposeOptions {
            namespace: NamespaceStrategy::Qualified,
            banner: false,
            ..ComposeOptions::default()
        };
        let output = render_with(&dir, "t.py", qualified).unwrap();
        assert!(output.contains("def a_util_doit():"));
        assert!(output.contains("def b_util_doit():"));
    }

    #[test]
    fn test_template_name_colliding_with_fragment_name() {
        let dir = layout(&[("util.py", UTIL), ("t.py", "import util as util\n\n\ndef util_doit():\n    pass\n")]);
        let err = render_with(&dir, "t.py", ComposeOptions::default()).unwrap_err();
        assert!(matches!(err.downcast_ref::<WeaveError>(), Some(WeaveError::SymbolCollision { .. })));
    }

    #[test]
    fn test_literal_substitution_in_decorators() {
        let dir = layout(&[
            ("lib/params.py", "DENOMINATION = \"denomination\"\nNAME = DENOMINATION\nALL = [NAME, \"rate\"]\n"),
            (
                "t.py",
                "from contracts_api import requires\nimport lib.params as params\n\n\n\
                 @requires(parameters=[*params.ALL, params.NAME])\ndef hook():\n    return params.NAME\n",
            ),
        ]);
        let output = render(&dir, "t.py");
        assert!(
            output.contains("@requires(parameters=[\"denomination\", \"rate\", \"denomination\"])"),
            "{output}"
        );
        assert!(output.contains("    return params_NAME\n"));
    }

    #[test]
    fn test_missing_symbol() {
        let dir = layout(&[("util.py", UTIL), ("t.py", "from util import nothing\n")]);
        let err = render_with(&dir, "t.py", ComposeOptions::default()).unwrap_err();
        match err.downcast_ref::<WeaveError>() {
            Some(WeaveError::UnresolvedSymbol {
                name,
                fragment,
            }) => {
                assert_eq!(name, "util.nothing");
                assert_eq!(fragment, "t.py");
            }
            other => panic!("unexpected {other:?}"),
        }

        let dir = layout(&[("util.py", UTIL), ("t.py", "import util as u\nX = u.missing()\n")]);
        assert!(render_with(&dir, "t.py", ComposeOptions::default()).is_err());
    }

    #[test]
    fn test_prune_unused_definitions() {
        let dir = layout(&[
            ("util.py", "def used():\n    return helper()\n\n\ndef helper():\n    return 1\n\n\ndef unused():\n    return 2\n"),
            ("t.py", "import util as util\n\nX = util.used()\n"),
        ]);
        let options = ComposeOptions {
            prune_unused: true,
            banner: false,
            ..ComposeOptions::default()
        };
        let output = render_with(&dir, "t.py", options).unwrap();
        assert!(output.contains("def util_used():"));
        assert!(output.contains("def util_helper():"));
        assert!(!output.contains("util_unused"));
    }

    #[test]
    fn test_strict_symbols() {
        let dir = layout(&[("t.py", "X = undefined_name + len([])\n")]);
        assert!(render_with(&dir, "t.py", ComposeOptions::default()).is_ok());

        let strict = ComposeOptions {
            strict_symbols: true,
            ..ComposeOptions::default()
        };
        let err = render_with(&dir, "t.py", strict.clone()).unwrap_err();
        assert!(err.to_string().contains("undefined_name"));

        let injected = ComposeOptions {
            injected_names: vec!["undefined_name".to_string()],
            ..strict
        };
        assert!(render_with(&dir, "t.py", injected).is_ok());
    }

    #[test]
    fn test_hoisted_imports_are_merged() {
        let dir = layout(&[
            ("a.py", "from typing import Any, Optional\n\n\ndef f(x: Optional[Any]):\n    return x\n"),
            (
                "t.py",
                "from typing import Optional, Union\nimport math\nimport a as a\n\n\n\
                 def g(y: Union[int, None]) -> Optional[int]:\n    return a.f(math.floor(y))\n",
            ),
        ]);
        let output = render(&dir, "t.py");
        assert!(output.starts_with("from typing import Any, Optional, Union\nimport math\n\n\n"));
    }

    #[test]
    fn test_multiline_strings_survive_verbatim() {
        let doc = "DOC = \"\"\"a\n\n\n\n\nb\n   \nc\"\"\"\n";
        let dir = layout(&[("u.py", doc), ("t.py", "import u as u\n\nX = u.DOC\n")]);
        let output = render(&dir, "t.py");
        assert!(output.contains("u_DOC = \"\"\"a\n\n\n\n\nb\n   \nc\"\"\"\n"), "{output}");
    }

    #[test]
    fn test_bindings_inside_compound_statements_are_namespaced() {
        let fragment = |n: u32| format!("if True:\n    RATE = {n}\n\n\ndef get():\n    return RATE\n");
        let dir = layout(&[
            ("a.py", fragment(1).as_str()),
            ("b.py", fragment(2).as_str()),
            ("t.py", "import a as a\nimport b as b\n\nX = a.get() + b.get() + a.RATE\n"),
        ]);
        let options = ComposeOptions {
            strict_symbols: true,
            banner: false,
            ..ComposeOptions::default()
        };
        let output = render_with(&dir, "t.py", options).unwrap();
        assert!(output.contains("if True:\n    a_RATE = 1\n\n\ndef a_get():\n    return a_RATE\n"), "{output}");
        assert!(output.contains("if True:\n    b_RATE = 2\n\n\ndef b_get():\n    return b_RATE\n"), "{output}");
        assert!(output.ends_with("X = a_get() + b_get() + a_RATE\n"));
    }

    #[test]
    fn test_template_compound_binding_collides_with_fragment() {
        let dir = layout(&[
            ("util.py", UTIL),
            ("t.py", "import util as util\n\nif True:\n    util_doit = None\n"),
        ]);
        let err = render_with(&dir, "t.py", ComposeOptions::default()).unwrap_err();
        assert!(matches!(err.downcast_ref::<WeaveError>(), Some(WeaveError::SymbolCollision { .. })));
    }

    #[test]
    fn test_dropped_type_hints_become_any() {
        let dir = layout(&[(
            "t.py",
            "from contracts_api import Posting\nfrom dev.contracts_api_extensions import Vault\n\n\n\
             def hook(vault: Vault, extra: list[Vault] | None = None) -> Posting:\n    return Posting()\n",
        )]);
        let options = ComposeOptions {
            strict_symbols: true,
            banner: false,
            ..ComposeOptions::default()
        };
        let output = render_with(&dir, "t.py", options).unwrap();
        assert!(output.starts_with("from contracts_api import Posting\nfrom typing import Any\n\n\n"), "{output}");
        assert!(output.contains("def hook(vault: Any, extra: list[Any] | None = None) -> Posting:"));
        assert!(!output.contains("Vault"));
    }

    #[test]
    fn test_origin_overrides_header_path_and_commit() {
        let dir = layout(&[("lib/util.py", UTIL), ("t.py", "import lib.util as util\nX = util.doit()\n")]);
        let graph = resolve(&dir, "t.py");
        let util = graph.fragments[0].path.clone();
        let origins = HashMap::from([(
            util,
            FragmentOrigin {
                repo_path: Some("features/lib/util.py".to_string()),
                commit: Some("abc123".to_string()),
            },
        )]);
        let fe = PythonFrontEnd::new();
        let artifact = Composer::new(&fe, ComposeOptions::default()).compose(&graph, &origins).unwrap();
        let header = artifact.headers().next().unwrap();
        assert_eq!(header.path, "features/lib/util.py");
        assert_eq!(header.commit.as_deref(), Some("abc123"));
    }
}
