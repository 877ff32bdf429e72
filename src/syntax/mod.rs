//! Source-language front ends.
//!
//! The composer never looks at fragment syntax directly. Everything it needs (the imports
//! of a module, its top-level definitions, rename and literal-substitution passes, and
//! printing the result) goes through the [`FrontEnd`] trait, so a different fragment
//! language can be plugged in without touching resolution or composition.
//!
//! The crate ships one implementation, [`PythonFrontEnd`], for the host's indentation-based
//! scripting language.

pub mod python;

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub use python::PythonFrontEnd;

/// Names brought into scope by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportNames {
    /// `import a.b` or `import a.b as m`
    Module {
        /// Alias given with `as`, if any
        alias: Option<String>,
    },
    /// `from a.b import x, y as z`; a glob import is a single member named `*`
    Members(Vec<ImportedName>),
}

/// One name of a `from ... import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportedName {
    /// The name bound in the importing module.
    #[must_use]
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether this is `from m import *`.
    #[must_use]
    pub fn is_glob(&self) -> bool {
        self.name == "*"
    }
}

/// A top-level import.
///
/// `import a, b` yields one declaration per module, all pointing at the same statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    /// Index of the top-level statement holding the import
    pub statement: usize,
    /// 1-based source line
    pub line: usize,
    /// Number of leading dots of a relative import; 0 for absolute imports
    pub level: usize,
    /// Dotted module path, empty for `from . import x`
    pub module: String,
    pub names: ImportNames,
}

impl ImportDecl {
    /// Name bound by a module import: the alias, or the first path component.
    #[must_use]
    pub fn module_binding(&self) -> Option<&str> {
        match &self.names {
            ImportNames::Module {
                alias,
            } => Some(alias.as_deref().unwrap_or_else(|| {
                self.module.split('.').next().unwrap_or(self.module.as_str())
            })),
            ImportNames::Members(_) => None,
        }
    }
}

/// Category of a top-level statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelKind {
    Import,
    Function,
    Class,
    Assignment,
    Other,
    /// Comments and blank lines only
    Trivia,
}

impl TopLevelKind {
    /// Whether the statement only defines names, without other side effects.
    #[must_use]
    pub const fn is_definition(self) -> bool {
        matches!(self, Self::Function | Self::Class | Self::Assignment)
    }

    /// Whether the names the statement binds belong to the fragment's own namespace.
    ///
    /// Import bindings are excluded; they are hoisted or rewritten instead.
    #[must_use]
    pub const fn declares_symbols(self) -> bool {
        matches!(self, Self::Function | Self::Class | Self::Assignment | Self::Other)
    }
}

/// Summary of a top-level statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevel {
    /// Statement index, stable for the life of the module
    pub index: usize,
    pub kind: TopLevelKind,
    /// Module-level names the statement binds
    pub defines: Vec<String>,
    /// Module-level names the statement reads
    pub references: BTreeSet<String>,
    /// 1-based line of the first code token
    pub line: usize,
}

/// Attribute-access rewrites for a module binding.
///
/// `members` maps attribute names to their final top-level names; `children` covers
/// dotted access into sub-modules (`pkg.sub.attr`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    pub members: BTreeMap<String, String>,
    pub children: BTreeMap<String, Namespace>,
}

impl Namespace {
    /// Merge `other` into `self`; entries already present win.
    pub fn merge(&mut self, other: Namespace) {
        for (name, target) in other.members {
            self.members.entry(name).or_insert(target);
        }
        for (name, child) in other.children {
            self.children.entry(name).or_default().merge(child);
        }
    }

    /// The namespace reached by following `path`, creating empty levels as needed.
    pub fn descend(&mut self, path: &[&str]) -> &mut Namespace {
        path.iter().fold(self, |ns, part| ns.children.entry((*part).to_string()).or_default())
    }
}

/// What to rewrite in one module.
#[derive(Debug, Clone, Default)]
pub struct RewritePlan {
    /// Module-level name to its new name
    pub renames: HashMap<String, String>,
    /// Module binding to the namespace its attribute accesses collapse into
    pub namespaces: HashMap<String, Namespace>,
}

impl RewritePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.namespaces.is_empty()
    }
}

/// Right-hand side of a module-level constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantValue {
    /// Literal source text (`"ACCRUE"`, `10`, `True`)
    Literal(String),
    /// Another module-level name
    Alias(String),
    /// List or tuple display; items are their source text
    Sequence {
        open: String,
        close: String,
        items: Vec<String>,
    },
}

/// Module-level constants visible to literal substitution.
#[derive(Debug, Clone, Default)]
pub struct ConstantTable {
    values: HashMap<String, ConstantValue>,
}

impl ConstantTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name`; a later definition replaces an earlier one.
    pub fn insert(&mut self, name: impl Into<String>, value: ConstantValue) {
        self.values.insert(name.into(), value);
    }

    pub fn extend(&mut self, other: ConstantTable) {
        self.values.extend(other.values);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of `name` with alias chains followed to their end.
    ///
    /// Returns `None` for unknown names, for chains that end in an unknown name, and
    /// for alias cycles.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&ConstantValue> {
        let mut current = name;
        for _ in 0..=self.values.len() {
            match self.values.get(current)? {
                ConstantValue::Alias(target) => current = target,
                value => return Some(value),
            }
        }
        None
    }

    /// Literal text of `name`, if it resolves to a literal.
    #[must_use]
    pub fn literal(&self, name: &str) -> Option<&str> {
        match self.resolve(name)? {
            ConstantValue::Literal(text) => Some(text),
            _ => None,
        }
    }
}

/// Parse, inspect, rewrite and print fragments of one source language.
pub trait FrontEnd: Send + Sync {
    /// Parsed representation of one fragment.
    type Module: Clone + Send + Sync;

    /// File extension of fragments, without the dot.
    fn extension(&self) -> &'static str;

    /// Parse `source`; `path` is used in error messages.
    ///
    /// Fails with [`WeaveError::FragmentParseError`](crate::core::WeaveError::FragmentParseError).
    fn parse(&self, path: &str, source: &str) -> Result<Self::Module>;

    /// Top-level imports in source order.
    fn imports(&self, module: &Self::Module) -> Vec<ImportDecl>;

    /// Every top-level statement still present.
    fn declarations(&self, module: &Self::Module) -> Vec<TopLevel>;

    /// Module-level names read anywhere in the module.
    fn references(&self, module: &Self::Module) -> BTreeSet<String> {
        self.declarations(module).into_iter().flat_map(|s| s.references).collect()
    }

    /// Apply renames and collapse namespace accesses.
    ///
    /// Fails with [`WeaveError::UnresolvedSymbol`](crate::core::WeaveError::UnresolvedSymbol)
    /// when a namespace access names an attribute the namespace does not export.
    fn rewrite(&self, module: &mut Self::Module, plan: &RewritePlan) -> Result<()>;

    /// Module-level constants whose values are literals, aliases or sequence displays.
    fn constants(&self, module: &Self::Module) -> ConstantTable;

    /// Replace constant references inside calls to `call_sites` with their literal
    /// values. Returns the number of substitutions.
    fn substitute_literals(
        &self,
        module: &mut Self::Module,
        constants: &ConstantTable,
        call_sites: &[String],
    ) -> usize;

    /// Replace `names` inside type annotations with `replacement`. Returns the number of
    /// replacements.
    fn replace_annotation_names(
        &self,
        module: &mut Self::Module,
        names: &HashSet<String>,
        replacement: &str,
    ) -> usize;

    /// Drop a top-level statement, including its leading comments.
    fn remove_statement(&self, module: &mut Self::Module, index: usize);

    /// Source text of the module.
    fn unparse(&self, module: &Self::Module) -> String;

    /// Render a merged import for the artifact preamble.
    fn render_import(&self, module: &str, names: &ImportNames) -> String;

    /// Native module and name of the type that stands in for types from dropped imports.
    fn catch_all_type(&self) -> (&'static str, &'static str);

    /// Whether `name` is provided by the language runtime without an import.
    fn is_builtin(&self, name: &str) -> bool;

    /// Names importable from a native `module`, or `None` when the module is not native.
    fn native_module(&self, module: &str) -> Option<NativeModule>;
}

/// What a native module allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeModule {
    /// Only `import module`, without an alias
    WholeModule,
    /// `from module import name` for the listed names, or `import module`
    Members(&'static [&'static str]),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_chain_resolution() {
        let mut table = ConstantTable::new();
        table.insert("A", ConstantValue::Literal("\"x\"".to_string()));
        table.insert("B", ConstantValue::Alias("A".to_string()));
        table.insert("C", ConstantValue::Alias("B".to_string()));
        table.insert("LOOP", ConstantValue::Alias("LOOP".to_string()));
        table.insert("DANGLING", ConstantValue::Alias("MISSING".to_string()));

        assert_eq!(table.literal("C"), Some("\"x\""));
        assert_eq!(table.resolve("LOOP"), None);
        assert_eq!(table.resolve("DANGLING"), None);
        assert_eq!(table.resolve("MISSING"), None);
    }

    #[test]
    fn test_namespace_merge_and_descend() {
        let mut ns = Namespace::default();
        ns.descend(&["a", "b"]).members.insert("f".to_string(), "b_f".to_string());

        let mut other = Namespace::default();
        other.descend(&["a", "b"]).members.insert("f".to_string(), "other".to_string());
        other.descend(&["a", "c"]).members.insert("g".to_string(), "c_g".to_string());
        ns.merge(other);

        assert_eq!(ns.children["a"].children["b"].members["f"], "b_f");
        assert_eq!(ns.children["a"].children["c"].members["g"], "c_g");
    }

    #[test]
    fn test_module_binding() {
        let decl = ImportDecl {
            statement: 0,
            line: 1,
            level: 0,
            module: "library.features.util".to_string(),
            names: ImportNames::Module {
                alias: None,
            },
        };
        assert_eq!(decl.module_binding(), Some("library"));
    }
}
