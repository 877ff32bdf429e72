//! Name resolution for a single top-level statement.
//!
//! Every identifier in a statement is classified as a reference to a module-level
//! binding, a local of some function/class/lambda scope, or a name that is not a
//! variable reference at all (attribute, keyword argument, parameter declaration).
//! Only module-level references take part in renaming.
//!
//! Scopes are recovered from indentation: a `def` or `class` line opens a scope that
//! covers every following line indented deeper than it. Lambdas open a scope that ends
//! at the next `,` or closing bracket at their own nesting depth.

use std::collections::{BTreeSet, HashSet};

use super::lexer::{Token, TokenKind};
use super::module::{LineKind, PyModule, is_augmented_op, is_keyword, target_names};

/// How an identifier token is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Occurrence {
    /// Resolves to a module-level binding
    Module,
    /// Resolves to a function, class or lambda local
    Local,
    /// Follows a `.`
    Attribute,
    /// Keyword argument name in a call
    Keyword,
    /// Parameter declaration
    Parameter,
}

#[derive(Debug, Default)]
struct Scope {
    parent: usize,
    is_class: bool,
    locals: HashSet<String>,
    globals: HashSet<String>,
    nonlocals: HashSet<String>,
}

enum Pending {
    Resolve(usize),
    Fixed(Occurrence),
}

/// Classify every identifier of statement `stmt`, in token order.
pub(crate) fn analyze(module: &PyModule, stmt: usize) -> Vec<(usize, Occurrence)> {
    analyze_scopes(module, stmt).0
}

/// Names statement `stmt` binds in the module namespace, sorted.
///
/// Covers bindings nested in compound statements (`if`, `for`, `try`, `with`) but not
/// names bound by imports or by comprehension targets.
pub(crate) fn module_bindings(module: &PyModule, stmt: usize) -> Vec<String> {
    let (_, scopes) = analyze_scopes(module, stmt);
    let mut names: Vec<String> = scopes[0].locals.iter().cloned().collect();
    names.sort();
    names
}

fn analyze_scopes(module: &PyModule, stmt: usize) -> (Vec<(usize, Occurrence)>, Vec<Scope>) {
    let statement = &module.statements[stmt];
    let tokens = &module.tokens;
    let mut scopes = vec![Scope::default()];
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut pending: Vec<(usize, Pending)> = Vec::new();

    for line in statement.lines.iter().filter(|l| l.kind == LineKind::Code) {
        while stack.last().is_some_and(|&(indent, _)| line.indent <= indent) {
            stack.pop();
        }
        let current = stack.last().map_or(0, |&(_, scope)| scope);
        let sig = module.significant(line.tokens.clone());
        analyze_line(tokens, &sig, current, line.indent, &mut scopes, &mut stack, &mut pending);
    }

    let occurrences = pending
        .into_iter()
        .map(|(index, p)| {
            let occurrence = match p {
                Pending::Fixed(occurrence) => occurrence,
                Pending::Resolve(scope) => resolve(&scopes, scope, &tokens[index].text),
            };
            (index, occurrence)
        })
        .collect();
    (occurrences, scopes)
}

/// Names referenced at module level by statement `stmt`.
pub(crate) fn module_references(module: &PyModule, stmt: usize) -> BTreeSet<String> {
    analyze(module, stmt)
        .into_iter()
        .filter(|&(_, occurrence)| occurrence == Occurrence::Module)
        .map(|(index, _)| module.text(index).to_string())
        .collect()
}

fn resolve(scopes: &[Scope], origin: usize, name: &str) -> Occurrence {
    let mut s = origin;
    loop {
        if s == 0 {
            return Occurrence::Module;
        }
        let scope = &scopes[s];
        if scope.globals.contains(name) {
            return Occurrence::Module;
        }
        if !scope.nonlocals.contains(name)
            && (s == origin || !scope.is_class)
            && scope.locals.contains(name)
        {
            return Occurrence::Local;
        }
        s = scope.parent;
    }
}

/// Record `name` as bound in `scope`; scope 0 collects module-level bindings.
fn bind(scopes: &mut [Scope], scope: usize, name: &str) {
    scopes[scope].locals.insert(name.to_string());
}

/// Import bindings stay out of the module-level set.
fn bind_import(scopes: &mut [Scope], scope: usize, name: &str) {
    if scope != 0 {
        bind(scopes, scope, name);
    }
}

fn is_identifier(token: &Token) -> bool {
    token.kind == TokenKind::Name && !is_keyword(&token.text)
}

fn new_scope(scopes: &mut Vec<Scope>, parent: usize, is_class: bool) -> usize {
    scopes.push(Scope {
        parent,
        is_class,
        ..Scope::default()
    });
    scopes.len() - 1
}

#[allow(clippy::too_many_lines)]
fn analyze_line(
    tokens: &[Token],
    sig: &[usize],
    current: usize,
    indent: usize,
    scopes: &mut Vec<Scope>,
    stack: &mut Vec<(usize, usize)>,
    pending: &mut Vec<(usize, Pending)>,
) {
    if sig.is_empty() {
        return;
    }
    let tok = |p: usize| &tokens[sig[p]];

    // Definition headers: scope of the body, position of the header colon, parameters
    let is_async_def = tok(0).is_name("async") && sig.len() > 1 && tok(1).is_name("def");
    let is_def = tok(0).is_name("def") || is_async_def;
    let is_class = tok(0).is_name("class");
    let mut header_colon = None;
    let mut body_scope = current;
    let mut parameters: HashSet<usize> = HashSet::new();

    if is_def || is_class {
        let name_pos = if is_async_def { 2 } else { 1 };
        if name_pos < sig.len() && is_identifier(tok(name_pos)) {
            bind(scopes, current, &tok(name_pos).text);
        }
        body_scope = new_scope(scopes, current, is_class);
        stack.push((indent, body_scope));

        let mut depth = 0usize;
        for p in name_pos + 1..sig.len() {
            let t = tok(p);
            if t.kind == TokenKind::Op {
                match t.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    ":" if depth == 0 => {
                        header_colon = Some(p);
                        break;
                    }
                    _ => {}
                }
            }
            if is_def && depth == 1 && is_identifier(t) {
                let prev = tok(p - 1);
                let next = sig.get(p + 1).map(|&i| &tokens[i]);
                let after_separator = ["(", ",", "*", "**"].iter().any(|op| prev.is_op(op));
                let before_terminator =
                    next.is_some_and(|n| [",", ":", "=", ")"].iter().any(|op| n.is_op(op)));
                if after_separator && before_terminator {
                    parameters.insert(p);
                    bind(scopes, body_scope, &t.text);
                }
            }
        }
    }

    let scope_at = |p: usize| match header_colon {
        Some(colon) if p > colon => body_scope,
        _ => current,
    };

    // Statement-level bindings
    let body_start = header_colon.map_or(0, |c| c + 1);
    let body = &sig[body_start..];
    let statement_scope = if header_colon.is_some() { body_scope } else { current };
    collect_statement_bindings(tokens, body, statement_scope, scopes);

    // Names in an import are module paths or new bindings, never references
    if tok(0).is_name("import") || tok(0).is_name("from") {
        for &i in sig {
            if is_identifier(&tokens[i]) {
                pending.push((i, Pending::Fixed(Occurrence::Local)));
            }
        }
        return;
    }

    // Per-token classification with lambda scopes and call-bracket tracking
    let mut brackets: Vec<bool> = Vec::new();
    let mut lambdas: Vec<(usize, usize, bool)> = Vec::new();
    let mut for_target: Option<usize> = None;

    for p in 0..sig.len() {
        let t = tok(p);
        let depth = brackets.len();

        if t.kind == TokenKind::Op {
            match t.text.as_str() {
                "(" | "[" | "{" => {
                    let is_call = t.text == "("
                        && p > 0
                        && (is_identifier(tok(p - 1))
                            || tok(p - 1).is_op(")")
                            || tok(p - 1).is_op("]"));
                    brackets.push(is_call);
                }
                ")" | "]" | "}" => {
                    brackets.pop();
                    while lambdas.last().is_some_and(|&(d, _, _)| brackets.len() < d) {
                        lambdas.pop();
                    }
                }
                "," => {
                    while lambdas.last().is_some_and(|&(d, _, params)| d == depth && !params) {
                        lambdas.pop();
                    }
                }
                ":" => {
                    if let Some(top) = lambdas.last_mut()
                        && top.0 == depth
                        && top.2
                    {
                        top.2 = false;
                    }
                }
                _ => {}
            }
            continue;
        }

        let base_scope = scope_at(p);
        let scope = lambdas.iter().rev().find(|l| !l.2).map_or(base_scope, |l| l.1);

        if t.is_name("lambda") {
            let parent = lambdas.last().map_or(base_scope, |l| l.1);
            let lambda_scope = new_scope(scopes, parent, false);
            lambdas.push((depth, lambda_scope, true));
            continue;
        }
        if t.is_name("for") {
            for_target = Some(depth);
            continue;
        }
        if t.is_name("in") && for_target == Some(depth) {
            for_target = None;
            continue;
        }
        if !is_identifier(t) {
            continue;
        }

        let prev = (p > 0).then(|| tok(p - 1));
        let next = sig.get(p + 1).map(|&i| &tokens[i]);

        if prev.is_some_and(|t| t.is_op(".")) {
            pending.push((sig[p], Pending::Fixed(Occurrence::Attribute)));
            continue;
        }
        if parameters.contains(&p) {
            pending.push((sig[p], Pending::Fixed(Occurrence::Parameter)));
            continue;
        }
        if let Some(&(d, lambda_scope, true)) = lambdas.last()
            && d == depth
            && prev.is_some_and(|t| ["lambda", ",", "*", "**"].iter().any(|k| t.text == *k))
        {
            scopes[lambda_scope].locals.insert(t.text.clone());
            pending.push((sig[p], Pending::Fixed(Occurrence::Parameter)));
            continue;
        }
        if next.is_some_and(|n| n.is_op("=")) && brackets.last() == Some(&true) {
            pending.push((sig[p], Pending::Fixed(Occurrence::Keyword)));
            continue;
        }

        if next.is_some_and(|n| n.is_op(":=")) {
            bind(scopes, scope, &t.text);
        }
        if let Some(target_depth) = for_target
            && !next.is_some_and(|n| n.is_op(".") || n.is_op("[") || n.is_op("("))
            && (scope != 0 || target_depth == 0)
        {
            bind(scopes, scope, &t.text);
        }
        if prev.is_some_and(|t| t.is_name("as")) {
            bind(scopes, scope, &t.text);
        }

        pending.push((sig[p], Pending::Resolve(scope)));
    }
}

/// Bindings introduced by the statement itself: assignment targets, imports and
/// `global`/`nonlocal` declarations.
fn collect_statement_bindings(tokens: &[Token], body: &[usize], scope: usize, scopes: &mut [Scope]) {
    let Some(&first) = body.first() else {
        return;
    };
    let first = &tokens[first];

    if first.is_name("global") || first.is_name("nonlocal") {
        let names = body[1..].iter().map(|&i| &tokens[i]).filter(|t| is_identifier(t));
        for name in names {
            if scope != 0 {
                let set = if first.is_name("global") {
                    &mut scopes[scope].globals
                } else {
                    &mut scopes[scope].nonlocals
                };
                set.insert(name.text.clone());
            }
        }
        return;
    }

    if first.is_name("import") {
        let mut expect_name = true;
        let mut pos = 1;
        while pos < body.len() {
            let t = &tokens[body[pos]];
            if expect_name && is_identifier(t) {
                let alias = body.get(pos + 1).is_some_and(|&i| tokens[i].is_name("as"));
                if !alias {
                    bind_import(scopes, scope, &t.text);
                }
                expect_name = false;
            } else if is_identifier(t) && tokens[body[pos - 1]].is_name("as") {
                bind_import(scopes, scope, &t.text);
            } else if t.is_op(",") {
                expect_name = true;
            }
            pos += 1;
        }
        return;
    }

    if first.is_name("from") {
        if let Some(import_pos) = body.iter().position(|&i| tokens[i].is_name("import")) {
            let names = &body[import_pos + 1..];
            for (p, &i) in names.iter().enumerate() {
                let t = &tokens[i];
                let aliased = names.get(p + 1).is_some_and(|&j| tokens[j].is_name("as"));
                if is_identifier(t) && !aliased {
                    bind_import(scopes, scope, &t.text);
                }
            }
        }
        return;
    }

    if is_keyword(&first.text) {
        return;
    }

    // Annotated name
    if is_identifier(first) && body.get(1).is_some_and(|&i| tokens[i].is_op(":")) {
        bind(scopes, scope, &first.text);
        return;
    }

    let mut segment = Vec::new();
    let mut depth = 0usize;
    for &i in body {
        let t = &tokens[i];
        if depth == 0 && t.is_name("lambda") {
            break;
        }
        if t.kind == TokenKind::Op {
            match t.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                "=" if depth == 0 => {
                    if let Some(names) = target_names(tokens, &segment) {
                        for name in names {
                            bind(scopes, scope, &tokens[name].text);
                        }
                    }
                    segment.clear();
                    continue;
                }
                _ if depth == 0 && is_augmented_op(t) => {
                    if let Some(names) = target_names(tokens, &segment) {
                        for name in names {
                            bind(scopes, scope, &tokens[name].text);
                        }
                    }
                    return;
                }
                _ => {}
            }
        }
        segment.push(i);
    }
}
