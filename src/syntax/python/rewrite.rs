//! Token-level rewriting passes.
//!
//! Rewrites never re-print the syntax tree: they replace the text of individual tokens
//! and clear tokens that disappear, so everything around an edit stays byte-identical.

use anyhow::Result;
use std::collections::HashSet;

use super::lexer::{Token, TokenKind};
use super::module::{LineKind, PyModule, PyStatementKind, is_keyword};
use super::scope::{self, Occurrence};
use crate::core::WeaveError;
use crate::syntax::{ConstantTable, ConstantValue, Namespace, RewritePlan};

fn next_significant(tokens: &[Token], from: usize, end: usize) -> Option<usize> {
    (from..end).find(|&i| tokens[i].is_significant())
}

/// Apply renames and collapse namespace accesses in every statement still present.
pub(crate) fn apply_plan(module: &mut PyModule, plan: &RewritePlan) -> Result<()> {
    if plan.is_empty() {
        return Ok(());
    }

    let mut edits: Vec<(usize, String)> = Vec::new();
    for s in 0..module.statements.len() {
        if module.statements[s].removed {
            continue;
        }
        let end = module.statements[s].tokens.end;
        for index in annotation_tokens(module, s) {
            let token = &module.tokens[index];
            if token.kind != TokenKind::Str {
                continue;
            }
            if let Some((quote, name)) = quoted_name(&token.text)
                && let Some(target) = plan.renames.get(name)
            {
                edits.push((index, format!("{quote}{target}{quote}")));
            }
        }
        for (index, occurrence) in scope::analyze(module, s) {
            if occurrence != Occurrence::Module {
                continue;
            }
            let name = module.text(index);
            if let Some(target) = plan.renames.get(name) {
                edits.push((index, target.clone()));
            } else if let Some(namespace) = plan.namespaces.get(name) {
                let (last, target) = collapse_chain(module, index, end, namespace)?;
                edits.push((index, target));
                edits.extend((index + 1..=last).map(|i| (i, String::new())));
            }
        }
    }

    tracing::trace!("Applying {} token edits to {}", edits.len(), module.path);
    for (index, text) in edits {
        module.tokens[index].text = text;
    }
    Ok(())
}

/// Replace `names` with `replacement` wherever they appear in a type annotation.
///
/// Covers parameter, return and variable annotations; attribute names (`x.Vault`) are
/// left alone. Returns the number of tokens replaced.
pub(crate) fn replace_annotation_names(
    module: &mut PyModule,
    names: &HashSet<String>,
    replacement: &str,
) -> usize {
    let mut edits = Vec::new();
    for s in 0..module.statements.len() {
        if module.statements[s].removed {
            continue;
        }
        for index in annotation_tokens(module, s) {
            let tokens = &module.tokens;
            let is_attribute = (0..index)
                .rev()
                .find(|&i| tokens[i].is_significant())
                .is_some_and(|i| tokens[i].is_op("."));
            if tokens[index].kind == TokenKind::Name
                && names.contains(&tokens[index].text)
                && !is_attribute
            {
                edits.push(index);
            }
        }
    }
    for &index in &edits {
        module.tokens[index].text = replacement.to_string();
    }
    edits.len()
}

/// Significant tokens inside the type annotations of statement `stmt`.
fn annotation_tokens(module: &PyModule, stmt: usize) -> Vec<usize> {
    let tokens = &module.tokens;
    let mut found = Vec::new();

    for line in module.statements[stmt].lines.iter().filter(|l| l.kind == LineKind::Code) {
        let sig = module.significant(line.tokens.clone());
        let Some(&first) = sig.first() else {
            continue;
        };
        let is_def = tokens[first].is_name("def")
            || (tokens[first].is_name("async") && sig.get(1).is_some_and(|&i| tokens[i].is_name("def")));

        if is_def {
            let mut depth = 0usize;
            let mut in_annotation = false;
            for &i in &sig {
                let token = &tokens[i];
                if token.kind == TokenKind::Op {
                    match token.text.as_str() {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                in_annotation = false;
                            }
                        }
                        ":" if depth == 0 => break,
                        ":" if depth == 1 => in_annotation = true,
                        "," | "=" if depth == 1 => in_annotation = false,
                        "->" if depth == 0 => in_annotation = true,
                        _ => {}
                    }
                    continue;
                }
                if in_annotation {
                    found.push(i);
                }
            }
            continue;
        }

        // `name: T = value`
        let annotated = tokens[first].kind == TokenKind::Name
            && !is_keyword(&tokens[first].text)
            && sig.get(1).is_some_and(|&i| tokens[i].is_op(":"));
        if annotated {
            found.extend(
                sig[2..]
                    .iter()
                    .copied()
                    .take_while(|&i| !tokens[i].is_op("="))
                    .filter(|&i| !tokens[i].is_op(".") && tokens[i].kind != TokenKind::Op),
            );
        }
    }
    found
}

/// Quote and name of a string literal holding a single identifier, like `"Money"`.
///
/// Annotations with anything more in the string (`"Optional[Money]"`) are not matched.
fn quoted_name(text: &str) -> Option<(char, &str)> {
    let quote = text.chars().next().filter(|&c| c == '"' || c == '\'')?;
    let inner = text.strip_prefix(quote)?.strip_suffix(quote)?;
    let mut chars = inner.chars();
    let valid = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');
    (valid && !is_keyword(inner)).then_some((quote, inner))
}

/// Follow `binding.attr[.attr...]` starting at token `start`.
///
/// Returns the last token of the chain and the name it collapses into.
fn collapse_chain(
    module: &PyModule,
    start: usize,
    end: usize,
    namespace: &Namespace,
) -> Result<(usize, String)> {
    let tokens = &module.tokens;
    let mut path = tokens[start].text.clone();
    let mut namespace = namespace;
    let mut pos = start;

    loop {
        let attr = next_significant(tokens, pos + 1, end)
            .filter(|&i| tokens[i].is_op("."))
            .and_then(|dot| next_significant(tokens, dot + 1, end))
            .filter(|&i| tokens[i].kind == TokenKind::Name);
        let Some(attr) = attr else {
            return Err(unresolved(module, path, "module used as a value"));
        };

        let name = &tokens[attr].text;
        path = format!("{path}.{name}");
        let followed_by_dot =
            next_significant(tokens, attr + 1, end).is_some_and(|i| tokens[i].is_op("."));

        match (namespace.children.get(name), namespace.members.get(name)) {
            (Some(child), _) if followed_by_dot => {
                namespace = child;
                pos = attr;
            }
            (_, Some(target)) => return Ok((attr, target.clone())),
            (Some(_), None) => return Err(unresolved(module, path, "module used as a value")),
            (None, None) => return Err(unresolved(module, path, "not defined by the fragment")),
        }
    }
}

fn unresolved(module: &PyModule, name: String, reason: &str) -> anyhow::Error {
    tracing::debug!("Cannot resolve {} in {}: {}", name, module.path, reason);
    WeaveError::UnresolvedSymbol {
        name,
        fragment: module.path.clone(),
    }
    .into()
}

fn source_text(tokens: &[Token], first: usize, last: usize) -> String {
    tokens[first..=last].iter().map(|t| t.text.as_str()).collect::<String>().trim().to_string()
}

/// Module-level constants assigned a literal, another name, or a list/tuple display.
pub(crate) fn collect_constants(module: &PyModule) -> ConstantTable {
    let mut table = ConstantTable::new();
    for statement in module.statements.iter().filter(|s| !s.removed) {
        let PyStatementKind::Assign {
            targets,
            value: Some(value),
        } = &statement.kind
        else {
            continue;
        };
        if targets.iter().any(|t| t.len() != 1) {
            continue;
        }
        let Some(value) = constant_value(&module.tokens, value) else {
            continue;
        };
        for target in targets {
            table.insert(module.text(target[0]), value.clone());
        }
    }
    table
}

fn constant_value(tokens: &[Token], value: &[usize]) -> Option<ConstantValue> {
    match value {
        [single] => {
            let token = &tokens[*single];
            match token.kind {
                TokenKind::Str | TokenKind::Number => Some(ConstantValue::Literal(token.text.clone())),
                TokenKind::Name if matches!(token.text.as_str(), "True" | "False" | "None") => {
                    Some(ConstantValue::Literal(token.text.clone()))
                }
                TokenKind::Name if !super::module::is_keyword(&token.text) => {
                    Some(ConstantValue::Alias(token.text.clone()))
                }
                _ => None,
            }
        }
        [sign, number] if tokens[*sign].is_op("-") && tokens[*number].kind == TokenKind::Number => {
            Some(ConstantValue::Literal(format!("-{}", tokens[*number].text)))
        }
        [first, .., last] => sequence_value(tokens, value, *first, *last),
        [] => None,
    }
}

fn sequence_value(tokens: &[Token], value: &[usize], first: usize, last: usize) -> Option<ConstantValue> {
    let (open, close) = (&tokens[first], &tokens[last]);
    let brackets = (open.is_op("[") && close.is_op("]")) || (open.is_op("(") && close.is_op(")"));
    if !brackets {
        return None;
    }

    let inner = &value[1..value.len() - 1];
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut item_start: Option<usize> = None;
    let mut item_end = 0;

    for &i in inner {
        let token = &tokens[i];
        if token.kind == TokenKind::Op {
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    // The display closes before its last token: not a single sequence
                    if depth == 0 {
                        return None;
                    }
                    depth -= 1;
                }
                "," if depth == 0 => {
                    if let Some(start) = item_start.take() {
                        items.push(source_text(tokens, start, item_end));
                    }
                    continue;
                }
                _ => {}
            }
        }
        item_start.get_or_insert(i);
        item_end = i;
    }
    if let Some(start) = item_start {
        items.push(source_text(tokens, start, item_end));
    }

    Some(ConstantValue::Sequence {
        open: open.text.clone(),
        close: close.text.clone(),
        items,
    })
}

/// Replace constant references inside calls to `call_sites`.
pub(crate) fn substitute_literals(
    module: &mut PyModule,
    constants: &ConstantTable,
    call_sites: &[String],
) -> usize {
    let mut edits: Vec<(usize, String)> = Vec::new();
    let mut substitutions = 0;

    for s in 0..module.statements.len() {
        if module.statements[s].removed {
            continue;
        }
        let module_names: HashSet<usize> = scope::analyze(module, s)
            .into_iter()
            .filter(|&(_, occurrence)| occurrence == Occurrence::Module)
            .map(|(index, _)| index)
            .collect();
        let sig = module.significant(module.statements[s].tokens.clone());
        let tokens = &module.tokens;

        let mut p = 0;
        while p < sig.len() {
            let is_call_site = module_names.contains(&sig[p])
                && call_sites.iter().any(|c| *c == tokens[sig[p]].text)
                && sig.get(p + 1).is_some_and(|&i| tokens[i].is_op("("));
            if !is_call_site {
                p += 1;
                continue;
            }
            let close = matching_close(tokens, &sig, p + 1);
            substitutions += substitute_arguments(
                tokens,
                &sig[p + 2..close],
                &module_names,
                constants,
                &mut edits,
            );
            p = close + 1;
        }
    }

    for (index, text) in edits {
        module.tokens[index].text = text;
    }
    if substitutions > 0 {
        tracing::debug!("Substituted {} constant(s) in {}", substitutions, module.path);
    }
    substitutions
}

/// Position in `sig` of the bracket closing the one at `open`, or the end of `sig`.
fn matching_close(tokens: &[Token], sig: &[usize], open: usize) -> usize {
    let mut depth = 0usize;
    for (p, &i) in sig.iter().enumerate().skip(open) {
        let token = &tokens[i];
        if token.kind != TokenKind::Op {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth -= 1;
                if depth == 0 {
                    return p;
                }
            }
            _ => {}
        }
    }
    sig.len()
}

fn substitute_arguments(
    tokens: &[Token],
    args: &[usize],
    module_names: &HashSet<usize>,
    constants: &ConstantTable,
    edits: &mut Vec<(usize, String)>,
) -> usize {
    let mut substitutions = 0;
    let at = |q: Option<usize>| q.and_then(|q| args.get(q)).map(|&i| &tokens[i]);

    for (q, &index) in args.iter().enumerate() {
        if !module_names.contains(&index) {
            continue;
        }
        let name = tokens[index].text.as_str();
        let prev = at(q.checked_sub(1));
        let next = at(Some(q + 1));
        if next.is_some_and(|t| t.is_op("(") || t.is_op(".")) {
            continue;
        }

        if prev.is_some_and(|t| t.is_op("*")) {
            let in_display = at(q.checked_sub(2)).is_some_and(|t| t.is_op("[") || t.is_op(","));
            if let (true, Some(ConstantValue::Sequence { items, .. })) =
                (in_display, constants.resolve(name))
            {
                let expanded: Vec<String> = items
                    .iter()
                    .map(|item| constants.literal(item).map_or_else(|| item.clone(), str::to_string))
                    .collect();
                edits.push((args[q - 1], String::new()));
                if expanded.is_empty() {
                    edits.push((index, String::new()));
                    if next.is_some_and(|t| t.is_op(",")) {
                        edits.push((args[q + 1], String::new()));
                    }
                } else {
                    edits.push((index, expanded.join(", ")));
                }
                substitutions += 1;
            }
            continue;
        }
        if prev.is_some_and(|t| t.is_op("**")) {
            continue;
        }

        if let Some(literal) = constants.literal(name) {
            edits.push((index, literal.to_string()));
            substitutions += 1;
        }
    }
    substitutions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::python::module::parse_module;

    fn rewritten(source: &str, plan: &RewritePlan) -> String {
        let mut module = parse_module("t.py", source).unwrap();
        apply_plan(&mut module, plan).unwrap();
        module.render()
    }

    fn renames(pairs: &[(&str, &str)]) -> RewritePlan {
        RewritePlan {
            renames: pairs.iter().map(|(a, b)| ((*a).to_string(), (*b).to_string())).collect(),
            ..RewritePlan::default()
        }
    }

    #[test]
    fn test_rename_definitions_and_uses() {
        let source = "RATE = 1  # keep\n\ndef doit(x, RATE=RATE):\n    return x * RATE + helper(RATE)\n\ndef helper(v):\n    return v.RATE\n";
        let plan = renames(&[("RATE", "util_RATE"), ("doit", "util_doit"), ("helper", "util_helper")]);
        assert_eq!(
            rewritten(source, &plan),
            "util_RATE = 1  # keep\n\ndef util_doit(x, RATE=util_RATE):\n    return x * RATE + util_helper(RATE)\n\ndef util_helper(v):\n    return v.RATE\n"
        );
    }

    #[test]
    fn test_namespace_collapse() {
        let mut namespace = Namespace::default();
        namespace.members.insert("doit".to_string(), "util_doit".to_string());
        namespace
            .descend(&["inner"])
            .members
            .insert("VALUE".to_string(), "inner_VALUE".to_string());
        let plan = RewritePlan {
            namespaces: [("utils".to_string(), namespace)].into_iter().collect(),
            ..RewritePlan::default()
        };

        let result = rewritten(
            "x = utils.doit(utils . inner.VALUE)\ny = f\"{utils.doit()}\"\n",
            &plan,
        );
        assert_eq!(result, "x = util_doit(inner_VALUE)\ny = f\"{util_doit()}\"\n");
    }

    #[test]
    fn test_string_annotations_follow_renames() {
        let plan = renames(&[("Money", "util_Money")]);
        let result = rewritten(
            "def f(a: \"Money\", b: 'Money' = None) -> \"Money\":\n    note = \"Money\"\n    return a\n\n\nTOTAL: \"Money\" = f(1)\nLABEL: \"Optional[Money]\" = None\n",
            &plan,
        );
        assert_eq!(
            result,
            "def f(a: \"util_Money\", b: 'util_Money' = None) -> \"util_Money\":\n    note = \"Money\"\n    return a\n\n\nTOTAL: \"util_Money\" = f(1)\nLABEL: \"Optional[Money]\" = None\n"
        );
    }

    #[test]
    fn test_replace_annotation_names() {
        let source = "\
class Hooks:
    def run(self, vault: Vault, others: list[Vault] | None = None, *, sup: api.Vault = None) -> Vault:
        checked: Vault = vault
        return Vault(checked)
";
        let mut module = parse_module("t.py", source).unwrap();
        let names: HashSet<String> = ["Vault".to_string()].into_iter().collect();
        assert_eq!(replace_annotation_names(&mut module, &names, "Any"), 4);
        assert_eq!(
            module.render(),
            "\
class Hooks:
    def run(self, vault: Any, others: list[Any] | None = None, *, sup: api.Vault = None) -> Any:
        checked: Any = vault
        return Vault(checked)
"
        );
    }

    #[test]
    fn test_namespace_missing_attribute() {
        let plan = RewritePlan {
            namespaces: [("utils".to_string(), Namespace::default())].into_iter().collect(),
            ..RewritePlan::default()
        };
        let mut module = parse_module("t.py", "x = utils.missing()\n").unwrap();
        let err = apply_plan(&mut module, &plan).unwrap_err();
        match err.downcast_ref::<WeaveError>() {
            Some(WeaveError::UnresolvedSymbol {
                name,
                fragment,
            }) => {
                assert_eq!(name, "utils.missing");
                assert_eq!(fragment, "t.py");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_constants() {
        let module = parse_module(
            "t.py",
            "A = 'x'\nB = A\nC: int = -5\nD = [A, \"y\",\n     'z']\nE = compute()\nF = G = True\nobj.x = 1\n",
        )
        .unwrap();
        let table = collect_constants(&module);
        assert_eq!(table.literal("B"), Some("'x'"));
        assert_eq!(table.literal("C"), Some("-5"));
        assert_eq!(table.literal("G"), Some("True"));
        assert!(table.resolve("E").is_none());
        match table.resolve("D") {
            Some(ConstantValue::Sequence {
                items,
                ..
            }) => assert_eq!(items, &vec!["A".to_string(), "\"y\"".to_string(), "'z'".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_substitute_in_call_sites() {
        let source = "\
EVENT = 'ACCRUE'
ALIAS = EVENT
PARAMS = [ALIAS, 'rate']
EMPTY = []

@requires(event_type=ALIAS, parameters=[*PARAMS, *EMPTY, 'other'], flags={EVENT: [EVENT]})
def scheduled(vault, EVENT=EVENT):
    return other(EVENT)
";
        let mut module = parse_module("t.py", source).unwrap();
        let table = collect_constants(&module);
        let count = substitute_literals(&mut module, &table, &["requires".to_string()]);
        assert_eq!(count, 5);
        let rendered = module.render();
        assert!(rendered.contains(
            "@requires(event_type='ACCRUE', parameters=['ACCRUE', 'rate',  'other'], flags={'ACCRUE': ['ACCRUE']})"
        ));
        assert!(rendered.contains("def scheduled(vault, EVENT=EVENT):\n    return other(EVENT)\n"));
    }

    #[test]
    fn test_non_call_site_untouched() {
        let mut module = parse_module("t.py", "A = 1\nx = other(A)\n").unwrap();
        let table = collect_constants(&module);
        assert_eq!(substitute_literals(&mut module, &table, &["requires".to_string()]), 0);
        assert_eq!(module.render(), "A = 1\nx = other(A)\n");
    }
}
