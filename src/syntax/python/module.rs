//! Statement model for a tokenized fragment.
//!
//! A module is a flat token list plus the top-level statements that partition it.
//! Each statement records the logical lines it spans so later passes can recover
//! nesting from indentation without a full syntax tree.

use std::ops::Range;

use super::lexer::{LexError, Token, TokenKind, tokenize};

pub(crate) const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

const CLAUSE_KEYWORDS: &[&str] = &["else", "elif", "except", "finally"];

const AUGMENTED_OPS: &[&str] =
    &["+=", "-=", "*=", "/=", "//=", "%=", "**=", ">>=", "<<=", "&=", "|=", "^=", "@="];

pub(crate) fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

pub(crate) fn is_augmented_op(token: &Token) -> bool {
    token.kind == TokenKind::Op && AUGMENTED_OPS.contains(&token.text.as_str())
}

/// One logical line: a run of tokens ending at a newline outside brackets.
#[derive(Debug, Clone)]
pub(crate) struct LogicalLine {
    pub(crate) tokens: Range<usize>,
    /// Indentation width with tabs expanded to multiples of eight
    pub(crate) indent: usize,
    pub(crate) kind: LineKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineKind {
    Code,
    Comment,
    Blank,
}

/// A name imported by `from m import name as alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FromName {
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
}

/// Syntactic category of a top-level statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PyStatementKind {
    /// Blank lines and comments only
    Trivia,
    /// `import a.b as c, d`
    Import(Vec<(String, Option<String>)>),
    /// `from ..a import b as c`
    FromImport {
        level: usize,
        module: String,
        names: Vec<FromName>,
    },
    /// Function definition; the index is the name token
    FunctionDef(usize),
    /// Class definition; the index is the name token
    ClassDef(usize),
    /// Assignment or annotated declaration
    Assign {
        /// Name tokens of each target segment, left to right
        targets: Vec<Vec<usize>>,
        /// Significant tokens of the assigned value
        value: Option<Vec<usize>>,
    },
    /// Any other statement
    Other,
}

#[derive(Debug, Clone)]
pub(crate) struct Statement {
    pub(crate) tokens: Range<usize>,
    pub(crate) lines: Vec<LogicalLine>,
    pub(crate) kind: PyStatementKind,
    /// Line of the first code token
    pub(crate) line: usize,
    pub(crate) removed: bool,
}

/// A parsed fragment.
#[derive(Debug, Clone)]
pub struct PyModule {
    pub(crate) path: String,
    pub(crate) tokens: Vec<Token>,
    pub(crate) statements: Vec<Statement>,
}

impl PyModule {
    /// Display path the module was parsed from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of top-level statements, including trivia.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub(crate) fn text(&self, index: usize) -> &str {
        &self.tokens[index].text
    }

    /// Significant token indices of a logical line.
    pub(crate) fn significant(&self, range: Range<usize>) -> Vec<usize> {
        range.filter(|&i| self.tokens[i].is_significant()).collect()
    }

    /// Concatenated text of the statements still present.
    pub(crate) fn render(&self) -> String {
        self.statements
            .iter()
            .filter(|s| !s.removed)
            .flat_map(|s| s.tokens.clone())
            .map(|i| self.tokens[i].text.as_str())
            .collect()
    }
}

/// Parse `source` into a [`PyModule`].
pub(crate) fn parse_module(path: &str, source: &str) -> Result<PyModule, LexError> {
    let tokens = tokenize(source)?;
    let lines = split_lines(&tokens)?;
    let mut statements = Vec::new();

    for group in group_statements(&tokens, lines)? {
        let kind = classify(&tokens, &group)?;
        let line = group
            .iter()
            .find(|l| l.kind == LineKind::Code)
            .map_or_else(|| tokens[group[0].tokens.start].line, |l| tokens[l.tokens.start].line);
        let start = group[0].tokens.start;
        let end = group[group.len() - 1].tokens.end;
        statements.push(Statement {
            tokens: start..end,
            lines: group,
            kind,
            line,
            removed: false,
        });
    }

    Ok(PyModule {
        path: path.to_string(),
        tokens,
        statements,
    })
}

fn split_lines(tokens: &[Token]) -> Result<Vec<LogicalLine>, LexError> {
    let mut lines = Vec::new();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Op => match token.text.as_str() {
                "(" | "[" | "{" => {
                    brackets.push((token.text.chars().next().unwrap_or('('), token.line));
                }
                ")" | "]" | "}" => {
                    let expected = match token.text.as_str() {
                        ")" => '(',
                        "]" => '[',
                        _ => '{',
                    };
                    match brackets.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => {
                            return Err(LexError {
                                line: token.line,
                                reason: format!("unmatched '{}'", token.text),
                            });
                        }
                    }
                }
                _ => {}
            },
            TokenKind::Newline if brackets.is_empty() => {
                lines.push(make_line(tokens, start..i + 1));
                start = i + 1;
            }
            _ => {}
        }
    }

    if let Some((open, line)) = brackets.first() {
        return Err(LexError {
            line: *line,
            reason: format!("'{open}' was never closed"),
        });
    }
    if start < tokens.len() {
        lines.push(make_line(tokens, start..tokens.len()));
    }
    Ok(lines)
}

fn make_line(tokens: &[Token], range: Range<usize>) -> LogicalLine {
    let first = &tokens[range.start];
    let indent = if first.kind == TokenKind::Space {
        first.text.chars().fold(0, |width, c| if c == '\t' { (width / 8 + 1) * 8 } else { width + 1 })
    } else {
        0
    };
    let kind = if tokens[range.clone()].iter().any(Token::is_significant) {
        LineKind::Code
    } else if tokens[range.clone()].iter().any(|t| t.kind == TokenKind::Comment) {
        LineKind::Comment
    } else {
        LineKind::Blank
    };
    LogicalLine {
        tokens: range,
        indent,
        kind,
    }
}

fn first_significant<'t>(tokens: &'t [Token], line: &LogicalLine) -> Option<&'t Token> {
    tokens[line.tokens.clone()].iter().find(|t| t.is_significant())
}

/// Group logical lines into top-level statements.
///
/// Indented lines and `else`/`elif`/`except`/`finally` clauses join the statement above;
/// decorators join the definition below. Comment lines directly above a statement (no
/// blank line in between) belong to it; other trivia forms statements of its own.
fn group_statements(
    tokens: &[Token],
    lines: Vec<LogicalLine>,
) -> Result<Vec<Vec<LogicalLine>>, LexError> {
    let mut groups: Vec<Vec<LogicalLine>> = Vec::new();
    let mut current: Option<Vec<LogicalLine>> = None;
    let mut awaiting_definition = false;
    let mut trivia: Vec<LogicalLine> = Vec::new();

    for line in lines {
        if line.kind != LineKind::Code {
            trivia.push(line);
            continue;
        }

        let first = first_significant(tokens, &line);
        let first_text = first.map_or("", |t| t.text.as_str());

        if line.indent > 0 || CLAUSE_KEYWORDS.contains(&first_text) || awaiting_definition {
            let Some(group) = current.as_mut() else {
                return Err(LexError {
                    line: tokens[line.tokens.start].line,
                    reason: "unexpected indent".to_string(),
                });
            };
            group.append(&mut trivia);
            if line.indent == 0 {
                awaiting_definition = first_text == "@";
            }
            group.push(line);
            continue;
        }

        if let Some(group) = current.take() {
            groups.push(group);
        }

        let split = trivia.iter().rposition(|l| l.kind == LineKind::Blank).map_or(0, |p| p + 1);
        let leading_comments = trivia.split_off(split);
        if !trivia.is_empty() {
            groups.push(std::mem::take(&mut trivia));
        }

        awaiting_definition = first_text == "@";
        let mut group = leading_comments;
        group.push(line);
        current = Some(group);
    }

    if let Some(group) = current {
        groups.push(group);
    }
    if !trivia.is_empty() {
        groups.push(trivia);
    }
    Ok(groups)
}

fn classify(tokens: &[Token], lines: &[LogicalLine]) -> Result<PyStatementKind, LexError> {
    let Some(head) = lines.iter().find(|l| {
        l.kind == LineKind::Code && first_significant(tokens, l).is_some_and(|t| !t.is_op("@"))
    }) else {
        return Ok(if lines.iter().all(|l| l.kind != LineKind::Code) {
            PyStatementKind::Trivia
        } else {
            PyStatementKind::Other
        });
    };

    let sig: Vec<usize> = head.tokens.clone().filter(|&i| tokens[i].is_significant()).collect();
    let line = tokens[sig[0]].line;
    let at = |p: usize| sig.get(p).map(|&i| &tokens[i]);

    match at(0).map(|t| t.text.as_str()) {
        Some("import") => parse_import(tokens, &sig[1..], line),
        Some("from") => parse_from_import(tokens, &sig[1..], line),
        Some("def") => Ok(PyStatementKind::FunctionDef(expect_name(tokens, &sig, 1, line)?)),
        Some("async") if at(1).is_some_and(|t| t.is_name("def")) => {
            Ok(PyStatementKind::FunctionDef(expect_name(tokens, &sig, 2, line)?))
        }
        Some("class") => Ok(PyStatementKind::ClassDef(expect_name(tokens, &sig, 1, line)?)),
        Some(text) if is_keyword(text) => Ok(PyStatementKind::Other),
        _ => Ok(classify_assignment(tokens, &sig)),
    }
}

fn expect_name(tokens: &[Token], sig: &[usize], pos: usize, line: usize) -> Result<usize, LexError> {
    match sig.get(pos) {
        Some(&i) if tokens[i].kind == TokenKind::Name && !is_keyword(&tokens[i].text) => Ok(i),
        _ => Err(LexError {
            line,
            reason: "expected a name after 'def' or 'class'".to_string(),
        }),
    }
}

fn import_error(line: usize, reason: &str) -> LexError {
    LexError {
        line,
        reason: format!("malformed import: {reason}"),
    }
}

/// Parse `a.b.c` starting at `pos`; returns the dotted name and the next position.
fn dotted_name(tokens: &[Token], sig: &[usize], mut pos: usize) -> Option<(String, usize)> {
    let mut parts = Vec::new();
    loop {
        let token = &tokens[*sig.get(pos)?];
        if token.kind != TokenKind::Name || is_keyword(&token.text) {
            return None;
        }
        parts.push(token.text.clone());
        pos += 1;
        if sig.get(pos).is_some_and(|&i| tokens[i].is_op(".")) {
            pos += 1;
        } else {
            return Some((parts.join("."), pos));
        }
    }
}

fn alias_at(tokens: &[Token], sig: &[usize], pos: usize, line: usize) -> Result<(Option<String>, usize), LexError> {
    if sig.get(pos).is_some_and(|&i| tokens[i].is_name("as")) {
        match sig.get(pos + 1) {
            Some(&i) if tokens[i].kind == TokenKind::Name && !is_keyword(&tokens[i].text) => {
                Ok((Some(tokens[i].text.clone()), pos + 2))
            }
            _ => Err(import_error(line, "expected a name after 'as'")),
        }
    } else {
        Ok((None, pos))
    }
}

fn parse_import(tokens: &[Token], sig: &[usize], line: usize) -> Result<PyStatementKind, LexError> {
    let mut names = Vec::new();
    let mut pos = 0;
    loop {
        let (module, next) =
            dotted_name(tokens, sig, pos).ok_or_else(|| import_error(line, "expected a module name"))?;
        let (alias, next) = alias_at(tokens, sig, next, line)?;
        names.push((module, alias));
        match sig.get(next).map(|&i| &tokens[i]) {
            None => break,
            Some(t) if t.is_op(",") => pos = next + 1,
            Some(t) if t.is_op(";") => break,
            Some(t) => return Err(import_error(line, &format!("unexpected '{}'", t.text))),
        }
    }
    Ok(PyStatementKind::Import(names))
}

fn parse_from_import(
    tokens: &[Token],
    sig: &[usize],
    line: usize,
) -> Result<PyStatementKind, LexError> {
    let mut pos = 0;
    let mut level = 0;
    while let Some(&i) = sig.get(pos) {
        match tokens[i].text.as_str() {
            "." if tokens[i].kind == TokenKind::Op => level += 1,
            "..." if tokens[i].kind == TokenKind::Op => level += 3,
            _ => break,
        }
        pos += 1;
    }

    let module = if sig.get(pos).is_some_and(|&i| tokens[i].is_name("import")) {
        String::new()
    } else {
        let (module, next) =
            dotted_name(tokens, sig, pos).ok_or_else(|| import_error(line, "expected a module name"))?;
        pos = next;
        module
    };
    if level == 0 && module.is_empty() {
        return Err(import_error(line, "expected a module name"));
    }

    if !sig.get(pos).is_some_and(|&i| tokens[i].is_name("import")) {
        return Err(import_error(line, "expected 'import'"));
    }
    pos += 1;

    let mut names = Vec::new();
    if sig.get(pos).is_some_and(|&i| tokens[i].is_op("*")) {
        names.push(FromName {
            name: "*".to_string(),
            alias: None,
        });
        return Ok(PyStatementKind::FromImport {
            level,
            module,
            names,
        });
    }

    let parenthesized = sig.get(pos).is_some_and(|&i| tokens[i].is_op("("));
    if parenthesized {
        pos += 1;
    }
    loop {
        match sig.get(pos).map(|&i| &tokens[i]) {
            Some(t) if t.is_op(")") && parenthesized => break,
            Some(t) if t.kind == TokenKind::Name && !is_keyword(&t.text) => {
                let (alias, next) = alias_at(tokens, sig, pos + 1, line)?;
                names.push(FromName {
                    name: t.text.clone(),
                    alias,
                });
                pos = next;
            }
            _ => return Err(import_error(line, "expected an imported name")),
        }
        match sig.get(pos).map(|&i| &tokens[i]) {
            Some(t) if t.is_op(",") => pos += 1,
            Some(t) if t.is_op(")") && parenthesized => break,
            None if !parenthesized => break,
            Some(t) if t.is_op(";") && !parenthesized => break,
            _ => return Err(import_error(line, "expected ',' between imported names")),
        }
    }

    Ok(PyStatementKind::FromImport {
        level,
        module,
        names,
    })
}

/// Split significant tokens at depth-0 occurrences of `=`.
fn assignment_segments(tokens: &[Token], sig: &[usize]) -> Vec<Vec<usize>> {
    let mut segments = vec![Vec::new()];
    let mut depth = 0usize;
    let mut in_lambda = false;
    for &i in sig {
        let token = &tokens[i];
        if depth == 0 && token.is_name("lambda") {
            in_lambda = true;
        }
        if token.kind == TokenKind::Op && !in_lambda {
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                "=" if depth == 0 => {
                    segments.push(Vec::new());
                    continue;
                }
                _ => {}
            }
        }
        if let Some(segment) = segments.last_mut() {
            segment.push(i);
        }
    }
    segments
}

/// Names bound by one assignment target, or `None` when the target binds no plain
/// name (attribute or subscript assignment).
pub(crate) fn target_names(tokens: &[Token], segment: &[usize]) -> Option<Vec<usize>> {
    let first = segment.first().map(|&i| &tokens[i])?;
    if first.kind == TokenKind::Name
        && segment.get(1).is_some_and(|&i| tokens[i].is_op(":"))
        && !is_keyword(&first.text)
    {
        return Some(vec![segment[0]]);
    }

    let mut names = Vec::new();
    for (p, &i) in segment.iter().enumerate() {
        let token = &tokens[i];
        match token.kind {
            TokenKind::Name if !is_keyword(&token.text) => {
                let next = segment.get(p + 1).map(|&j| &tokens[j]);
                if next.is_some_and(|t| t.is_op(".") || t.is_op("[") || t.is_op("(")) {
                    return None;
                }
                names.push(i);
            }
            TokenKind::Op if matches!(token.text.as_str(), "(" | ")" | "[" | "]" | "," | "*") => {}
            _ => return None,
        }
    }
    if names.is_empty() { None } else { Some(names) }
}

fn classify_assignment(tokens: &[Token], sig: &[usize]) -> PyStatementKind {
    let segments = assignment_segments(tokens, sig);

    if segments.len() == 1 {
        // Bare annotation: `name: type`
        let annotated = sig.len() >= 2
            && tokens[sig[0]].kind == TokenKind::Name
            && tokens[sig[1]].is_op(":");
        return if annotated {
            PyStatementKind::Assign {
                targets: vec![vec![sig[0]]],
                value: None,
            }
        } else {
            PyStatementKind::Other
        };
    }

    let (value, targets) = segments.split_last().unwrap_or((&segments[0], &[]));
    let mut names = Vec::new();
    for segment in targets {
        match target_names(tokens, segment) {
            Some(found) => names.push(found),
            None => return PyStatementKind::Other,
        }
    }

    PyStatementKind::Assign {
        targets: names,
        value: Some(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<PyStatementKind> {
        parse_module("t.py", source).unwrap().statements.into_iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_statement_grouping() {
        let source = "\
import math

# leading comment
@decorator(x=1)
def f(a,
      b):
    if a:
        return b
    else:
        return a
try:
    X = 1
except Exception:
    X = 2
finally:
    pass
class C:
    y = 1
";
        let module = parse_module("t.py", source).unwrap();
        let kinds: Vec<_> = module.statements.iter().map(|s| s.kind.clone()).collect();
        assert!(matches!(kinds[0], PyStatementKind::Import(_)));
        assert_eq!(kinds[1], PyStatementKind::Trivia);
        assert!(matches!(kinds[2], PyStatementKind::FunctionDef(_)));
        assert_eq!(kinds[3], PyStatementKind::Other);
        assert!(matches!(kinds[4], PyStatementKind::ClassDef(_)));
        assert_eq!(kinds.len(), 5);

        // The comment directly above the decorator belongs to the function
        let function = &module.statements[2];
        assert!(module.tokens[function.tokens.start].text.starts_with("# leading"));
        assert_eq!(function.line, 4);
        assert_eq!(module.render(), source);
    }

    #[test]
    fn test_imports() {
        let kinds = kinds("import a.b as c, d\nfrom ..pkg.mod import (x as y,\n    z,)\nfrom . import w\nfrom m import *\n");
        assert_eq!(
            kinds[0],
            PyStatementKind::Import(vec![
                ("a.b".to_string(), Some("c".to_string())),
                ("d".to_string(), None)
            ])
        );
        match &kinds[1] {
            PyStatementKind::FromImport {
                level,
                module,
                names,
            } => {
                assert_eq!(*level, 2);
                assert_eq!(module, "pkg.mod");
                assert_eq!(names.len(), 2);
                assert_eq!(names[0].alias.as_deref(), Some("y"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &kinds[2] {
            PyStatementKind::FromImport {
                level,
                module,
                ..
            } => {
                assert_eq!(*level, 1);
                assert!(module.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&kinds[3], PyStatementKind::FromImport { names, .. } if names[0].name == "*"));
    }

    #[test]
    fn test_assignments() {
        let module = parse_module("t.py", "A = B = 5\nx: int = 3\ny: str\na, (b, c) = 1, (2, 3)\nobj.attr = 1\nd['k'] = 2\nn += 1\n").unwrap();
        let names = |stmt: usize| match &module.statements[stmt].kind {
            PyStatementKind::Assign {
                targets,
                ..
            } => targets
                .iter()
                .flatten()
                .map(|&i| module.text(i).to_string())
                .collect::<Vec<_>>(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(names(0), vec!["A", "B"]);
        assert_eq!(names(1), vec!["x"]);
        assert_eq!(names(2), vec!["y"]);
        assert_eq!(names(3), vec!["a", "b", "c"]);
        assert_eq!(module.statements[4].kind, PyStatementKind::Other);
        assert_eq!(module.statements[5].kind, PyStatementKind::Other);
        assert_eq!(module.statements[6].kind, PyStatementKind::Other);
    }

    #[test]
    fn test_unexpected_indent() {
        let err = parse_module("t.py", "  x = 1\n").unwrap_err();
        assert_eq!(err.reason, "unexpected indent");
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = parse_module("t.py", "x = 1\ny = foo(\n  1,\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.reason.contains("never closed"));
    }

    #[test]
    fn test_malformed_import() {
        assert!(parse_module("t.py", "from import x\n").is_err());
        assert!(parse_module("t.py", "import\n").is_err());
    }
}
