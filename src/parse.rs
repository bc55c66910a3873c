//! Parser for makefile-style build files.
//!
//! Parsing is line oriented: a "logical line" is a physical line plus any
//! backslash-continued lines, with comments removed.  Each logical line is
//! classified as an assignment, a rule header or a directive.  Recipe lines
//! (TAB-prefixed, following a rule header) are kept close to verbatim since
//! they belong to the shell.
//!
//! Everything the parser produces is still unexpanded: variable references
//! come out as EvalStrings, and it's up to the loader to evaluate them.

use crate::eval::{AutoVar, EvalPart, EvalString, Func};
use crate::scanner::{ParseError, ParseResult, Scanner};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// `NAME = value`
    Recursive,
    /// `NAME := value` or `NAME ::= value`
    Simple,
    /// `NAME ?= value`
    Conditional,
}

#[derive(Debug)]
pub struct Assignment {
    pub name: String,
    pub flavor: Flavor,
    pub value: EvalString,
    pub line: usize,
}

#[derive(Debug)]
pub struct Rule {
    pub targets: EvalString,
    pub prereqs: EvalString,
    pub recipe: Vec<EvalString>,
    pub line: usize,
}

#[derive(Debug)]
pub enum Statement {
    Assignment(Assignment),
    Rule(Rule),
    Include { paths: EvalString, line: usize },
}

pub struct Parser<'text> {
    scanner: Scanner<'text>,
}

/// Find the first byte in `text` that is one of `stops`, ignoring anything
/// inside `$(...)` or `${...}`.
fn find_top_level(text: &str, stops: &[u8]) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut closers: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'$' => {
                match bytes.get(i + 1) {
                    Some(b'(') => closers.push(b')'),
                    Some(b'{') => closers.push(b'}'),
                    _ => {}
                }
                // Skip whatever follows the dollar, so `$$` and `$:` are inert.
                i += 2;
                continue;
            }
            b'(' | b'{' if !closers.is_empty() => {
                closers.push(if c == b'(' { b')' } else { b'}' });
            }
            _ if closers.last() == Some(&c) => {
                closers.pop();
            }
            _ if closers.is_empty() && stops.contains(&c) => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn is_valid_var_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .bytes()
            .any(|c| c.is_ascii_whitespace() || matches!(c, b'$' | b':' | b'#' | b'='))
}

impl<'text> Parser<'text> {
    pub fn new(buf: &'text [u8]) -> Parser<'text> {
        Parser {
            scanner: Scanner::new(buf),
        }
    }

    pub fn format_parse_error(&self, filename: &Path, err: ParseError) -> String {
        self.scanner.format_parse_error(filename, err)
    }

    pub fn read(&mut self) -> ParseResult<Option<Statement>> {
        loop {
            if self.scanner.at_end() {
                return Ok(None);
            }
            let start = self.scanner.ofs;
            let line = self.scanner.line;
            if self.scanner.peek() == b'\t' {
                if self.scanner.rest_of_line_blank() {
                    self.scanner.skip_line();
                    continue;
                }
                return self
                    .scanner
                    .parse_error("recipe commences before first target");
            }
            let text = self.read_logical_line(start)?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return self.read_statement(text, start, line).map(Some);
        }
    }

    /// Read up to the end of the logical line starting at the current
    /// position, joining continuations and dropping comments.
    fn read_logical_line(&mut self, start: usize) -> ParseResult<String> {
        let mut line = Vec::new();
        let mut in_comment = false;
        while !self.scanner.at_end() {
            match self.scanner.peek() {
                b'\\' if self.continues() => {
                    self.scanner.next();
                    self.scanner.skip_newline();
                    if !in_comment {
                        while line.last().map_or(false, |c: &u8| c.is_ascii_whitespace()) {
                            line.pop();
                        }
                        line.push(b' ');
                    }
                    self.scanner.skip_spaces();
                }
                b'\\' if self.scanner.peek_at(1) == b'#' && !in_comment => {
                    self.scanner.next();
                    self.scanner.next();
                    line.push(b'#');
                }
                b'#' => {
                    in_comment = true;
                    self.scanner.next();
                }
                _ if self.scanner.peek_newline() => {
                    self.scanner.skip_newline();
                    break;
                }
                c => {
                    if !in_comment {
                        line.push(c);
                    }
                    self.scanner.next();
                }
            }
        }
        match String::from_utf8(line) {
            Ok(text) => Ok(text),
            Err(_) => self.scanner.parse_error_at(start, "invalid UTF-8"),
        }
    }

    /// Whether the scanner is at a backslash-newline.
    fn continues(&self) -> bool {
        self.scanner.peek() == b'\\'
            && (self.scanner.peek_at(1) == b'\n'
                || (self.scanner.peek_at(1) == b'\r' && self.scanner.peek_at(2) == b'\n'))
    }

    fn eval(&self, text: &str, ofs: usize) -> ParseResult<EvalString> {
        match parse_eval(text) {
            Ok(eval) => Ok(eval),
            Err(msg) => self.scanner.parse_error_at(ofs, msg),
        }
    }

    fn read_statement(&mut self, text: &str, start: usize, line: usize) -> ParseResult<Statement> {
        if let Some(rest) = text.strip_prefix("include") {
            if rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_whitespace()) {
                let rest = rest.trim();
                if rest.is_empty() {
                    return self.scanner.parse_error_at(start, "expected path");
                }
                return Ok(Statement::Include {
                    paths: self.eval(rest, start)?,
                    line,
                });
            }
        }

        let pos = match find_top_level(text, b":=") {
            Some(pos) => pos,
            None => return self.scanner.parse_error_at(start, "missing separator"),
        };
        let (lhs, rhs) = (&text[..pos], &text[pos + 1..]);
        if text.as_bytes()[pos] == b'=' {
            let (name, flavor) = if let Some(name) = lhs.strip_suffix('?') {
                (name, Flavor::Conditional)
            } else if lhs.ends_with('+') {
                return self
                    .scanner
                    .parse_error_at(start, "appending with += is not supported");
            } else {
                (lhs, Flavor::Recursive)
            };
            return self.read_assignment(name, flavor, rhs, start, line);
        }
        if let Some(value) = rhs.strip_prefix('=') {
            return self.read_assignment(lhs, Flavor::Simple, value, start, line);
        }
        if let Some(value) = rhs.strip_prefix(":=") {
            return self.read_assignment(lhs, Flavor::Simple, value, start, line);
        }
        if rhs.starts_with(':') {
            return self
                .scanner
                .parse_error_at(start, "double-colon rules are not supported");
        }
        self.read_rule(lhs, rhs, start, line).map(Statement::Rule)
    }

    fn read_assignment(
        &mut self,
        name: &str,
        flavor: Flavor,
        value: &str,
        start: usize,
        line: usize,
    ) -> ParseResult<Statement> {
        let name = name.trim();
        if !is_valid_var_name(name) {
            return self
                .scanner
                .parse_error_at(start, format!("invalid variable name {:?}", name));
        }
        Ok(Statement::Assignment(Assignment {
            name: name.to_owned(),
            flavor,
            value: self.eval(value.trim(), start)?,
            line,
        }))
    }

    fn read_rule(&mut self, lhs: &str, rhs: &str, start: usize, line: usize) -> ParseResult<Rule> {
        let lhs = lhs.trim();
        if lhs.is_empty() {
            return self.scanner.parse_error_at(start, "missing target");
        }
        let (prereqs, inline) = match find_top_level(rhs, b";") {
            Some(semi) => (&rhs[..semi], Some(&rhs[semi + 1..])),
            None => (rhs, None),
        };
        if find_top_level(prereqs, b"=").is_some() {
            return self
                .scanner
                .parse_error_at(start, "target-specific variables are not supported");
        }

        let mut recipe = Vec::new();
        if let Some(inline) = inline {
            let inline = inline.trim();
            if !inline.is_empty() {
                recipe.push(self.recipe_command(inline, start)?);
            }
        }
        let targets = self.eval(lhs, start)?;
        let prereqs = self.eval(prereqs.trim(), start)?;
        self.read_recipe(&mut recipe)?;
        Ok(Rule {
            targets,
            prereqs,
            recipe,
            line,
        })
    }

    /// Commands go to the shell as written, so make's `@`, `-` and `+`
    /// line prefixes are refused rather than left for the shell to trip on.
    fn recipe_command(&self, text: &str, ofs: usize) -> ParseResult<EvalString> {
        if let Some(prefix) = text.trim_start().chars().next().filter(|c| "@-+".contains(*c)) {
            return self.scanner.parse_error_at(
                ofs,
                format!("recipe prefix {:?} is not supported", prefix),
            );
        }
        self.eval(text, ofs)
    }

    /// Read the TAB-prefixed lines following a rule header.
    fn read_recipe(&mut self, recipe: &mut Vec<EvalString>) -> ParseResult<()> {
        loop {
            if self.scanner.at_end() {
                return Ok(());
            }
            let mark = self.scanner.mark();
            if self.scanner.peek() == b'\t' {
                let ofs = self.scanner.ofs;
                self.scanner.next();
                let text = self.read_recipe_line(ofs)?;
                if !text.trim().is_empty() {
                    recipe.push(self.recipe_command(&text, ofs)?);
                }
                continue;
            }
            if self.scanner.rest_of_line_blank() {
                self.scanner.skip_line();
                continue;
            }
            self.scanner.skip_spaces();
            if self.scanner.peek() == b'#' {
                let ofs = self.scanner.ofs;
                self.read_logical_line(ofs)?;
                continue;
            }
            self.scanner.reset(mark);
            return Ok(());
        }
    }

    /// Read one recipe line.  Continuations stay in the text for the shell
    /// to see; only the TAB starting each continued line is dropped.
    fn read_recipe_line(&mut self, start: usize) -> ParseResult<String> {
        let mut line = Vec::new();
        while !self.scanner.at_end() {
            if self.continues() {
                self.scanner.next();
                self.scanner.skip_newline();
                line.extend_from_slice(b"\\\n");
                if self.scanner.peek() == b'\t' {
                    self.scanner.next();
                }
                continue;
            }
            if self.scanner.peek_newline() {
                self.scanner.skip_newline();
                break;
            }
            line.push(self.scanner.read());
        }
        match String::from_utf8(line) {
            Ok(text) => Ok(text),
            Err(_) => self.scanner.parse_error_at(start, "invalid UTF-8"),
        }
    }
}

/// Parser for the `$` syntax within a single string.
struct EvalParser<'a> {
    text: &'a str,
    pos: usize,
    parts: Vec<EvalPart>,
    literal: String,
}

impl<'a> EvalParser<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        EvalParser {
            text,
            pos,
            parts: Vec::new(),
            literal: String::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn flush(&mut self) {
        if !self.literal.is_empty() {
            self.parts
                .push(EvalPart::Literal(std::mem::take(&mut self.literal)));
        }
    }

    fn finish(mut self) -> (EvalString, usize) {
        self.flush();
        (EvalString::new(self.parts), self.pos)
    }

    /// Parse until the end of text, or, when `close` is given, until an
    /// unbalanced `close` (or a top-level comma if `comma` is set).  The
    /// stopping byte is not consumed.
    fn parse(&mut self, close: Option<u8>, comma: bool) -> Result<(), String> {
        let open = match close {
            Some(b')') => b'(',
            Some(_) => b'{',
            None => 0,
        };
        let mut depth = 0;
        while let Some(c) = self.peek() {
            match c {
                b'$' => {
                    self.pos += 1;
                    self.read_dollar()?;
                    continue;
                }
                _ if close == Some(c) && depth == 0 => return Ok(()),
                b',' if comma && depth == 0 => return Ok(()),
                _ if close == Some(c) => depth -= 1,
                _ if c == open && close.is_some() => depth += 1,
                _ => {}
            }
            // Safe to slice at ASCII boundaries only; copy whole chars.
            let ch = match self.text[self.pos..].chars().next() {
                Some(ch) => ch,
                None => break,
            };
            self.literal.push(ch);
            self.pos += ch.len_utf8();
        }
        match close {
            Some(c) => Err(format!("unterminated reference, expected {:?}", c as char)),
            None => Ok(()),
        }
    }

    /// Parse what follows a `$`.
    fn read_dollar(&mut self) -> Result<(), String> {
        let c = match self.text[self.pos..].chars().next() {
            Some(c) => c,
            None => {
                // A trailing lone `$` stands for itself.
                self.literal.push('$');
                return Ok(());
            }
        };
        self.pos += c.len_utf8();
        match c {
            '$' => self.literal.push('$'),
            '(' => self.read_reference(b')')?,
            '{' => self.read_reference(b'}')?,
            c => {
                self.flush();
                self.parts.push(match AutoVar::from_char(c) {
                    Some(auto) => EvalPart::Auto(auto),
                    None => EvalPart::VarRef(c.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Parse the inside of `$(...)` after the opening paren.
    fn read_reference(&mut self, close: u8) -> Result<(), String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == close || c == b':' || c.is_ascii_whitespace() {
                break;
            }
            if c == b'$' {
                return Err("computed variable names are not supported".to_owned());
            }
            self.pos += 1;
        }
        let name = &self.text[start..self.pos];
        let part = match self.peek() {
            None => return Err(format!("unterminated reference, expected {:?}", close as char)),
            Some(c) if c == close => {
                self.pos += 1;
                if name.is_empty() {
                    return Err("empty variable name".to_owned());
                }
                EvalPart::VarRef(name.to_owned())
            }
            Some(b':') => {
                self.pos += 1;
                let rest = &self.text[self.pos..];
                let end = match rest.find(close as char) {
                    Some(end) => end,
                    None => {
                        return Err(format!("unterminated reference, expected {:?}", close as char))
                    }
                };
                let subst = &rest[..end];
                self.pos += end + 1;
                let (from, to) = match subst.split_once('=') {
                    Some(split) => split,
                    None => return Err(format!("expected '=' in $({}:{})", name, subst)),
                };
                if subst.contains('$') {
                    return Err("references inside substitution references are not supported"
                        .to_owned());
                }
                EvalPart::SubstRef {
                    name: name.to_owned(),
                    from: from.to_owned(),
                    to: to.to_owned(),
                }
            }
            Some(_) => {
                let func = match Func::from_name(name) {
                    Some(func) => func,
                    None => return Err(format!("unknown function {:?}", name)),
                };
                while self.peek().map_or(false, |c| c.is_ascii_whitespace()) {
                    self.pos += 1;
                }
                let mut args = Vec::new();
                loop {
                    let last = args.len() + 1 >= func.arity();
                    let mut arg = EvalParser::new(self.text, self.pos);
                    arg.parse(Some(close), !last)?;
                    let (value, pos) = arg.finish();
                    args.push(value);
                    self.pos = pos;
                    if self.peek() == Some(close) {
                        self.pos += 1;
                        break;
                    }
                    // Stopped at a comma.
                    self.pos += 1;
                }
                EvalPart::Call(func, args)
            }
        };
        self.flush();
        self.parts.push(part);
        Ok(())
    }
}

/// Parse a string containing `$` references into an EvalString.
pub fn parse_eval(text: &str) -> Result<EvalString, String> {
    let mut parser = EvalParser::new(text, 0);
    parser.parse(None, false)?;
    Ok(parser.finish().0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(text: &str) -> Vec<Statement> {
        let mut parser = Parser::new(text.as_bytes());
        let mut statements = Vec::new();
        loop {
            match parser.read() {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => return statements,
                Err(err) => panic!("{}", parser.format_parse_error(Path::new("test"), err)),
            }
        }
    }

    fn parse_err(text: &str) -> String {
        let mut parser = Parser::new(text.as_bytes());
        loop {
            match parser.read() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected error parsing {:?}", text),
                Err(err) => return parser.format_parse_error(Path::new("test"), err),
            }
        }
    }

    fn lit(text: &str) -> EvalString {
        EvalString::literal(text)
    }

    #[test]
    fn assignments() {
        let statements = parse_all(
            "
# comment
A = 1
B := $(A) 2 # trailing
C ?= x\\#y
D::=
",
        );
        let got: Vec<_> = statements
            .iter()
            .map(|s| match s {
                Statement::Assignment(a) => (a.name.as_str(), a.flavor, a.line),
                s => panic!("expected assignment, got {:?}", s),
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("A", Flavor::Recursive, 3),
                ("B", Flavor::Simple, 4),
                ("C", Flavor::Conditional, 5),
                ("D", Flavor::Simple, 6),
            ]
        );
        match &statements[1] {
            Statement::Assignment(a) => assert_eq!(
                a.value,
                EvalString::new(vec![
                    EvalPart::VarRef("A".into()),
                    EvalPart::Literal(" 2".into())
                ])
            ),
            _ => unreachable!(),
        }
        match &statements[2] {
            Statement::Assignment(a) => assert_eq!(a.value, lit("x#y")),
            _ => unreachable!(),
        }
    }

    #[test]
    fn rule_with_recipe() {
        let statements = parse_all(
            "results/%.csv : data/%.txt $(COUNT_SRC)
\tpython $(COUNT_SRC) $< > $@

\t# shell comment stays
# makefile comment inside recipe
\techo \\
\t  done
all: ; echo inline
",
        );
        assert_eq!(statements.len(), 2);
        let rule = match &statements[0] {
            Statement::Rule(rule) => rule,
            s => panic!("expected rule, got {:?}", s),
        };
        assert_eq!(rule.line, 1);
        assert_eq!(rule.targets, lit("results/%.csv"));
        assert_eq!(
            rule.prereqs,
            EvalString::new(vec![
                EvalPart::Literal("data/%.txt ".into()),
                EvalPart::VarRef("COUNT_SRC".into()),
            ])
        );
        assert_eq!(rule.recipe.len(), 3);
        assert_eq!(rule.recipe[1], lit("# shell comment stays"));
        assert_eq!(rule.recipe[2], lit("echo \\\n  done"));

        match &statements[1] {
            Statement::Rule(rule) => {
                assert_eq!(rule.line, 8);
                assert_eq!(rule.recipe, vec![lit("echo inline")]);
                assert_eq!(rule.prereqs, lit(""));
            }
            s => panic!("expected rule, got {:?}", s),
        }
    }

    #[test]
    fn continuation() {
        let statements = parse_all("all: a \\\n     b\\\n\tc\n");
        match &statements[0] {
            Statement::Rule(rule) => assert_eq!(rule.prereqs, lit("a b c")),
            s => panic!("expected rule, got {:?}", s),
        }
    }

    #[test]
    fn colon_inside_reference() {
        let statements = parse_all("$(OUT:.txt=.dat): x\n");
        match &statements[0] {
            Statement::Rule(rule) => assert_eq!(
                rule.targets,
                EvalString::new(vec![EvalPart::SubstRef {
                    name: "OUT".into(),
                    from: ".txt".into(),
                    to: ".dat".into(),
                }])
            ),
            s => panic!("expected rule, got {:?}", s),
        }
    }

    #[test]
    fn include() {
        let statements = parse_all("include config.mk $(EXTRA)\n");
        match &statements[0] {
            Statement::Include { paths, line } => {
                assert_eq!(*line, 1);
                assert_eq!(paths.parts().len(), 2);
            }
            s => panic!("expected include, got {:?}", s),
        }
        // Not a directive, just a target that happens to start with it.
        let statements = parse_all("includes: x\n");
        assert!(matches!(statements[0], Statement::Rule(_)));
    }

    #[test]
    fn errors() {
        assert!(parse_err("\techo hi\n").contains("recipe commences before first target"));
        assert!(parse_err("just words\n").contains("missing separator"));
        assert!(parse_err("A += 1\n").contains("+= is not supported"));
        assert!(parse_err("a:: b\n").contains("double-colon"));
        assert!(parse_err("x = $(shell ls)\n").contains("unknown function \"shell\""));
        assert!(parse_err("x = $(A\n").contains("unterminated"));
        assert!(parse_err("all:\n\t@echo hi\n").contains("recipe prefix '@' is not supported"));
        assert!(parse_err("all: ; -rm out\n").contains("recipe prefix '-'"));
    }

    #[test]
    fn error_location() {
        let msg = parse_err("A = 1\n\nall:\n\techo\nbad line\n");
        assert!(msg.contains("test:5: bad line"), "{}", msg);
    }

    #[test]
    fn eval_refs() {
        assert_eq!(
            parse_eval("a$$b $@ $X ${Y}").unwrap(),
            EvalString::new(vec![
                EvalPart::Literal("a$b ".into()),
                EvalPart::Auto(AutoVar::Target),
                EvalPart::Literal(" ".into()),
                EvalPart::VarRef("X".into()),
                EvalPart::Literal(" ".into()),
                EvalPart::VarRef("Y".into()),
            ])
        );
    }

    #[test]
    fn eval_calls() {
        let parsed = parse_eval("$(patsubst %.txt,%.csv,$(wildcard data/*.txt) f(x).txt)").unwrap();
        match parsed.parts() {
            [EvalPart::Call(Func::Patsubst, args)] => {
                assert_eq!(args.len(), 3);
                assert_eq!(args[0], lit("%.txt"));
                assert_eq!(args[1], lit("%.csv"));
                match args[2].parts() {
                    [EvalPart::Call(Func::Wildcard, inner), EvalPart::Literal(rest)] => {
                        assert_eq!(inner, &vec![lit("data/*.txt")]);
                        assert_eq!(rest, " f(x).txt");
                    }
                    parts => panic!("unexpected parts {:?}", parts),
                }
            }
            parts => panic!("unexpected parts {:?}", parts),
        }
        // Commas past the last argument belong to it.
        let parsed = parse_eval("$(wildcard a,b)").unwrap();
        assert_eq!(
            parsed.parts(),
            &[EvalPart::Call(Func::Wildcard, vec![lit("a,b")])]
        );
    }
}
