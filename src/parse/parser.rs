//! Recursive-descent parser producing the syntax tree.
//!
//! The first syntax error aborts parsing: the message is kept on the parser
//! and the partially built tree is dropped. Errors caused by running out of
//! input are flagged `incomplete` so an interactive reader can ask for more.
use crate::ast::{
    Assignment, CaseArm, CaseNode, ForNode, FunctionDef, HereDoc, IfNode, LoopNode, Node, Param,
    Pipeline, Redirect, RedirectOp, SimpleCommand, Word,
};
use crate::error::{ErrorKind, ShellError, ShellResult};

use super::lexer::Lexer;
use super::token::{Keyword, Token, TokenKind};
use super::{is_function_name, is_name};

pub struct Parser {
    lexer: Lexer,
    error: Option<ShellError>,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Parser {
            lexer: Lexer::new(input),
            error: None,
        }
    }

    /// Parse the whole input into a `Node::List`. Returns `None` on the first
    /// syntax error; the error is available from `error()`.
    pub fn parse_program(&mut self) -> Option<Node> {
        match self.program() {
            Ok(node) => Some(node),
            Err(err) => {
                self.error = Some(err);
                None
            }
        }
    }

    pub fn error(&self) -> Option<&ShellError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<ShellError> {
        self.error.take()
    }

    /// The input stopped in the middle of a construct or a here-document.
    pub fn needs_more_input(&self) -> bool {
        self.error.as_ref().is_some_and(|err| err.incomplete) || self.lexer.heredoc_unterminated()
    }

    fn program(&mut self) -> ShellResult<Node> {
        let items = self.list(&[])?;
        if !self.lexer.matches(TokenKind::Eof) {
            return Err(self.unexpected());
        }
        Ok(Node::List(items))
    }

    fn kind(&self) -> TokenKind {
        self.lexer.current().kind
    }

    fn skip_newlines(&mut self) {
        while self.lexer.consume(TokenKind::Newline).is_some() {}
    }

    fn unexpected(&self) -> ShellError {
        let token = self.lexer.current();
        let err = match token.kind {
            TokenKind::Eof => ShellError::parse("unexpected end of file").incomplete(),
            TokenKind::Error => {
                let err = ShellError::new(ErrorKind::Lex, token.text.clone());
                if self.lexer.error_incomplete() {
                    err.incomplete()
                } else {
                    err
                }
            }
            _ => ShellError::parse(format!("unexpected token {}", token)),
        };
        err.with_location(token.offset, token.line, token.column)
    }

    /// A reserved word where the grammar expects one, even when it was lexed
    /// outside command position (`for x in`, `case w in`).
    fn at_reserved(&self, kw: Keyword) -> bool {
        let token = self.lexer.current();
        token.kind == TokenKind::Keyword(kw)
            || (token.kind == TokenKind::Word && token.text == kw.as_str())
    }

    fn expect_reserved(&mut self, kw: Keyword) -> ShellResult<()> {
        if self.at_reserved(kw) {
            self.lexer.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ShellResult<Token> {
        match self.lexer.consume(kind) {
            Some(token) => Ok(token),
            None => Err(self.unexpected()),
        }
    }

    fn at_stop(&self, stops: &[TokenKind]) -> bool {
        let kind = self.kind();
        kind == TokenKind::Eof || stops.contains(&kind)
    }

    /// `list := and_or ((';' | '&' | NEWLINE) linebreak and_or)*`
    fn list(&mut self, stops: &[TokenKind]) -> ShellResult<Vec<Node>> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.at_stop(stops) {
            let item = self.and_or()?;
            match self.kind() {
                TokenKind::Ampersand => {
                    self.lexer.advance();
                    items.push(Node::Background(Box::new(item)));
                }
                TokenKind::Semicolon | TokenKind::Newline => {
                    self.lexer.advance();
                    items.push(item);
                }
                _ => {
                    items.push(item);
                    break;
                }
            }
            self.skip_newlines();
        }
        Ok(items)
    }

    /// A non-empty list used as the body of a compound command.
    fn body(&mut self, stops: &[TokenKind]) -> ShellResult<Node> {
        let items = self.list(stops)?;
        if items.is_empty() {
            return Err(self.unexpected());
        }
        Ok(Node::List(items))
    }

    fn and_or(&mut self) -> ShellResult<Node> {
        let mut left = self.pipeline()?;
        loop {
            match self.kind() {
                TokenKind::LogicalAnd => {
                    self.lexer.advance();
                    self.skip_newlines();
                    let right = self.pipeline()?;
                    left = Node::And(Box::new(left), Box::new(right));
                }
                TokenKind::LogicalOr => {
                    self.lexer.advance();
                    self.skip_newlines();
                    let right = self.pipeline()?;
                    left = Node::Or(Box::new(left), Box::new(right));
                }
                _ => return Ok(left),
            }
        }
    }

    fn pipeline(&mut self) -> ShellResult<Node> {
        let negated = self
            .lexer
            .consume(TokenKind::Keyword(Keyword::Bang))
            .is_some();
        let mut stages = vec![self.command()?];
        while self.lexer.consume(TokenKind::Pipe).is_some() {
            self.skip_newlines();
            stages.push(self.command()?);
        }
        if !negated && stages.len() == 1 {
            if let Some(only) = stages.pop() {
                return Ok(only);
            }
        }
        Ok(Node::Pipeline(Pipeline { negated, stages }))
    }

    fn command(&mut self) -> ShellResult<Node> {
        match self.kind() {
            TokenKind::Keyword(Keyword::Function) => self.function_keyword(),
            TokenKind::Word if is_function_name(&self.lexer.current().text) => {
                if self.lexer.peek().kind == TokenKind::LParen {
                    let name = self.lexer.advance().text;
                    self.function_rest(name)
                } else {
                    self.simple()
                }
            }
            TokenKind::Keyword(
                Keyword::If
                | Keyword::While
                | Keyword::Until
                | Keyword::For
                | Keyword::Case
                | Keyword::LBrace,
            )
            | TokenKind::LParen => self.compound(),
            _ => self.simple(),
        }
    }

    /// A compound command with any trailing redirections.
    fn compound(&mut self) -> ShellResult<Node> {
        let node = match self.kind() {
            TokenKind::Keyword(Keyword::If) => self.if_clause()?,
            TokenKind::Keyword(Keyword::While) => self.loop_clause(true)?,
            TokenKind::Keyword(Keyword::Until) => self.loop_clause(false)?,
            TokenKind::Keyword(Keyword::For) => self.for_clause()?,
            TokenKind::Keyword(Keyword::Case) => self.case_clause()?,
            TokenKind::LParen => {
                self.lexer.advance();
                let body = self.body(&[TokenKind::RParen])?;
                self.expect(TokenKind::RParen)?;
                Node::Subshell(Box::new(body))
            }
            _ if self.at_reserved(Keyword::LBrace) => {
                self.lexer.advance();
                let body = self.body(&[TokenKind::Keyword(Keyword::RBrace)])?;
                self.expect_reserved(Keyword::RBrace)?;
                Node::BraceGroup(Box::new(body))
            }
            _ => return Err(self.unexpected()),
        };
        let mut redirects = Vec::new();
        while self.kind().is_redirect() {
            redirects.push(self.redirect()?);
        }
        if redirects.is_empty() {
            Ok(node)
        } else {
            Ok(Node::Redirected(Box::new(node), redirects))
        }
    }

    fn if_clause(&mut self) -> ShellResult<Node> {
        self.lexer.advance();
        let mut branches = Vec::new();
        let condition = self.body(&[TokenKind::Keyword(Keyword::Then)])?;
        self.expect_reserved(Keyword::Then)?;
        let branch_stops = [
            TokenKind::Keyword(Keyword::Elif),
            TokenKind::Keyword(Keyword::Else),
            TokenKind::Keyword(Keyword::Fi),
        ];
        let body = self.body(&branch_stops)?;
        branches.push((condition, body));

        let mut else_branch = None;
        loop {
            match self.kind() {
                TokenKind::Keyword(Keyword::Elif) => {
                    self.lexer.advance();
                    let condition = self.body(&[TokenKind::Keyword(Keyword::Then)])?;
                    self.expect_reserved(Keyword::Then)?;
                    let body = self.body(&branch_stops)?;
                    branches.push((condition, body));
                }
                TokenKind::Keyword(Keyword::Else) => {
                    self.lexer.advance();
                    let body = self.body(&[TokenKind::Keyword(Keyword::Fi)])?;
                    else_branch = Some(Box::new(body));
                    self.expect_reserved(Keyword::Fi)?;
                    break;
                }
                _ => {
                    self.expect_reserved(Keyword::Fi)?;
                    break;
                }
            }
        }
        Ok(Node::If(IfNode {
            branches,
            else_branch,
        }))
    }

    fn loop_clause(&mut self, is_while: bool) -> ShellResult<Node> {
        self.lexer.advance();
        let condition = self.body(&[TokenKind::Keyword(Keyword::Do)])?;
        self.expect_reserved(Keyword::Do)?;
        let body = self.body(&[TokenKind::Keyword(Keyword::Done)])?;
        self.expect_reserved(Keyword::Done)?;
        let node = LoopNode {
            condition: Box::new(condition),
            body: Box::new(body),
        };
        Ok(if is_while {
            Node::While(node)
        } else {
            Node::Until(node)
        })
    }

    fn for_clause(&mut self) -> ShellResult<Node> {
        self.lexer.advance();
        let token = self.lexer.current();
        if token.kind != TokenKind::Word || !is_name(&token.text) {
            return Err(self.unexpected());
        }
        let var = self.lexer.advance().text;
        self.skip_newlines();

        let words = if self.at_reserved(Keyword::In) {
            self.lexer.advance();
            let mut words = Vec::new();
            while self.kind().is_word() {
                words.push(Word::new(self.lexer.advance().text));
            }
            Some(words)
        } else {
            None
        };
        if self.lexer.consume(TokenKind::Semicolon).is_none() && words.is_some() {
            self.expect(TokenKind::Newline)?;
        }
        self.skip_newlines();
        self.expect_reserved(Keyword::Do)?;
        let body = self.body(&[TokenKind::Keyword(Keyword::Done)])?;
        self.expect_reserved(Keyword::Done)?;
        Ok(Node::For(ForNode {
            var,
            words,
            body: Box::new(body),
        }))
    }

    fn case_clause(&mut self) -> ShellResult<Node> {
        self.lexer.advance();
        if !self.kind().is_word() {
            return Err(self.unexpected());
        }
        let word = Word::new(self.lexer.advance().text);
        self.skip_newlines();
        self.expect_reserved(Keyword::In)?;
        self.skip_newlines();

        let mut arms = Vec::new();
        loop {
            if self.at_reserved(Keyword::Esac) {
                self.lexer.advance();
                break;
            }
            self.lexer.consume(TokenKind::LParen);
            let mut patterns = vec![self.pattern()?];
            while self.lexer.consume(TokenKind::Pipe).is_some() {
                patterns.push(self.pattern()?);
            }
            self.expect(TokenKind::RParen)?;
            let items = self.list(&[
                TokenKind::DoubleSemicolon,
                TokenKind::Keyword(Keyword::Esac),
            ])?;
            let body = if items.is_empty() {
                None
            } else {
                Some(Node::List(items))
            };
            arms.push(CaseArm { patterns, body });
            if self.lexer.consume(TokenKind::DoubleSemicolon).is_some() {
                self.skip_newlines();
            } else if !self.at_reserved(Keyword::Esac) {
                return Err(self.unexpected());
            }
        }
        Ok(Node::Case(CaseNode { word, arms }))
    }

    fn pattern(&mut self) -> ShellResult<Word> {
        match self.kind() {
            kind if kind.is_word() => Ok(Word::new(self.lexer.advance().text)),
            TokenKind::Keyword(_) => Ok(Word::new(self.lexer.advance().text)),
            _ => Err(self.unexpected()),
        }
    }

    fn function_keyword(&mut self) -> ShellResult<Node> {
        self.lexer.advance();
        let token = self.lexer.current();
        if token.kind != TokenKind::Word || !is_function_name(&token.text) {
            return Err(self.unexpected());
        }
        let name = self.lexer.advance().text;
        if self.kind() == TokenKind::LParen {
            self.function_rest(name)
        } else {
            self.skip_newlines();
            let body = self.compound()?;
            Ok(Node::Function(FunctionDef {
                name,
                params: None,
                body: Box::new(body),
            }))
        }
    }

    /// `name ( params ) linebreak compound`, positioned on the `(`.
    fn function_rest(&mut self, name: String) -> ShellResult<Node> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.kind().is_word() {
            let token = self.lexer.advance();
            for piece in split_params(&token.text) {
                params.push(parse_param(piece).map_err(|err| {
                    err.with_location(token.offset, token.line, token.column)
                })?);
            }
        }
        self.expect(TokenKind::RParen)?;
        self.skip_newlines();
        let body = self.compound()?;
        Ok(Node::Function(FunctionDef {
            name,
            params: if params.is_empty() { None } else { Some(params) },
            body: Box::new(body),
        }))
    }

    fn simple(&mut self) -> ShellResult<Node> {
        let mut command = SimpleCommand::default();
        loop {
            let kind = self.kind();
            if kind.is_redirect() {
                command.redirects.push(self.redirect()?);
            } else if kind.is_word() {
                let token = self.lexer.advance();
                match split_assignment(&token) {
                    Some(assignment) if command.words.is_empty() => {
                        command.assignments.push(assignment)
                    }
                    _ => command.words.push(Word::new(token.text)),
                }
            } else if matches!(kind, TokenKind::Keyword(_)) && !command.words.is_empty() {
                command.words.push(Word::new(self.lexer.advance().text));
            } else {
                break;
            }
        }
        if command.words.is_empty() && command.assignments.is_empty() && command.redirects.is_empty()
        {
            return Err(self.unexpected());
        }
        Ok(Node::Command(command))
    }

    fn redirect(&mut self) -> ShellResult<Redirect> {
        let op_token = self.lexer.advance();
        let op = match op_token.kind {
            TokenKind::Less => RedirectOp::Input,
            TokenKind::Great => RedirectOp::Output,
            TokenKind::DGreat => RedirectOp::Append,
            TokenKind::LessAnd => RedirectOp::DupInput,
            TokenKind::GreatAnd => RedirectOp::DupOutput,
            TokenKind::AndGreat => RedirectOp::OutputAll,
            TokenKind::AndDGreat => RedirectOp::AppendAll,
            TokenKind::DLess => RedirectOp::HereDoc { strip_tabs: false },
            TokenKind::DLessDash => RedirectOp::HereDoc { strip_tabs: true },
            TokenKind::TLess => RedirectOp::HereString,
            _ => {
                return Err(ShellError::parse(format!("unexpected token {}", op_token))
                    .with_location(op_token.offset, op_token.line, op_token.column))
            }
        };
        if !self.kind().is_word() {
            return Err(self.unexpected());
        }
        let target = Word::new(self.lexer.advance().text);
        let heredoc = match op {
            RedirectOp::HereDoc { .. } => Some(self.lexer.take_heredoc().unwrap_or(HereDoc {
                content: String::new(),
                expand: true,
            })),
            _ => None,
        };
        Ok(Redirect {
            fd: op_token.io_number(),
            op,
            target,
            heredoc,
        })
    }
}

/// `NAME=value` at the start of a simple command.
fn split_assignment(token: &Token) -> Option<Assignment> {
    if token.kind != TokenKind::Word {
        return None;
    }
    let (name, value) = token.text.split_once('=')?;
    if !is_name(name) {
        return None;
    }
    Some(Assignment {
        name: name.to_string(),
        value: Word::new(value),
    })
}

/// Split a parameter-list word on commas outside quotes.
fn split_params(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (_, '\\') if quote != Some('\'') => escaped = true,
            (None, '\'' | '"') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                pieces.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces.into_iter().filter(|piece| !piece.is_empty()).collect()
}

fn parse_param(piece: &str) -> ShellResult<Param> {
    let (name, default) = match piece.split_once('=') {
        Some((name, default)) => (name, Some(Word::new(default))),
        None => (piece, None),
    };
    if !is_name(name) {
        return Err(ShellError::parse(format!(
            "invalid parameter name `{}'",
            name
        )));
    }
    Ok(Param {
        name: name.to_string(),
        default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Node {
        let mut parser = Parser::new(input);
        match parser.parse_program() {
            Some(node) => node,
            None => panic!("parse failed: {:?}", parser.error()),
        }
    }

    fn parse_err(input: &str) -> ShellError {
        let mut parser = Parser::new(input);
        assert!(parser.parse_program().is_none(), "expected error for {input:?}");
        parser.take_error().unwrap()
    }

    fn only(node: Node) -> Node {
        match node {
            Node::List(mut items) if items.len() == 1 => items.remove(0),
            other => panic!("expected single item, got {other:?}"),
        }
    }

    fn command(node: Node) -> SimpleCommand {
        match node {
            Node::Command(cmd) => cmd,
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn simple_command_with_assignments_and_redirects() {
        let cmd = command(only(parse("FOO=1 BAR=$x cmd a >out 2>&1 b")));
        assert_eq!(cmd.assignments.len(), 2);
        assert_eq!(cmd.assignments[1].value.as_str(), "$x");
        let words: Vec<&str> = cmd.words.iter().map(Word::as_str).collect();
        assert_eq!(words, vec!["cmd", "a", "b"]);
        assert_eq!(cmd.redirects.len(), 2);
        assert_eq!(cmd.redirects[1].fd, Some(2));
        assert_eq!(cmd.redirects[1].op, RedirectOp::DupOutput);
        assert_eq!(cmd.redirects[1].target.as_str(), "1");
    }

    #[test]
    fn assignment_after_command_word_is_an_argument() {
        let cmd = command(only(parse("env A=1")));
        assert!(cmd.assignments.is_empty());
        assert_eq!(cmd.words.len(), 2);
    }

    #[test]
    fn logical_operators_are_left_associative() {
        match only(parse("a && b || c")) {
            Node::Or(left, _) => assert!(matches!(*left, Node::And(_, _))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pipelines_and_negation() {
        match only(parse("! a | b | c")) {
            Node::Pipeline(p) => {
                assert!(p.negated);
                assert_eq!(p.stages.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(only(parse("a")), Node::Command(_)));
    }

    #[test]
    fn background_wraps_and_or() {
        match parse("a && b & c") {
            Node::List(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], Node::Background(inner) if matches!(**inner, Node::And(_, _))));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn if_elif_else() {
        match only(parse("if a; then b; elif c; then d; else e; fi")) {
            Node::If(node) => {
                assert_eq!(node.branches.len(), 2);
                assert!(node.else_branch.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn for_loops() {
        match only(parse("for i in 1 2 3; do echo $i; done")) {
            Node::For(node) => {
                assert_eq!(node.var, "i");
                assert_eq!(node.words.as_ref().map(Vec::len), Some(3));
            }
            other => panic!("unexpected {other:?}"),
        }
        match only(parse("for arg\ndo\n  echo $arg\ndone")) {
            Node::For(node) => assert!(node.words.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn case_arms() {
        let src = "case $x in\n  a|b) echo ab;;\n  (c*) ;;\n  *) echo other\nesac";
        match only(parse(src)) {
            Node::Case(node) => {
                assert_eq!(node.arms.len(), 3);
                assert_eq!(node.arms[0].patterns.len(), 2);
                assert!(node.arms[1].body.is_none());
                assert!(node.arms[2].body.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(only(parse("case x in esac")), Node::Case(_)));
    }

    #[test]
    fn function_definitions() {
        match only(parse("greet(name, greeting=\"hello, you\") { echo $greeting $name; }")) {
            Node::Function(def) => {
                let params = def.params.unwrap();
                assert_eq!(params.len(), 2);
                assert_eq!(params[0].name, "name");
                assert!(params[0].default.is_none());
                assert_eq!(params[1].default.as_ref().unwrap().as_str(), "\"hello, you\"");
                assert!(matches!(*def.body, Node::BraceGroup(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        match only(parse("function f {\n  echo hi\n}")) {
            Node::Function(def) => {
                assert_eq!(def.name, "f");
                assert!(def.params.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(only(parse("f () ( echo sub )")), Node::Function(_)));
    }

    #[test]
    fn compound_redirections() {
        match only(parse("{ echo a; echo b; } > out")) {
            Node::Redirected(inner, redirects) => {
                assert!(matches!(*inner, Node::BraceGroup(_)));
                assert_eq!(redirects.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn heredoc_attaches_to_redirect() {
        let cmd = command(only(parse("cat <<'EOF'\n$x\nEOF\n")));
        let doc = cmd.redirects[0].heredoc.as_ref().unwrap();
        assert_eq!(doc.content, "$x\n");
        assert!(!doc.expand);
    }

    #[test]
    fn keywords_as_arguments() {
        let cmd = command(only(parse("echo if then fi")));
        assert_eq!(cmd.words.len(), 4);
    }

    #[test]
    fn syntax_errors() {
        let err = parse_err("if true; then echo x; fi fi");
        assert!(!err.incomplete);
        assert_eq!(err.exit_status(), 2);
        assert!(err.message.contains("fi"));

        let err = parse_err("echo ;; echo");
        assert!(err.message.contains(";;"));

        let err = parse_err("while true; do");
        assert!(err.incomplete);

        let err = parse_err("echo 'open");
        assert!(err.incomplete);
        assert_eq!(err.kind, ErrorKind::Lex);

        let err = parse_err("f(1x) { :; }");
        assert!(err.message.contains("invalid parameter"));
    }

    #[test]
    fn error_location_points_at_token() {
        let err = parse_err("echo a\n)");
        assert_eq!(err.location, Some((2, 1)));
    }

    #[test]
    fn unterminated_heredoc_wants_more_input() {
        let mut parser = Parser::new("cat <<EOF\nline\n");
        assert!(parser.parse_program().is_some());
        assert!(parser.needs_more_input());
    }
}
