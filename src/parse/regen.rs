//! Source regeneration from the syntax tree.
//!
//! The output is not byte-identical to the input (comments and layout are
//! lost) but parsing it again yields an equal tree. Here-document bodies are
//! emitted after the line holding their redirection, so a command carrying a
//! heredoc ends its line instead of being followed by `; `.
use crate::ast::{Node, Redirect, RedirectOp, SimpleCommand};

use super::lexer::unquote_delimiter;

pub fn regenerate(node: &Node) -> String {
    let mut writer = Writer::default();
    match node {
        Node::List(items) => writer.items(items),
        other => writer.node(other),
    }
    if !writer.pending.is_empty() {
        writer.out.push('\n');
        writer.flush_heredocs();
    }
    writer.out
}

#[derive(Default)]
struct Writer {
    out: String,
    // Bodies waiting for the end of the current line: (content, delimiter).
    pending: Vec<(String, String)>,
}

impl Writer {
    fn flush_heredocs(&mut self) {
        for (content, delimiter) in self.pending.drain(..) {
            self.out.push_str(&content);
            self.out.push_str(&delimiter);
            self.out.push('\n');
        }
    }

    /// Finish a line: `plain` normally, a newline plus heredoc bodies when
    /// some are pending.
    fn end_line(&mut self, plain: &str) {
        if self.pending.is_empty() {
            self.out.push_str(plain);
        } else {
            self.out.push('\n');
            self.flush_heredocs();
        }
    }

    fn items(&mut self, items: &[Node]) {
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                let after_background = matches!(items[idx - 1], Node::Background(_));
                self.end_line(if after_background { " " } else { "; " });
            }
            self.node(item);
        }
    }

    /// A body followed by the separator that closes it.
    fn body(&mut self, node: &Node) {
        match node {
            Node::List(items) => {
                self.items(items);
                let after_background = matches!(items.last(), Some(Node::Background(_)));
                self.end_line(if after_background { " " } else { "; " });
            }
            other => {
                self.node(other);
                self.end_line("; ");
            }
        }
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Command(cmd) => self.command(cmd),
            Node::Pipeline(pipeline) => {
                if pipeline.negated {
                    self.out.push_str("! ");
                }
                for (idx, stage) in pipeline.stages.iter().enumerate() {
                    if idx > 0 {
                        self.out.push_str(" | ");
                    }
                    self.node(stage);
                }
            }
            Node::And(left, right) => {
                self.node(left);
                self.out.push_str(" && ");
                self.node(right);
            }
            Node::Or(left, right) => {
                self.node(left);
                self.out.push_str(" || ");
                self.node(right);
            }
            Node::List(items) => self.items(items),
            Node::Background(inner) => {
                self.node(inner);
                self.out.push_str(" &");
            }
            Node::If(if_node) => {
                for (idx, (condition, body)) in if_node.branches.iter().enumerate() {
                    self.out.push_str(if idx == 0 { "if " } else { "elif " });
                    self.body(condition);
                    self.out.push_str("then ");
                    self.body(body);
                }
                if let Some(else_branch) = &if_node.else_branch {
                    self.out.push_str("else ");
                    self.body(else_branch);
                }
                self.out.push_str("fi");
            }
            Node::While(loop_node) | Node::Until(loop_node) => {
                self.out.push_str(if matches!(node, Node::While(_)) {
                    "while "
                } else {
                    "until "
                });
                self.body(&loop_node.condition);
                self.out.push_str("do ");
                self.body(&loop_node.body);
                self.out.push_str("done");
            }
            Node::For(for_node) => {
                self.out.push_str("for ");
                self.out.push_str(&for_node.var);
                if let Some(words) = &for_node.words {
                    self.out.push_str(" in");
                    for word in words {
                        self.out.push(' ');
                        self.out.push_str(word.as_str());
                    }
                }
                self.out.push_str("; do ");
                self.body(&for_node.body);
                self.out.push_str("done");
            }
            Node::Case(case) => {
                self.out.push_str("case ");
                self.out.push_str(case.word.as_str());
                self.out.push_str(" in");
                for arm in &case.arms {
                    self.out.push(' ');
                    let patterns: Vec<&str> = arm.patterns.iter().map(|p| p.as_str()).collect();
                    self.out.push_str(&patterns.join(" | "));
                    self.out.push(')');
                    if let Some(body) = &arm.body {
                        self.out.push(' ');
                        match body {
                            Node::List(items) => self.items(items),
                            other => self.node(other),
                        }
                    }
                    self.end_line(" ");
                    self.out.push_str(";;");
                }
                self.out.push_str(" esac");
            }
            Node::Function(def) => {
                self.out.push_str(&def.name);
                self.out.push('(');
                if let Some(params) = &def.params {
                    let rendered: Vec<String> = params
                        .iter()
                        .map(|param| match &param.default {
                            Some(default) => format!("{}={}", param.name, default),
                            None => param.name.clone(),
                        })
                        .collect();
                    self.out.push_str(&rendered.join(", "));
                }
                self.out.push_str(") ");
                self.node(&def.body);
            }
            Node::Subshell(body) => {
                self.out.push('(');
                match &**body {
                    Node::List(items) => self.items(items),
                    other => self.node(other),
                }
                self.end_line("");
                self.out.push(')');
            }
            Node::BraceGroup(body) => {
                self.out.push_str("{ ");
                self.body(body);
                self.out.push('}');
            }
            Node::Redirected(inner, redirects) => {
                self.node(inner);
                for redirect in redirects {
                    self.out.push(' ');
                    self.redirect(redirect);
                }
            }
        }
    }

    fn command(&mut self, cmd: &SimpleCommand) {
        let mut first = true;
        let mut space = |out: &mut String| {
            if !first {
                out.push(' ');
            }
            first = false;
        };
        for assignment in &cmd.assignments {
            space(&mut self.out);
            self.out.push_str(&assignment.name);
            self.out.push('=');
            self.out.push_str(assignment.value.as_str());
        }
        for word in &cmd.words {
            space(&mut self.out);
            self.out.push_str(word.as_str());
        }
        for redirect in &cmd.redirects {
            space(&mut self.out);
            self.redirect(redirect);
        }
    }

    fn redirect(&mut self, redirect: &Redirect) {
        if let Some(fd) = redirect.fd {
            self.out.push_str(&fd.to_string());
        }
        self.out.push_str(redirect.op.symbol());
        self.out.push_str(redirect.target.as_str());
        if let RedirectOp::HereDoc { .. } = redirect.op {
            let content = redirect
                .heredoc
                .as_ref()
                .map(|doc| doc.content.clone())
                .unwrap_or_default();
            self.pending
                .push((content, unquote_delimiter(redirect.target.as_str())));
        }
    }
}
