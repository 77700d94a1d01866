//! Syntax tree shared by the parser, the executor and the regenerator.
//!
//! Children are owned (`Box`/`Vec`), so dropping a node releases the whole
//! subtree. Words keep their raw source text, quotes included; expansion
//! happens at execution time. Derived `PartialEq` compares kind, values and
//! children only; source positions are never stored in the tree.

use std::fmt;

/// A word exactly as written in the source, quotes and escapes included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Word(String);

impl Word {
    pub fn new(raw: impl Into<String>) -> Self {
        Word(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The word contains no quoting, escapes or expansions.
    pub fn is_plain(&self) -> bool {
        !self
            .0
            .chars()
            .any(|ch| matches!(ch, '\'' | '"' | '\\' | '$' | '`'))
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Word {
    fn from(raw: &str) -> Self {
        Word::new(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    /// `<`
    Input,
    /// `>`
    Output,
    /// `>>`
    Append,
    /// `<&`
    DupInput,
    /// `>&`
    DupOutput,
    /// `&>`
    OutputAll,
    /// `&>>`
    AppendAll,
    /// `<<` or `<<-`
    HereDoc { strip_tabs: bool },
    /// `<<<`
    HereString,
}

impl RedirectOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            RedirectOp::Input => "<",
            RedirectOp::Output => ">",
            RedirectOp::Append => ">>",
            RedirectOp::DupInput => "<&",
            RedirectOp::DupOutput => ">&",
            RedirectOp::OutputAll => "&>",
            RedirectOp::AppendAll => "&>>",
            RedirectOp::HereDoc { strip_tabs: false } => "<<",
            RedirectOp::HereDoc { strip_tabs: true } => "<<-",
            RedirectOp::HereString => "<<<",
        }
    }

    /// Descriptor the operator applies to when no io-number is given.
    pub fn default_fd(&self) -> i32 {
        match self {
            RedirectOp::Input
            | RedirectOp::DupInput
            | RedirectOp::HereDoc { .. }
            | RedirectOp::HereString => 0,
            _ => 1,
        }
    }
}

/// Body of a here-document, captured at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HereDoc {
    pub content: String,
    /// False when the delimiter was quoted.
    pub expand: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub fd: Option<i32>,
    pub op: RedirectOp,
    /// File name, descriptor number, here-string word or heredoc delimiter.
    pub target: Word,
    pub heredoc: Option<HereDoc>,
}

impl Redirect {
    pub fn fd(&self) -> i32 {
        self.fd.unwrap_or_else(|| self.op.default_fd())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleCommand {
    pub assignments: Vec<Assignment>,
    pub words: Vec<Word>,
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub negated: bool,
    pub stages: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfNode {
    /// `if`/`elif` condition and body pairs, in order.
    pub branches: Vec<(Node, Node)>,
    pub else_branch: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopNode {
    pub condition: Box<Node>,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForNode {
    pub var: String,
    /// `None` when the `in` clause is absent: iterate `"$@"`.
    pub words: Option<Vec<Word>>,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseArm {
    pub patterns: Vec<Word>,
    pub body: Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseNode {
    pub word: Word,
    pub arms: Vec<CaseArm>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    /// Raw default word; the parameter is required when absent.
    pub default: Option<Word>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    /// `None` for the plain `name()` form.
    pub params: Option<Vec<Param>>,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Command(SimpleCommand),
    Pipeline(Pipeline),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    /// Statements separated by `;` or newlines.
    List(Vec<Node>),
    Background(Box<Node>),
    If(IfNode),
    While(LoopNode),
    Until(LoopNode),
    For(ForNode),
    Case(CaseNode),
    Function(FunctionDef),
    Subshell(Box<Node>),
    BraceGroup(Box<Node>),
    /// A compound command followed by redirections.
    Redirected(Box<Node>, Vec<Redirect>),
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Command(_) => "command",
            Node::Pipeline(_) => "pipeline",
            Node::And(_, _) => "and",
            Node::Or(_, _) => "or",
            Node::List(_) => "list",
            Node::Background(_) => "background",
            Node::If(_) => "if",
            Node::While(_) => "while",
            Node::Until(_) => "until",
            Node::For(_) => "for",
            Node::Case(_) => "case",
            Node::Function(_) => "function",
            Node::Subshell(_) => "subshell",
            Node::BraceGroup(_) => "brace-group",
            Node::Redirected(_, _) => "redirected",
        }
    }

    pub fn is_empty_list(&self) -> bool {
        matches!(self, Node::List(items) if items.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words() {
        assert!(Word::new("echo").is_plain());
        assert!(!Word::new("$HOME").is_plain());
        assert!(!Word::new("'a'").is_plain());
    }

    #[test]
    fn redirect_default_fds() {
        let redirect = Redirect {
            fd: None,
            op: RedirectOp::Append,
            target: Word::new("log"),
            heredoc: None,
        };
        assert_eq!(redirect.fd(), 1);
        assert_eq!(RedirectOp::HereString.default_fd(), 0);
        assert_eq!(RedirectOp::HereDoc { strip_tabs: true }.symbol(), "<<-");
    }
}
