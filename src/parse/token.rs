//! Token kinds produced by the lexer.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Then,
    Elif,
    Else,
    Fi,
    While,
    Until,
    For,
    In,
    Do,
    Done,
    Case,
    Esac,
    Function,
    LBrace,
    RBrace,
    Bang,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Keyword> {
        let kw = match word {
            "if" => Keyword::If,
            "then" => Keyword::Then,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "fi" => Keyword::Fi,
            "while" => Keyword::While,
            "until" => Keyword::Until,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "do" => Keyword::Do,
            "done" => Keyword::Done,
            "case" => Keyword::Case,
            "esac" => Keyword::Esac,
            "function" => Keyword::Function,
            "{" => Keyword::LBrace,
            "}" => Keyword::RBrace,
            "!" => Keyword::Bang,
            _ => return None,
        };
        Some(kw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::Fi => "fi",
            Keyword::While => "while",
            Keyword::Until => "until",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Do => "do",
            Keyword::Done => "done",
            Keyword::Case => "case",
            Keyword::Esac => "esac",
            Keyword::Function => "function",
            Keyword::LBrace => "{",
            Keyword::RBrace => "}",
            Keyword::Bang => "!",
        }
    }

    /// A command may start right after this keyword.
    pub fn opens_command(&self) -> bool {
        !matches!(
            self,
            Keyword::Fi
                | Keyword::Done
                | Keyword::Esac
                | Keyword::RBrace
                | Keyword::For
                | Keyword::Case
                | Keyword::In
                | Keyword::Function
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Word,
    /// A word that is a single `'...'` span.
    LiteralString,
    /// A word that is a single `"..."` span.
    ExpandableString,
    /// A word that is a single `$(...)` or backquoted span.
    CommandSubst,
    Keyword(Keyword),
    Newline,
    Semicolon,
    DoubleSemicolon,
    Ampersand,
    Pipe,
    LogicalAnd,
    LogicalOr,
    LParen,
    RParen,
    Less,
    Great,
    DGreat,
    DLess,
    DLessDash,
    TLess,
    LessAnd,
    GreatAnd,
    AndGreat,
    AndDGreat,
    Error,
    Eof,
}

impl TokenKind {
    pub fn is_word(&self) -> bool {
        matches!(
            self,
            TokenKind::Word
                | TokenKind::LiteralString
                | TokenKind::ExpandableString
                | TokenKind::CommandSubst
        )
    }

    pub fn is_redirect(&self) -> bool {
        matches!(
            self,
            TokenKind::Less
                | TokenKind::Great
                | TokenKind::DGreat
                | TokenKind::DLess
                | TokenKind::DLessDash
                | TokenKind::TLess
                | TokenKind::LessAnd
                | TokenKind::GreatAnd
                | TokenKind::AndGreat
                | TokenKind::AndDGreat
        )
    }

    /// The lexer is at command position after this token.
    pub(crate) fn opens_command(&self) -> bool {
        match self {
            TokenKind::Newline
            | TokenKind::Semicolon
            | TokenKind::DoubleSemicolon
            | TokenKind::Ampersand
            | TokenKind::Pipe
            | TokenKind::LogicalAnd
            | TokenKind::LogicalOr
            | TokenKind::LParen
            | TokenKind::RParen => true,
            TokenKind::Keyword(kw) => kw.opens_command(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text. For `Error` tokens, the diagnostic message.
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Token {
    /// Descriptor prefix of a redirection operator such as `2>`.
    pub fn io_number(&self) -> Option<i32> {
        if !self.kind.is_redirect() {
            return None;
        }
        let digits: String = self.text.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Eof => write!(f, "end of file"),
            _ => write!(f, "`{}'", self.text),
        }
    }
}
