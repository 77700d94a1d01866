//! `test` and `[`.
//!
//! Up to four operands follow the POSIX rules that decide by argument count;
//! longer expressions go through a small recursive-descent parser with
//! `!`, `-a`, `-o` and parentheses.

use std::fs::{self, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};

use nix::unistd::{access, AccessFlags};

use crate::error::{ShellError, ShellResult};
use crate::execution::{Executor, Flow};

use super::status;

pub(super) fn test(_exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let name = argv[0].as_str();
    let mut args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
    if name == "[" {
        if args.last() != Some(&"]") {
            return Err(ShellError::execution("[: missing `]'").with_status(2));
        }
        args.pop();
    }
    match evaluate(&args) {
        Ok(true) => status(0),
        Ok(false) => status(1),
        Err(message) => Err(ShellError::execution(format!("{}: {}", name, message)).with_status(2)),
    }
}

/// Evaluate a test expression. `Err` carries a syntax message.
pub fn evaluate(args: &[&str]) -> Result<bool, String> {
    match args {
        [] => Ok(false),
        [single] => Ok(!single.is_empty()),
        ["!", operand] => Ok(operand.is_empty()),
        [op, operand] if is_unary(op) => unary(op, operand),
        [op, _] => Err(format!("{}: unary operator expected", op)),
        [left, op, right] if is_binary(op) => binary(left, op, right),
        ["!", rest @ ..] if args.len() == 3 => evaluate(rest).map(|value| !value),
        ["(", inner, ")"] => Ok(!inner.is_empty()),
        [_, op, _] => Err(format!("{}: binary operator expected", op)),
        ["!", rest @ ..] if args.len() == 4 => evaluate(rest).map(|value| !value),
        ["(", inner @ .., ")"] if args.len() == 4 => evaluate(inner),
        _ => {
            let mut parser = ExprParser { args, pos: 0 };
            let value = parser.or_expr()?;
            match parser.args.get(parser.pos) {
                None => Ok(value),
                Some(extra) => Err(format!("{}: unexpected argument", extra)),
            }
        }
    }
}

struct ExprParser<'a> {
    args: &'a [&'a str],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.args.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<&'a str, String> {
        let arg = self.peek().ok_or_else(|| "argument expected".to_string())?;
        self.pos += 1;
        Ok(arg)
    }

    fn or_expr(&mut self) -> Result<bool, String> {
        let mut value = self.and_expr()?;
        while self.peek() == Some("-o") {
            self.pos += 1;
            let right = self.and_expr()?;
            value = value || right;
        }
        Ok(value)
    }

    fn and_expr(&mut self) -> Result<bool, String> {
        let mut value = self.not_expr()?;
        while self.peek() == Some("-a") {
            self.pos += 1;
            let right = self.not_expr()?;
            value = value && right;
        }
        Ok(value)
    }

    fn not_expr(&mut self) -> Result<bool, String> {
        if self.peek() == Some("!") {
            self.pos += 1;
            return Ok(!self.not_expr()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool, String> {
        let first = self.next()?;
        if first == "(" {
            let value = self.or_expr()?;
            return match self.next() {
                Ok(")") => Ok(value),
                _ => Err("`)' expected".to_string()),
            };
        }
        if let Some(op) = self.peek().filter(|op| is_binary(op)) {
            self.pos += 1;
            let right = self.next()?;
            return binary(first, op, right);
        }
        if is_unary(first) {
            if let Some(operand) = self.peek() {
                self.pos += 1;
                return unary(first, operand);
            }
        }
        Ok(!first.is_empty())
    }
}

fn is_unary(op: &str) -> bool {
    matches!(
        op,
        "-b" | "-c" | "-d" | "-e" | "-f" | "-g" | "-h" | "-k" | "-L" | "-n" | "-p" | "-r"
            | "-s" | "-S" | "-t" | "-u" | "-w" | "-x" | "-z"
    )
}

fn is_binary(op: &str) -> bool {
    matches!(
        op,
        "=" | "==" | "!=" | "<" | ">" | "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" | "-nt"
            | "-ot" | "-ef"
    )
}

fn unary(op: &str, operand: &str) -> Result<bool, String> {
    let meta = || fs::metadata(operand).ok();
    let has = |check: fn(&Metadata) -> bool| meta().is_some_and(|meta| check(&meta));
    let value = match op {
        "-n" => !operand.is_empty(),
        "-z" => operand.is_empty(),
        "-e" => meta().is_some(),
        "-f" => has(|meta| meta.is_file()),
        "-d" => has(|meta| meta.is_dir()),
        "-b" => has(|meta| meta.file_type().is_block_device()),
        "-c" => has(|meta| meta.file_type().is_char_device()),
        "-p" => has(|meta| meta.file_type().is_fifo()),
        "-S" => has(|meta| meta.file_type().is_socket()),
        "-s" => has(|meta| meta.len() > 0),
        "-g" => has(|meta| meta.permissions().mode() & 0o2000 != 0),
        "-u" => has(|meta| meta.permissions().mode() & 0o4000 != 0),
        "-k" => has(|meta| meta.permissions().mode() & 0o1000 != 0),
        "-h" | "-L" => fs::symlink_metadata(operand)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false),
        "-r" => access(operand, AccessFlags::R_OK).is_ok(),
        "-w" => access(operand, AccessFlags::W_OK).is_ok(),
        "-x" => access(operand, AccessFlags::X_OK).is_ok(),
        "-t" => {
            let fd = integer(operand)?;
            i32::try_from(fd).is_ok_and(|fd| unsafe { libc::isatty(fd) } == 1)
        }
        _ => return Err(format!("{}: unary operator expected", op)),
    };
    Ok(value)
}

fn binary(left: &str, op: &str, right: &str) -> Result<bool, String> {
    let value = match op {
        "=" | "==" => left == right,
        "!=" => left != right,
        "<" => left < right,
        ">" => left > right,
        "-eq" => integer(left)? == integer(right)?,
        "-ne" => integer(left)? != integer(right)?,
        "-lt" => integer(left)? < integer(right)?,
        "-le" => integer(left)? <= integer(right)?,
        "-gt" => integer(left)? > integer(right)?,
        "-ge" => integer(left)? >= integer(right)?,
        "-nt" => match (modified(left), modified(right)) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            _ => false,
        },
        "-ot" => match (modified(left), modified(right)) {
            (Some(a), Some(b)) => a < b,
            (None, Some(_)) => true,
            _ => false,
        },
        "-ef" => match (fs::metadata(left), fs::metadata(right)) {
            (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
            _ => false,
        },
        _ => return Err(format!("{}: binary operator expected", op)),
    };
    Ok(value)
}

fn integer(text: &str) -> Result<i64, String> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| format!("{}: integer expression expected", text))
}

fn modified(path: &str) -> Option<std::time::SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(args: &[&str]) -> Result<bool, String> {
        evaluate(args)
    }

    #[test]
    fn argument_count_rules() {
        assert_eq!(eval(&[]), Ok(false));
        assert_eq!(eval(&[""]), Ok(false));
        assert_eq!(eval(&["-n"]), Ok(true));
        assert_eq!(eval(&["!", ""]), Ok(true));
        assert_eq!(eval(&["-z", ""]), Ok(true));
        assert_eq!(eval(&["a", "=", "a"]), Ok(true));
        assert_eq!(eval(&["!", "a", "=", "b"]), Ok(true));
        assert_eq!(eval(&["(", "x", ")"]), Ok(true));
        assert!(eval(&["a", "b"]).is_err());
    }

    #[test]
    fn integers() {
        assert_eq!(eval(&["10", "-gt", "9"]), Ok(true));
        assert_eq!(eval(&[" 3", "-eq", "3"]), Ok(true));
        assert!(eval(&["x", "-lt", "1"])
            .unwrap_err()
            .contains("integer expression expected"));
    }

    #[test]
    fn compound_expressions() {
        assert_eq!(eval(&["a", "=", "a", "-a", "b", "=", "c"]), Ok(false));
        assert_eq!(eval(&["a", "=", "a", "-o", "b", "=", "c"]), Ok(true));
        assert_eq!(
            eval(&["!", "(", "1", "-eq", "2", ")", "-a", "-n", "x"]),
            Ok(true)
        );
        assert!(eval(&["(", "a", "=", "a", "-a", "b"]).is_err());
    }

    #[test]
    fn file_predicates() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, "data").unwrap();
        let file = file.to_str().unwrap();
        let dir_path = dir.path().to_str().unwrap();
        assert_eq!(eval(&["-f", file]), Ok(true));
        assert_eq!(eval(&["-d", dir_path]), Ok(true));
        assert_eq!(eval(&["-s", file]), Ok(true));
        assert_eq!(eval(&["-e", "/no/such/path"]), Ok(false));
        assert_eq!(eval(&[file, "-ef", file]), Ok(true));
    }

    #[test]
    fn bracket_needs_closing() {
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("[ a = a ]"), 0);
        assert_eq!(exec.run_source("[ a = b ]"), 1);
        assert_eq!(exec.run_source("[ a = a"), 2);
        assert_eq!(exec.run_source("test 1 -lt x"), 2);
    }
}
