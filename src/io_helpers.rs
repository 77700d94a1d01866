use std::io::{self, Write};

/// Strip trailing newlines from command substitution output.
pub fn strip_trailing_newlines(mut output: String) -> String {
    while output.ends_with('\n') {
        output.pop();
    }
    output
}

/// Quote `text` so the shell reads it back as one literal word.
pub fn shell_quote(text: &str) -> String {
    let safe = !text.is_empty()
        && text
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | '/' | ':' | ',' | '+' | '@' | '%' | '='));
    if safe {
        return text.to_string();
    }
    format!("'{}'", text.replace('\'', "'\\''"))
}

/// Write to standard output and flush. A closed pipe is not an error.
///
/// Builtins write through here so output lands on whatever fd 1 currently
/// is, including redirections applied with `dup2`.
pub fn write_stdout(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        result => result,
    }
}

pub fn write_stderr(text: &str) -> io::Result<()> {
    let mut err = io::stderr().lock();
    err.write_all(text.as_bytes())?;
    err.flush()
}

/// `No such file or directory` rather than `... (os error 2)`.
pub fn os_message(err: &io::Error) -> String {
    let text = err.to_string();
    match text.find(" (os error") {
        Some(idx) => text[..idx].to_string(),
        None => text,
    }
}

/// `posish: message` on stderr.
pub fn report(message: impl std::fmt::Display) {
    let _ = write_stderr(&format!("posish: {}\n", message));
}

/// Flush both standard streams before forking so buffered output is not
/// written twice.
pub fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("plain"), "plain");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn trailing_newlines() {
        assert_eq!(strip_trailing_newlines("a\nb\n\n".into()), "a\nb");
        assert_eq!(strip_trailing_newlines(String::new()), "");
    }
}
