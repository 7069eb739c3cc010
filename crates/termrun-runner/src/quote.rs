//! Shell quoting for code passed through a `/bin/sh -c` wrapper.

use termrun_core::Invocation;

/// Quote `text` as one POSIX shell word.
///
/// The text is wrapped in single quotes; every embedded single quote is
/// written as close-quote, escaped quote, reopen-quote (`'\''`).
///
/// ```
/// use termrun_runner::shell_quote;
///
/// assert_eq!(shell_quote("print('hi')"), r"'print('\''hi'\'')'");
/// ```
pub fn shell_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for ch in text.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote only when the word contains characters the shell would interpret.
fn shell_word(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c));
    if plain {
        word.to_string()
    } else {
        shell_quote(word)
    }
}

/// Render the full command line for `invocation` running `code`.
///
/// Used both as the script for the PTY wrapper and as the echo line
/// written into a session buffer before any output.
pub fn command_line(invocation: &Invocation, code: &str) -> String {
    let mut line = shell_word(&invocation.command);
    for arg in &invocation.arg_prefix {
        line.push(' ');
        line.push_str(&shell_word(arg));
    }
    line.push(' ');
    line.push_str(&shell_quote(code));
    line
}


#[cfg(all(test, unix))]
mod shell_tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_quoted_code_survives_shell() {
        let code = "printf '%s' \"it's $((1+1))\"";
        let inv = Invocation::new("sh", ["-c"]);
        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(command_line(&inv, code))
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "it's 2");
    }
}
