//! Interactive confirmation before destructive actions.

use std::io::{self, BufRead, Write};

use crate::error::Result;

/// What to do when a build directory already has content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReusePolicy {
    /// Ask on the terminal.
    Prompt,
    /// Empty it without asking.
    Always,
    /// Never touch it.
    Never,
}

impl ReusePolicy {
    /// Decide whether the existing directory may be emptied.
    pub fn confirm(&self, question: &str) -> Result<bool> {
        match self {
            ReusePolicy::Always => Ok(true),
            ReusePolicy::Never => Ok(false),
            ReusePolicy::Prompt => {
                let stdin = io::stdin();
                let mut stdout = io::stdout();
                ask(question, &mut stdin.lock(), &mut stdout)
            }
        }
    }
}

fn ask<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> Result<bool> {
    writeln!(output, "{}", question)?;
    write!(output, "[y/n] ? ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().to_lowercase().starts_with('y'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_accepts_yes() {
        let mut out = Vec::new();
        assert!(ask("Reuse?", &mut "Yes\n".as_bytes(), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().contains("Reuse?"));
    }

    #[test]
    fn test_ask_rejects_anything_else() {
        let mut out = Vec::new();
        assert!(!ask("Reuse?", &mut "\n".as_bytes(), &mut out).unwrap());
        assert!(!ask("Reuse?", &mut "nope\n".as_bytes(), &mut out).unwrap());
    }

    #[test]
    fn test_fixed_policies() {
        assert!(ReusePolicy::Always.confirm("q").unwrap());
        assert!(!ReusePolicy::Never.confirm("q").unwrap());
    }
}
