//! User interaction operations (confirmation prompts).

use anyhow::Result;
use std::io::{self, BufRead, Write};

use super::RealRuntime;

/// Reads a yes/no answer from any reader, writing the prompt to any writer.
pub(crate) fn confirm_with_io<R: BufRead, W: Write>(
    prompt: &str,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    write!(output, "{} [y/N] ", prompt)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

impl RealRuntime {
    pub(crate) fn confirm_impl(&self, prompt: &str) -> Result<bool> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        confirm_with_io(prompt, &mut stdin.lock(), &mut stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::confirm_with_io;
    use anyhow::Result;
    use std::io::Cursor;

    #[test]
    fn accepts_yes_answers() -> Result<()> {
        for case in ["y\n", "Y\n", "yes\n", " YES \n"] {
            let mut input = Cursor::new(case.as_bytes());
            let mut output = Vec::new();
            assert!(
                confirm_with_io("Uninstall zlib?", &mut input, &mut output)?,
                "expected '{}' to be accepted",
                case
            );
        }
        Ok(())
    }

    #[test]
    fn rejects_everything_else() -> Result<()> {
        for case in ["n\n", "no\n", "\n", "maybe\n"] {
            let mut input = Cursor::new(case.as_bytes());
            let mut output = Vec::new();
            assert!(!confirm_with_io("Uninstall zlib?", &mut input, &mut output)?);
        }
        Ok(())
    }

    #[test]
    fn writes_prompt_with_default_hint() -> Result<()> {
        let mut input = Cursor::new(b"n\n");
        let mut output = Vec::new();
        confirm_with_io("Uninstall zlib?", &mut input, &mut output)?;
        assert_eq!(String::from_utf8(output)?, "Uninstall zlib? [y/N] ");
        Ok(())
    }
}
