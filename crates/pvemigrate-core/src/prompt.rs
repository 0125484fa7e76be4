//! Interactive operator prompts.

use std::io::{BufRead, Write};

use crate::error::{Error, Result};

/// Source of operator answers.
pub trait Prompter {
    /// Ask `question`, showing `default` when present.
    ///
    /// Returns the trimmed answer, or `None` once input is exhausted.
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<Option<String>>;

    /// Print an informational line to the operator.
    fn notify(&mut self, message: &str) -> Result<()>;
}

/// Line-oriented prompter over any reader/writer pair.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Consume the prompter, returning the output writer.
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<Option<String>> {
        match default {
            Some(default) => write!(self.output, "{} [{}]: ", question, default)?,
            None => write!(self.output, "{}: ", question)?,
        }
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        Ok(())
    }
}

/// Ask a yes/no question until a recognizable answer is given.
pub fn confirm(prompter: &mut dyn Prompter, question: &str) -> Result<bool> {
    loop {
        let answer = prompter
            .ask(&format!("{} (y/n)", question), None)?
            .ok_or_else(|| Error::prompt(format!("no answer to '{}'", question)))?;

        match answer.to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => prompter.notify("Please answer 'y' or 'n'.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> LinePrompter<Cursor<Vec<u8>>, Vec<u8>> {
        LinePrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_ask_shows_default() {
        let mut p = prompter("\n");
        let answer = p.ask("Storage", Some("local-lvm")).unwrap();
        assert_eq!(answer, Some(String::new()));
        assert_eq!(String::from_utf8(p.into_output()).unwrap(), "Storage [local-lvm]: ");
    }

    #[test]
    fn test_ask_trims_answer() {
        let mut p = prompter("  web01  \n");
        assert_eq!(p.ask("VM name", None).unwrap(), Some("web01".to_string()));
    }

    #[test]
    fn test_ask_end_of_input() {
        let mut p = prompter("");
        assert_eq!(p.ask("VM name", None).unwrap(), None);
    }

    #[test]
    fn test_confirm_yes_and_no() {
        assert!(confirm(&mut prompter("y\n"), "Overwrite?").unwrap());
        assert!(confirm(&mut prompter("YES\n"), "Overwrite?").unwrap());
        assert!(!confirm(&mut prompter("n\n"), "Overwrite?").unwrap());
    }

    #[test]
    fn test_confirm_reasks_on_garbage() {
        let mut p = prompter("maybe\n\nno\n");
        assert!(!confirm(&mut p, "Overwrite?").unwrap());
        let out = String::from_utf8(p.into_output()).unwrap();
        assert_eq!(out.matches("Please answer").count(), 2);
    }

    #[test]
    fn test_confirm_eof_is_error() {
        let err = confirm(&mut prompter("what\n"), "Overwrite?").unwrap_err();
        assert!(matches!(err, Error::Prompt { .. }));
    }
}
