//! Yes/no operator prompts

use std::io::{self, BufRead, Write};

/// Attempts before an unanswered prompt counts as "no"
const MAX_ATTEMPTS: usize = 3;

/// Ask `question` until the answer starts with `y` or `n`.
///
/// End of input, or no valid answer within [`MAX_ATTEMPTS`], is a "no".
pub fn ask_user<R: BufRead, W: Write>(question: &str, mut input: R, mut out: W) -> io::Result<bool> {
    for _ in 0..MAX_ATTEMPTS {
        write!(out, "{} ? (Y/N): ", question)?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }

        match line.trim().to_lowercase().chars().next() {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            _ => writeln!(out, "Please enter Y or N")?,
        }
    }

    Ok(false)
}

/// Ask on the terminal; `assume_yes` skips the question
pub fn confirm(question: &str, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    let stdin = io::stdin();
    ask_user(question, stdin.lock(), io::stdout()).unwrap_or(false)
}
