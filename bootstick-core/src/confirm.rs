//! The gate every destructive run passes through.
//!
//! Identifiers can be recycled or ambiguous (Windows disk numbers in
//! particular), so the operator must type back the exact identifier that is
//! about to be erased, or the fixed [`ACK_TOKEN`].
use crate::error::Aborted;
use std::io;

/// Literal acknowledgment accepted in place of the identifier.
pub const ACK_TOKEN: &str = "YES";

/// Whether `answer` acknowledges `target`. Comparison is exact: no trimming
/// beyond the line terminator and no case folding.
pub fn is_acknowledged(target: &str, answer: &str) -> bool {
    let answer = answer.trim_end_matches(['\r', '\n']);
    !answer.is_empty() && (answer == target || answer == ACK_TOKEN)
}

/// Asks the operator to acknowledge `target`.
///
/// `prompt` is shown the literal identifier and returns what the operator
/// typed. With `auto_yes` the prompt is never called; that is the caller
/// explicitly opting out of the interactive safety net. A prompt I/O failure
/// counts as a refusal.
pub fn confirm<P>(target: &str, auto_yes: bool, prompt: P) -> Result<(), Aborted>
where
    P: FnOnce(&str) -> io::Result<String>,
{
    if auto_yes {
        log::warn!("confirmation for {target} skipped (--yes)");
        return Ok(());
    }

    let aborted = || Aborted {
        target: target.to_string(),
    };
    match prompt(target) {
        Ok(answer) if is_acknowledged(target, &answer) => Ok(()),
        Ok(answer) => {
            log::info!("confirmation for {target} refused (answer {answer:?})");
            Err(aborted())
        }
        Err(e) => {
            log::info!("confirmation prompt failed: {e}");
            Err(aborted())
        }
    }
}
