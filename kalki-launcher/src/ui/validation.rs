//! Input guard rails for the interactive prompts.

use kalki_workflow::MIN_SHRINK_GB;

/// Parse a shrink size in gigabytes. Rejects non-numeric input and anything
/// below the workflow minimum before a single privileged operation runs.
pub fn parse_shrink_gb(input: &str) -> Result<u32, String> {
    let trimmed = input.trim();
    let value: u32 = trimmed
        .parse()
        .map_err(|_| format!("'{}' is not a whole number of gigabytes.", trimmed))?;
    if value < MIN_SHRINK_GB {
        return Err(format!(
            "Shrink size must be at least {} GB.",
            MIN_SHRINK_GB
        ));
    }
    Ok(value)
}

/// Normalize a drive identifier ("d", "D", "D:") to a single uppercase
/// letter.
pub fn parse_drive_letter(input: &str) -> Result<String, String> {
    let trimmed = input.trim().trim_end_matches(':');
    if trimmed.len() == 1 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err("Drive identifier must be a single letter, e.g. D.".to_string())
    }
}
