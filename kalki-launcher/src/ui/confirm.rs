//! Confirmation and input prompts for destructive operations.

use super::validation;
use anyhow::{anyhow, Context, Result};
use dialoguer::{Confirm, Input};

pub fn confirm_destructive_action(prompt: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation input")
}

pub fn prompt_shrink_gb() -> Result<u32> {
    let input: String = Input::new()
        .with_prompt("Gigabytes to allocate for Kalki OS (minimum 10, recommended 40+)")
        .default("40".to_string())
        .validate_with(|value: &String| validation::parse_shrink_gb(value).map(|_| ()))
        .interact_text()
        .context("Failed to read shrink size")?;
    validation::parse_shrink_gb(&input).map_err(|msg| anyhow!(msg))
}

pub fn prompt_target_drive(default: Option<&str>) -> Result<String> {
    let mut prompt = Input::new()
        .with_prompt("Drive letter of the new Kalki OS partition (e.g. D, E, F)")
        .validate_with(|value: &String| validation::parse_drive_letter(value).map(|_| ()));
    if let Some(default) = default {
        prompt = prompt.default(default.to_string());
    }
    let input: String = prompt.interact_text().context("Failed to read drive letter")?;
    validation::parse_drive_letter(&input).map_err(|msg| anyhow!(msg))
}
