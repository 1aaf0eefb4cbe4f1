use std::io::{self, Write};

use anyhow::{Context, Result};

/// Print a label and read one trimmed line from stdin.
pub fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

/// Ask a yes/no question. Empty input takes the default.
pub fn confirm(label: &str, default: bool) -> Result<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    let answer = prompt(&format!("{label} [{hint}]"))?;
    if answer.is_empty() {
        return Ok(default);
    }
    Ok(matches!(answer.as_str(), "y" | "Y" | "yes" | "Yes"))
}
