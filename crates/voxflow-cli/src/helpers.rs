//! Shared CLI helpers — path expansion, output printing, version banner.

use std::path::PathBuf;

use colored::Colorize;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Print one bot utterance.
pub fn print_bot(text: &str) {
    println!("{} {}", "Bot:".cyan().bold(), text);
}

/// Print the banner shown at session start.
pub fn print_banner(flow: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Voxflow".cyan().bold(), version.dimmed());
    let hint = format!(
        "Console session, flow \"{flow}\". Your lines play the caller; \"exit\" hangs up."
    );
    println!("{}", hint.as_str().dimmed());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_home() {
        let result = expand_tilde("~/foo/bar");
        assert!(result.ends_with("foo/bar"));
        assert!(!result.starts_with("~"));
    }

    #[test]
    fn expand_tilde_no_tilde() {
        let result = expand_tilde("/absolute/path");
        assert_eq!(result, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn expand_tilde_empty() {
        assert_eq!(expand_tilde(""), PathBuf::from(""));
    }
}
