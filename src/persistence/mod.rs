//! Configuration file persistence.
//!
//! # Data Flow
//! ```text
//! save:  ConfigTree::render (unannotated) → header + body → file.rs save_to_file
//! load:  file.rs read_config_file → text → config::parse_config
//! ```
//!
//! # Design Decisions
//! - Only regular files that already carry our header are ever overwritten
//! - A failed write removes the truncated file when it can

pub mod file;

use std::time::{SystemTime, UNIX_EPOCH};

pub use file::{read_config_file, save_to_file, PersistError, SaveOptions};

/// Product name written into, and looked for in, the header comment.
pub const HEADER_TAG: &str = "ROUTER-MANAGER";
pub const CONFIG_FORMAT_VERSION: &str = "1.0";

/// Header comment written at the top of every saved configuration.
pub fn header(user: u32) -> String {
    let date = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!(
        "/* {HEADER_TAG} configuration file\n *\n * Configuration format: {CONFIG_FORMAT_VERSION}\n * Manager version: {}\n * Date: {date}\n * Host: {}\n * User: {user}\n */\n\n",
        env!("CARGO_PKG_VERSION"),
        hostname(),
    )
}

/// True when `first_line` is the opening line of one of our headers.
pub fn is_header_line(first_line: &str) -> bool {
    let line = first_line.trim_start();
    line.starts_with("/*") && line[2..].trim_start().starts_with(HEADER_TAG)
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| std::fs::read_to_string("/etc/hostname"))
        .map(|h| h.trim().to_string())
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_recognised() {
        let text = header(1000);
        let first = text.lines().next().unwrap();
        assert!(is_header_line(first));
        assert!(text.contains("* User: 1000\n"));
        assert!(text.ends_with(" */\n\n"));
    }

    #[test]
    fn test_foreign_comment_not_header() {
        assert!(!is_header_line("/* some other tool */"));
        assert!(!is_header_line("interfaces {"));
        assert!(is_header_line("/*ROUTER-MANAGER configuration file"));
    }
}
