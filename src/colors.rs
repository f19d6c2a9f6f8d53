//! Terminal color control and the handful of status-line shapes the CLI prints.
//!
//! **Environment Variables**:
//! - `NO_COLOR`: If set (to any value), disable colors
//! - `CLICOLOR`: If set to 0, disable colors
//! - `CLICOLOR_FORCE`: If set to non-zero, force colors even when not a TTY
use colored::{Colorize, control};

/// Configure color output once, early in `main`.
pub fn init_colors() {
    control::set_override(colors_enabled(
        std::env::var("NO_COLOR").ok().as_deref(),
        std::env::var("CLICOLOR").ok().as_deref(),
        std::env::var("CLICOLOR_FORCE").ok().as_deref(),
        std::io::IsTerminal::is_terminal(&std::io::stdout()),
    ));
}

fn colors_enabled(
    no_color: Option<&str>,
    clicolor: Option<&str>,
    clicolor_force: Option<&str>,
    is_tty: bool,
) -> bool {
    // NO_COLOR takes precedence over everything (https://no-color.org/)
    if no_color.is_some() {
        return false;
    }
    if clicolor_force.is_some_and(|v| v != "0") {
        return true;
    }
    if clicolor == Some("0") {
        return false;
    }
    is_tty
}

/// `==> message` section header
pub fn heading(message: &str) {
    println!("{} {}", "==>".bold().blue(), message.bold());
}

pub fn success(message: &str) {
    println!("  {} {}", "✓".green(), message);
}

pub fn failure(message: &str) {
    eprintln!("  {} {}", "✗".red(), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), message);
}
