//! Output helpers for the vitals CLI.

use colored::Colorize;

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

/// Print an informational message to stdout.
pub fn print_info(msg: &str) {
    println!("{} {}", "[INFO]".blue().bold(), msg);
}
