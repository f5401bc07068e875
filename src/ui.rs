//! Status output on stderr.
//!
//! Extracted data goes to stdout so it can be piped; everything else,
//! including progress lines, goes to stderr.

use std::io::Write;

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";

pub fn info(msg: impl AsRef<str>) {
    eprintln!("{}[*]{} {}", BLUE, RESET, msg.as_ref());
}

pub fn success(msg: impl AsRef<str>) {
    eprintln!("{}[+]{} {}", GREEN, RESET, msg.as_ref());
}

pub fn warn(msg: impl AsRef<str>) {
    eprintln!("{}[!]{} {}", YELLOW, RESET, msg.as_ref());
}

pub fn error(msg: impl AsRef<str>) {
    eprintln!("{}[-]{} {}", RED, RESET, msg.as_ref());
}

/// Overwrite the current line with a progress update.
pub fn progress(msg: impl AsRef<str>) {
    eprint!("\r\x1b[K{}[~]{} {}", CYAN, RESET, msg.as_ref());
    let _ = std::io::stderr().flush();
}

/// Finish a progress line.
pub fn progress_done() {
    eprintln!();
}

/// Clear the current progress line without ending it.
pub fn progress_clear() {
    eprint!("\r\x1b[K");
    let _ = std::io::stderr().flush();
}

/// Extracted scalar data, printed to stdout for piping.
pub fn data(msg: impl AsRef<str>) {
    println!("{}", msg.as_ref());
}
