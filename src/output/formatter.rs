use colored::Colorize;

// All human-facing lines go to stderr: stdout is reserved for data output
// (snapshots and instance JSON).

/// Print a success message.
pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green().bold(), msg.green());
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg.red());
}

/// Render one per-section result line.
pub fn section_line(label: &str, exit_code: i32, message: &str) -> String {
    if exit_code == 0 {
        format!("  - {label}: ok")
    } else if message.is_empty() {
        format!("  - {label}: error (exit {exit_code})")
    } else {
        format!("  - {label}: error (exit {exit_code}): {message}")
    }
}

/// Print a per-section result line, coloured by outcome.
pub fn print_section_line(label: &str, exit_code: i32, message: &str) {
    let line = section_line(label, exit_code, message);
    if exit_code == 0 {
        eprintln!("{}", line.green());
    } else {
        eprintln!("{}", line.red());
    }
}
