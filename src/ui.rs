use colored::Colorize;
use declarative::{Action, ActionKind};
use std::fmt::Display;

// ============================================================================
// Terminal output (plan)
// ============================================================================

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print one planned action
pub fn action<R: Display>(action: &Action<R>) {
    let kind = action.kind();
    let label = format!("{:<8}", kind.to_string());
    let label = match kind {
        ActionKind::Install => label.green(),
        ActionKind::Remove => label.red(),
        ActionKind::Move => label.yellow(),
        ActionKind::Update => label.blue(),
    };
    match action {
        Action::Move { from, to } => println!("  {label} {from} {} {to}", "->".dimmed()),
        other => println!("  {label} {}", other.target()),
    }
}

// ============================================================================
// Log output (boot)
// ============================================================================

/// Log every item as a branch of a tree under the previous line
pub fn log_tree<T: Display>(level: log::Level, items: &[T]) {
    for item in items {
        log::log!(level, "└─ {item}");
    }
}

/// Headline of a category summary, e.g. `nodes: 3/4 success`
pub fn summary_line(category: &str, succeeded: usize, total: usize) -> String {
    format!("{category}: {succeeded}/{total} success")
}

/// Detail lines of a category summary, skipping zero counts
pub fn summary_details(counts: &[(&str, usize)]) -> Vec<String> {
    counts
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(label, n)| format!("{label}: {n}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        assert_eq!(summary_line("nodes", 3, 4), "nodes: 3/4 success");
    }

    #[test]
    fn test_summary_details_skip_zero() {
        let lines = summary_details(&[("installed", 2), ("removed", 0), ("existing", 1)]);
        assert_eq!(lines, vec!["installed: 2", "existing: 1"]);
    }

    #[test]
    fn test_summary_details_empty() {
        assert!(summary_details(&[("moved", 0)]).is_empty());
    }
}
