//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use meridian_core::{DateKey, StatusSnapshot, Task};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// One day's tasks and memo, as printed by `task list`
#[derive(Debug, Serialize)]
pub struct DayView<'a> {
    pub date: DateKey,
    pub tasks: &'a [Task],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<&'a str>,
    pub completed: bool,
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to encode output: {}", e),
        }
    }

    /// Print one day
    pub fn print_day(&self, day: &DayView<'_>) {
        match self.format {
            OutputFormat::Human => {
                let marker = if day.completed { " ✓" } else { "" };
                println!("{}{}", day.date.format("%Y-%m-%d (%a)"), marker);
                if day.tasks.is_empty() {
                    println!("  No tasks.");
                }
                for task in day.tasks {
                    print_task_line(task);
                }
                if let Some(memo) = day.memo {
                    println!();
                    for line in memo.lines() {
                        println!("  │ {}", line);
                    }
                }
            }
            OutputFormat::Json => self.json(day),
            OutputFormat::Quiet => {
                for task in day.tasks {
                    println!("{}", task.id);
                }
            }
        }
    }

    /// Print several days
    pub fn print_days(&self, days: &[DayView<'_>]) {
        match self.format {
            OutputFormat::Human => {
                if days.is_empty() {
                    println!("No tasks found.");
                    return;
                }
                for (i, day) in days.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    self.print_day(day);
                }
                let total: usize = days.iter().map(|d| d.tasks.len()).sum();
                println!("\n{} task(s) on {} day(s)", total, days.len());
            }
            OutputFormat::Json => self.json(days),
            OutputFormat::Quiet => {
                for day in days {
                    self.print_day(day);
                }
            }
        }
    }

    /// Print a single task
    pub fn print_task(&self, date: DateKey, task: &Task) {
        match self.format {
            OutputFormat::Human => {
                print!("{} ", date.format("%Y-%m-%d"));
                print_task_line(task);
            }
            OutputFormat::Json => {
                self.json(&serde_json::json!({ "date": date, "task": task }));
            }
            OutputFormat::Quiet => println!("{}", task.id),
        }
    }

    /// Print the current sync status
    pub fn print_status(&self, status: &StatusSnapshot) {
        match self.format {
            OutputFormat::Human => {
                let icon = match status.status.as_str() {
                    "saved" => "✓",
                    "error" => "✗",
                    "saving" | "syncing" => "↻",
                    _ => "•",
                };
                println!("{} {} - {}", icon, status.status, status.message);
            }
            OutputFormat::Json => self.json(status),
            OutputFormat::Quiet => println!("{}", status.status),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr
    pub fn warning(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"status": "warning", "message": message}));
            }
            OutputFormat::Human | OutputFormat::Quiet => eprintln!("⚠ {}", message),
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_task_line(task: &Task) {
    let check = if task.completed { "x" } else { " " };
    println!("  [{}] {:>4}  {}", check, task.id, truncate(&task.text, 70));
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
