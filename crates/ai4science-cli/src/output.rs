//! Output formatting for the CLI.

use clap::ValueEnum;
use serde_json::{json, Value};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => println!("{}", status_json("success", message)),
    }
}

/// Print an error message, with an optional hint on how to recover.
pub fn print_error(message: &str, hint: Option<&str>, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
            if let Some(hint) = hint {
                eprintln!("{}", hint);
            }
        }
        OutputFormat::Json => {
            let mut value = status_json("error", message);
            if let Some(hint) = hint {
                value["hint"] = Value::from(hint);
            }
            eprintln!("{}", value);
        }
    }
}

/// Print a JSON document.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{}", value),
    }
}

/// Print a table row.
pub fn print_row(label: &str, value: &str) {
    println!("{:<10} {}", format!("{}:", label), value);
}

fn status_json(status: &str, message: &str) -> Value {
    json!({ "status": status, "message": message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_escapes_message() {
        let value = status_json("error", r#"bad "quote""#);
        let text = value.to_string();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["message"], r#"bad "quote""#);
        assert_eq!(parsed["status"], "error");
    }
}
