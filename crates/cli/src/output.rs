// Output formatting for CLI

use anyhow::Result;
use chargeside_session::SessionSnapshot;
use serde::Serialize;

#[derive(Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yaml::to_string(value)?);
            }
            OutputFormat::Text => {
                // Text format is handled by each command
            }
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

/// Print a snapshot in the selected format
pub fn print_snapshot(output: OutputFormat, snapshot: &SessionSnapshot) -> Result<()> {
    if !output.is_text() {
        return output.print_value(snapshot);
    }

    print_field("State", &snapshot.state.to_string());
    if let Some(charger) = &snapshot.targeted_charger {
        print_field(
            "Charger",
            &format!("{} ({:.5}, {:.5})", charger.id, charger.latitude, charger.longitude),
        );
    }
    if let Some(merchant) = &snapshot.merchant_target {
        print_field(
            "Merchant",
            &format!("{} ({:.5}, {:.5})", merchant.id, merchant.latitude, merchant.longitude),
        );
    }
    if let Some(session) = &snapshot.active_session {
        print_field("Session", &session.session_id);
        print_field("Started", &session.started_at.to_rfc3339());
    }
    if let Some(deadline) = snapshot.grace_period_deadline {
        print_field("Grace until", &deadline.to_rfc3339());
    }
    if let Some(deadline) = snapshot.hard_timeout_deadline {
        print_field("Hard timeout", &deadline.to_rfc3339());
    }
    match &snapshot.pending_event {
        Some(pending) => print_field(
            "Pending",
            &format!("{} ({})", pending.event_name, pending.event_id),
        ),
        None => print_field("Pending", "-"),
    }
    print_field("Saved", &snapshot.saved_at.to_rfc3339());
    Ok(())
}
