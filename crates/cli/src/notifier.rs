// UI notifier that prints to stdout
//
// Stands in for the app's UI layer during trace replay: one JSON line per
// notification, so replays can be diffed or piped into jq.

use chargeside_session::collaborators::{HapticKind, UiNotification, UiNotifier};
use tracing::{debug, warn};

pub struct StdoutNotifier {
    quiet: bool,
}

impl StdoutNotifier {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl UiNotifier for StdoutNotifier {
    fn notify(&self, notification: UiNotification) {
        if self.quiet {
            return;
        }
        match serde_json::to_string(&notification) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "failed to serialize ui notification"),
        }
    }

    fn trigger_haptic(&self, kind: HapticKind) {
        debug!(?kind, "haptic");
    }
}
