//! Table rendering for the CLI's human-readable output.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use docflow_protocol::{Notification, Submission};

pub fn submissions_table(submissions: &[Submission]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "STATE", "TEAM", "SUBMITTER", "FILENAME", "SUBMITTED"]);

    for s in submissions {
        table.add_row(vec![
            Cell::new(s.id.as_str()),
            Cell::new(s.state),
            Cell::new(&s.submitter_team),
            Cell::new(&s.submitter_username),
            Cell::new(&s.original_filename),
            Cell::new(s.submitted_at.to_rfc3339()),
        ]);
    }
    table
}

pub fn notifications_table(notifications: &[Notification]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "KIND", "SUBMISSION", "AT", "READ"]);

    for n in notifications {
        table.add_row(vec![
            Cell::new(n.id.as_str()),
            Cell::new(n.kind.as_str()),
            Cell::new(n.submission_id.as_ref().map(|s| s.as_str()).unwrap_or("-")),
            Cell::new(n.at.to_rfc3339()),
            Cell::new(if n.read { "read" } else { "unread" }),
        ]);
    }
    table
}
