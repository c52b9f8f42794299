//! Notification Service (C7): per-user inboxes, appended to on every
//! decision and on comment activity, polled rather than pushed.

use docflow_ids::NotificationId;
use docflow_store::{DocPath, DocStore, StoreError};
use serde_json::Value;
use std::sync::Arc;

use docflow_protocol::Notification;

pub struct NotificationService {
    store: Arc<DocStore>,
}

impl NotificationService {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }

    fn inbox_doc(username: &str) -> DocPath {
        DocPath::new(format!("notifications/{username}/inbox.json"))
    }

    /// Append a notification, deduplicating by id so at-least-once delivery
    /// never shows the same logical event twice in one inbox.
    pub fn append(&self, notification: &Notification) -> Result<(), StoreError> {
        let doc = Self::inbox_doc(&notification.recipient_username);
        let record = serde_json::to_value(notification).expect("notification always serializes");
        let id = notification.id.clone();

        self.store.modify(&doc, false, move |value| {
            let mut entries = match value.take() {
                Value::Array(entries) => entries,
                _ => Vec::new(),
            };
            let already_present = entries
                .iter()
                .any(|entry| entry_id(entry).as_deref() == Some(id.as_str()));
            if !already_present {
                entries.push(record);
            }
            *value = Value::Array(entries);
            Ok(())
        })
    }

    /// Newest-first notification list for a user.
    pub fn list(&self, username: &str, unread_only: bool) -> Result<Vec<Notification>, StoreError> {
        let doc = Self::inbox_doc(username);
        let value = self.store.read(&doc, false)?;
        let mut notifications: Vec<Notification> = match value {
            Value::Array(entries) => entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect(),
            _ => Vec::new(),
        };
        notifications.sort_by(|a, b| b.at.cmp(&a.at));
        if unread_only {
            notifications.retain(|n| !n.read);
        }
        Ok(notifications)
    }

    pub fn mark_read(&self, username: &str, id: &NotificationId) -> Result<bool, StoreError> {
        let doc = Self::inbox_doc(username);
        let id = id.clone();

        self.store.modify(&doc, false, move |value| {
            let mut found = false;
            if let Value::Array(entries) = value {
                for entry in entries.iter_mut() {
                    if entry_id(entry).as_deref() == Some(id.as_str()) {
                        entry["read"] = Value::Bool(true);
                        found = true;
                    }
                }
            }
            Ok(found)
        })
    }
}

fn entry_id(entry: &Value) -> Option<String> {
    entry.get("id").and_then(|v| v.as_str()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docflow_protocol::NotificationKind;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn append_then_list_newest_first() {
        let temp = TempDir::new().unwrap();
        let service = NotificationService::new(Arc::new(DocStore::new(temp.path().to_path_buf())));

        let first = Notification::new("alice", NotificationKind::SubmittedToTl, None, json!({}), Utc::now());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Notification::new("alice", NotificationKind::TlApproved, None, json!({}), Utc::now());

        service.append(&first).unwrap();
        service.append(&second).unwrap();

        let list = service.list("alice", false).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
    }

    #[test]
    fn append_deduplicates_by_id() {
        let temp = TempDir::new().unwrap();
        let service = NotificationService::new(Arc::new(DocStore::new(temp.path().to_path_buf())));
        let notification = Notification::new("alice", NotificationKind::TlApproved, None, json!({}), Utc::now());

        service.append(&notification).unwrap();
        service.append(&notification).unwrap();

        assert_eq!(service.list("alice", false).unwrap().len(), 1);
    }

    #[test]
    fn mark_read_flips_flag_and_unread_only_filters() {
        let temp = TempDir::new().unwrap();
        let service = NotificationService::new(Arc::new(DocStore::new(temp.path().to_path_buf())));
        let notification = Notification::new("alice", NotificationKind::TlApproved, None, json!({}), Utc::now());
        service.append(&notification).unwrap();

        assert_eq!(service.list("alice", true).unwrap().len(), 1);
        assert!(service.mark_read("alice", &notification.id).unwrap());
        assert_eq!(service.list("alice", true).unwrap().len(), 0);
    }
}
