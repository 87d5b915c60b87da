//! Pending refresh batch and its single flush timer

use ruleset_hub_core::{
    Notification, NotificationTargetType, NotificationTargets, PushNotificationMessage,
};
use std::collections::BTreeSet;
use tokio::task::JoinHandle;

pub(crate) const REFRESH_NOTIFICATION_NAME: &str = "GeofenceRefresh";
pub(crate) const REFRESH_ACTION: &str = "GEOFENCE_REFRESH";

#[derive(Debug, Default)]
pub(crate) struct PendingBatch {
    assets: BTreeSet<String>,
    timer: Option<JoinHandle<()>>,
}

impl PendingBatch {
    pub fn add(&mut self, asset_id: String) {
        self.assets.insert(asset_id);
    }

    pub fn remove(&mut self, asset_id: &str) {
        self.assets.remove(asset_id);
    }

    pub fn pending(&self) -> Vec<String> {
        self.assets.iter().cloned().collect()
    }

    /// A new timer is only needed when none is in flight
    pub fn needs_timer(&self) -> bool {
        !self.assets.is_empty() && self.timer.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn set_timer(&mut self, timer: JoinHandle<()>) {
        self.timer = Some(timer);
    }

    /// Take the batch and release the timer handle
    pub fn drain(&mut self) -> Vec<String> {
        self.timer = None;
        std::mem::take(&mut self.assets).into_iter().collect()
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.assets.clear();
    }
}

/// Silent data-only push telling a console to pull its geofences again
pub(crate) fn refresh_notification(asset_id: &str) -> Notification {
    let mut data = serde_json::Map::new();
    data.insert("action".to_string(), serde_json::Value::from(REFRESH_ACTION));
    Notification {
        name: REFRESH_NOTIFICATION_NAME.to_string(),
        message: PushNotificationMessage::data_only(data),
        targets: NotificationTargets {
            target_type: NotificationTargetType::Asset,
            ids: vec![asset_id.to_string()],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_notification_payload() {
        let notification = refresh_notification("c1");
        assert_eq!(notification.message.data["action"], "GEOFENCE_REFRESH");
        assert!(notification.message.title.is_none());
        assert_eq!(notification.targets.target_type, NotificationTargetType::Asset);
        assert_eq!(notification.targets.ids, vec!["c1".to_string()]);
    }

    #[test]
    fn test_drain_empties_batch() {
        let mut batch = PendingBatch::default();
        assert!(!batch.needs_timer());
        batch.add("b".to_string());
        batch.add("a".to_string());
        batch.add("a".to_string());
        assert!(batch.needs_timer());
        assert_eq!(batch.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(batch.pending().is_empty());
    }
}
