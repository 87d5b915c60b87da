//! Push transport the refresh notifications are handed to

use crate::GeofenceError;
use async_trait::async_trait;
use ruleset_hub_core::{Notification, NotificationsFacade};
use std::sync::Arc;

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), GeofenceError>;
}

/// Delivers through the host's notifications facade
pub struct FacadeTransport {
    notifications: Arc<dyn NotificationsFacade>,
}

impl FacadeTransport {
    pub fn new(notifications: Arc<dyn NotificationsFacade>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl PushTransport for FacadeTransport {
    async fn send(&self, notification: Notification) -> Result<(), GeofenceError> {
        self.notifications
            .send(notification)
            .map_err(|e| GeofenceError::Transport(e.to_string()))
    }
}
