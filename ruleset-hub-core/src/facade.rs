//! Capability facades injected into guest scripts
//!
//! Scripts never see storage or transports directly. They see `assets`,
//! `users` and `notifications` objects whose calls are routed through
//! [`Facades::invoke`] after the host's capability policy approved them.

use crate::models::{AssetQuery, Notification, UserQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacadeError {
    #[error("Unknown facade method: {receiver}.{method}")]
    UnknownMethod { receiver: String, method: String },

    #[error("Invalid arguments for {receiver}.{method}: {message}")]
    InvalidArguments {
        receiver: String,
        method: String,
        message: String,
    },

    #[error("Facade call failed: {0}")]
    Failed(String),
}

/// A guest script touched a receiver or method the capability policy does not list
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("access to {receiver}.{method} is not allowed")]
pub struct SandboxViolation {
    pub receiver: String,
    pub method: String,
}

impl SandboxViolation {
    pub fn new(receiver: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            receiver: receiver.into(),
            method: method.into(),
        }
    }
}

/// Query and update asset state
pub trait AssetsFacade: Send + Sync {
    fn query(&self, query: AssetQuery) -> Result<Value, FacadeError>;

    /// Write an attribute value on an asset
    fn dispatch(&self, asset_id: &str, attribute: &str, value: Value) -> Result<(), FacadeError>;
}

pub trait UsersFacade: Send + Sync {
    /// Returns matching user ids
    fn query(&self, query: UserQuery) -> Result<Vec<String>, FacadeError>;
}

pub trait NotificationsFacade: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), FacadeError>;
}

/// The set of capability objects bound into a ruleset's scope
#[derive(Clone)]
pub struct Facades {
    pub assets: Arc<dyn AssetsFacade>,
    pub users: Arc<dyn UsersFacade>,
    pub notifications: Arc<dyn NotificationsFacade>,
}

impl Facades {
    pub fn new(
        assets: Arc<dyn AssetsFacade>,
        users: Arc<dyn UsersFacade>,
        notifications: Arc<dyn NotificationsFacade>,
    ) -> Self {
        Self {
            assets,
            users,
            notifications,
        }
    }

    /// Dispatch a guest call with positional JSON arguments
    pub fn invoke(&self, receiver: &str, method: &str, args: Vec<Value>) -> Result<Value, FacadeError> {
        let mut args = args.into_iter();
        match (receiver, method) {
            ("assets", "query") => {
                let query: AssetQuery = parse_query(receiver, method, args.next())?;
                self.assets.query(query)
            }
            ("assets", "dispatch") => {
                let asset_id: String = parse_arg(receiver, method, args.next())?;
                let attribute: String = parse_arg(receiver, method, args.next())?;
                let value = args.next().unwrap_or(Value::Null);
                self.assets.dispatch(&asset_id, &attribute, value)?;
                Ok(Value::Null)
            }
            ("users", "query") => {
                let query: UserQuery = parse_query(receiver, method, args.next())?;
                Ok(Value::from(self.users.query(query)?))
            }
            ("notifications", "send") => {
                let notification: Notification = parse_arg(receiver, method, args.next())?;
                self.notifications.send(notification)?;
                Ok(Value::Null)
            }
            _ => Err(FacadeError::UnknownMethod {
                receiver: receiver.to_string(),
                method: method.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Facades {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facades").finish_non_exhaustive()
    }
}

fn parse_arg<T: for<'de> Deserialize<'de>>(
    receiver: &str,
    method: &str,
    arg: Option<Value>,
) -> Result<T, FacadeError> {
    serde_json::from_value(arg.unwrap_or(Value::Null)).map_err(|e| FacadeError::InvalidArguments {
        receiver: receiver.to_string(),
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// Queries may be omitted by the script, meaning "match everything"
fn parse_query<T: Default + for<'de> Deserialize<'de>>(
    receiver: &str,
    method: &str,
    arg: Option<Value>,
) -> Result<T, FacadeError> {
    match arg {
        None | Some(Value::Null) => Ok(T::default()),
        some => parse_arg(receiver, method, some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Notification;
    use recorder::Recorder;

    mod recorder {
        use super::*;
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct Recorder {
            pub calls: Mutex<Vec<String>>,
        }

        impl AssetsFacade for Recorder {
            fn query(&self, query: AssetQuery) -> Result<Value, FacadeError> {
                self.calls.lock().unwrap().push(format!("query:{:?}", query.realm));
                Ok(Value::Array(vec![]))
            }

            fn dispatch(&self, asset_id: &str, attribute: &str, _value: Value) -> Result<(), FacadeError> {
                self.calls.lock().unwrap().push(format!("dispatch:{}:{}", asset_id, attribute));
                Ok(())
            }
        }

        impl UsersFacade for Recorder {
            fn query(&self, _query: UserQuery) -> Result<Vec<String>, FacadeError> {
                Ok(vec!["u1".to_string()])
            }
        }

        impl NotificationsFacade for Recorder {
            fn send(&self, notification: Notification) -> Result<(), FacadeError> {
                self.calls.lock().unwrap().push(format!("send:{}", notification.name));
                Ok(())
            }
        }
    }

    fn facades(recorder: &Arc<Recorder>) -> Facades {
        Facades::new(recorder.clone(), recorder.clone(), recorder.clone())
    }

    #[test]
    fn test_invoke_routes_to_facade() {
        let recorder = Arc::new(Recorder::default());
        let facades = facades(&recorder);

        facades
            .invoke("assets", "query", vec![serde_json::json!({ "realm": "master" })])
            .unwrap();
        facades
            .invoke("assets", "dispatch", vec!["a1".into(), "light".into(), true.into()])
            .unwrap();
        let users = facades.invoke("users", "query", vec![]).unwrap();

        assert_eq!(users, serde_json::json!(["u1"]));
        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0], "query:Some(\"master\")");
        assert_eq!(calls[1], "dispatch:a1:light");
    }

    #[test]
    fn test_invoke_unknown_method() {
        let recorder = Arc::new(Recorder::default());
        let err = facades(&recorder).invoke("assets", "delete", vec![]).unwrap_err();
        assert!(matches!(err, FacadeError::UnknownMethod { .. }));
    }

    #[test]
    fn test_invoke_bad_arguments() {
        let recorder = Arc::new(Recorder::default());
        let err = facades(&recorder)
            .invoke("assets", "dispatch", vec![serde_json::json!(42)])
            .unwrap_err();
        assert!(matches!(err, FacadeError::InvalidArguments { .. }));
    }
}
