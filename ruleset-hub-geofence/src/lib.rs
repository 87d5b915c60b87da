//! Geofence predicate synchronizer for mobile consoles
//!
//! Rule evaluation produces per-asset location predicates. The
//! [`ConsoleGeofenceAdapter`] keeps the radial ones for consoles that
//! declare its geofence provider, diffs them against what it last saw and
//! tells affected consoles, in debounced batches, to pull their geofences
//! again through [`ConsoleGeofenceAdapter::get_asset_geofences`].

pub mod adapter;
pub mod chain;
pub mod config;
pub mod error;
pub mod lock;
mod notifier;
mod store;
pub mod transport;

pub use adapter::ConsoleGeofenceAdapter;
pub use chain::{GeofenceAdapters, GeofenceAssetAdapter};
pub use config::GeofenceConfig;
pub use error::GeofenceError;
pub use lock::NamedLock;
pub use transport::{FacadeTransport, PushTransport};
