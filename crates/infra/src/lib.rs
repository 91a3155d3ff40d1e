//! Infrastructure layer: in-memory store, reservation service, config,
//! catalog snapshots.

pub mod config;
pub mod reservation;
pub mod snapshot;
pub mod store;

pub use config::{BoxOfficeConfig, ConfigError};
pub use reservation::{ReservationError, ReservationRequest, ReservationService, Sweep};
pub use snapshot::{CatalogFile, SnapshotError};
pub use store::{InMemoryStore, StoreError};
