//! Database engines
//!
//! Everything here runs against a [`DbManager`], which owns the SQLCipher
//! pool and the per-thread connection bindings. The engines are cheap to
//! clone and share the manager through an `Arc`.

pub mod data;
pub mod maintenance;
pub mod manager;
pub mod marshal;
pub mod numeric;
pub mod property;
pub mod registry;
pub mod schema;
pub mod sql;

pub use data::{DataOperations, Row};
pub use maintenance::Maintenance;
pub use manager::{DbManager, ScopedConnection};
pub use marshal::{ExportProgressListener, Marshaller, NoopProgress};
pub use numeric::{LockRegistry, NumericFieldUpdater, NumericLockKey};
pub use property::{is_quantity_field, PropertyManager};
pub use registry::DatabaseRegistry;
pub use schema::{delete_database_files, SchemaManager};
