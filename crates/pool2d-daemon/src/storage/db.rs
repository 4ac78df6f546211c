//! Database connection and initialization.

pub use pool2d_core::db::DatabaseError;

pool2d_core::define_database!(Database, "Database migrations complete");
