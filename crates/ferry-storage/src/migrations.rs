// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema migrations.
//!
//! The SQL files under this crate's `migrations/` directory are baked
//! into the binary at build time and applied when the database opens.
//! Refinery records applied versions in its `refinery_schema_history`
//! table, so reopening an already-migrated database is a no-op and new
//! versions land incrementally.

use ferry_core::FerryError;

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Apply any migrations the database file has not seen yet.
pub fn run(conn: &mut rusqlite::Connection) -> Result<(), FerryError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| FerryError::Storage {
            source: Box::new(e),
        })?;

    for migration in report.applied_migrations() {
        tracing::debug!(version = migration.version(), name = migration.name(), "migration applied");
    }
    Ok(())
}
