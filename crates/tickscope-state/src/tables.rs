//! redb table definitions for the tickscope perf store.

use redb::TableDefinition;

/// The perf file, JSON-serialized, under [`CURRENT_KEY`].
pub const PERF: TableDefinition<&str, &[u8]> = TableDefinition::new("perf");

/// Key of the single record in [`PERF`]. Every save replaces it whole.
pub const CURRENT_KEY: &str = "current";
