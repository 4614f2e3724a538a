//! Repository traits for metadata operations.
//!
//! Together these form the querier contract every caller depends on. All
//! `create_*` methods are get-or-create on the natural key, `touch_*` and
//! `delete_*` report rows affected instead of failing on a missing row, and
//! `get_*` lookups fail with a not-found error.

pub mod chunks;
pub mod config;
pub mod gc;
pub mod migration;
pub mod nar_files;
pub mod nar_infos;

pub use chunks::ChunkRepo;
pub use config::ConfigRepo;
pub use gc::GcRepo;
pub use migration::MigrationRepo;
pub use nar_files::NarFileRepo;
pub use nar_infos::NarInfoRepo;
