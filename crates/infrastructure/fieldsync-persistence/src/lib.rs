mod api;
mod codec;
mod error;
mod keys;
mod maintenance;
mod memory_store;
mod redb_store;

pub use api::*;
pub use codec::{decode_array, encode_array};
pub use error::*;
pub use keys::validate_key;
pub use maintenance::{quarantine_corrupt_file, quarantine_value, set_aside};
pub use memory_store::MemoryKeyValueStore;
pub use redb_store::RedbKeyValueStore;
