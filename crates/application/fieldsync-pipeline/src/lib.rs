mod driver;
pub mod sync;

pub use driver::SyncDriver;
pub use sync::{
    CacheSource, DraftStore, DrainHalt, DrainReport, DroppedRecord, LocalQueue, QueueEntry,
    ReferenceCache, ReferenceSnapshot, SubmitOutcome, SyncEngine, SyncError, SyncOptions,
};
