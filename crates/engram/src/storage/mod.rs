pub mod filter;
pub mod lock;
pub mod store;

pub use filter::EntityFilter;
pub use lock::{FileLock, LockSettings};
pub use store::{EntityIter, EntityStore};
