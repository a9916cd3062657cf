pub mod lock;

pub use lock::{LockManager, LockMode, Permission};
