pub mod notifier;
pub mod status_store;

pub use notifier::{Notifier, StoreEvent, StoreListener};
pub use status_store::StatusStore;
