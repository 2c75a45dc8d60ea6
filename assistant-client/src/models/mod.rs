pub mod entity;
pub mod message;
pub mod session;
pub mod transfer;

pub use entity::{Entity, EntityId};
pub use message::{DerivedFrom, MessageAction, RealtimeMessage, RetrievalContext, Role};
pub use session::{
    CloseReason, SessionSnapshot, SessionState, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION,
};
pub use transfer::{TaskId, TransferStatus, TransferTask};
