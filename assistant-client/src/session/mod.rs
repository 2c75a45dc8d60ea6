pub mod manager;
pub mod transport;

pub use manager::{SessionConfig, SessionManager};
pub use transport::{Connection, Connector, TransportEvent, WebSocketConnector};
