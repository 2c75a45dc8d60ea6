pub mod credential;
pub mod token_guard;

pub use credential::{Credential, TokenClaims};
pub use token_guard::{LogoutCallback, TokenGuard};
