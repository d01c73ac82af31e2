// Authentication module
// Protege login and the cached bearer token

mod login;
mod manager;
mod types;

pub use login::LOGIN_PATH;
pub use manager::{TokenManager, MAX_TOKEN_TTL_SECS};
pub use types::{Credential, LoginCredentials};
