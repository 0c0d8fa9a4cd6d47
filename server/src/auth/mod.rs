pub mod jwt;
pub mod middleware;

pub use jwt::{AuthError, Claims, TokenAuthenticator};
