//! Authentication and authorization module
//!
//! - `password`: Argon2id hashing and the password policy
//! - `jwt`: access/refresh token issuance and verification
//! - `service`: the session manager (register, login, refresh, logout)
//! - `guard`: identity and role checks for route groups
//! - `models`: request and response bodies

pub mod guard;
pub mod jwt;
pub mod models;
pub mod password;
pub mod service;

pub use guard::{guard_middleware, AuthError, AuthenticatedIdentity, GuardState, RoutePolicy};
pub use jwt::{Claims, JwtConfig, TokenError, TokenPair};
pub use models::{
    AuthResponse, CreateAccountRequest, LoginRequest, MessageResponse, RefreshRequest,
    RegisterRequest, UpdateAccountRequest, ValidateResponse,
};
pub use password::{hash_password, validate_password_strength, verify_password, PasswordConfig};
pub use service::AuthService;
