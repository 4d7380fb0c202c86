mod api;
mod movie;
mod permission;
mod token;
mod user;

pub use api::{
    AuthenticationTokenResponse, CreateMovieRequest, CredentialsRequest, DebugVarsResponse,
    EmailRequest, HealthResponse, MessageResponse, MovieResponse, MoviesResponse,
    RegisterUserRequest, RequestCounters, ResetPasswordRequest, SystemInfo, TokenRequest,
    UpdateMovieRequest, UserResponse,
};
pub use movie::{Movie, MovieId, NewMovie};
pub use permission::{MOVIES_READ, MOVIES_WRITE, Permissions};
pub use token::{Scope, Token, TokenHash, TokenRecord, hash_plaintext};
pub use user::{Identity, NewUser, Password, PasswordError, User, UserId};
