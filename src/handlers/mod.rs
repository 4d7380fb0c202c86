mod health;
mod movies;
mod tokens;
mod users;
mod util;

pub use health::{debug_vars, healthcheck};
pub use movies::{create_movie, delete_movie, list_movies, show_movie, update_movie};
pub use tokens::{create_activation_token, create_authentication_token, create_password_reset_token};
pub use users::{activate_user, register_user, reset_password};
pub use util::ApiJson;
