pub mod mailer;
pub mod tokens;

pub use mailer::{LogMailer, MailError, MailMessage, Mailer, RelayMailer, RetryPolicy};
pub use tokens::{TokenError, TokenService};
