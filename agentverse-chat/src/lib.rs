pub mod chat;
pub mod http;
pub mod oauth;
pub mod session;
pub mod ui;

pub use chat::{CallbackParams, ChatService};
pub use oauth::{GoogleOAuthClient, IdentityProvider};
pub use session::{ChatSession, SessionStore};
