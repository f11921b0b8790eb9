//! Business logic for Canopy: sessions, login, page trees and listings.
//! Everything here talks to storage through the `domains` ports only.

pub mod auth;
pub mod authors;
pub mod content;
pub mod search;
pub mod session;

pub use auth::AuthService;
pub use authors::AuthorResolver;
pub use content::ContentTreeResolver;
pub use search::SearchEngine;
pub use session::SessionStore;
