pub mod auth;
pub mod chat;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod products;
pub mod routes;
pub mod uploads;
pub mod wishlist;

pub use auth::{AppState, AppStateInner};
pub use error::{AppError, AppResult};
pub use routes::router;
