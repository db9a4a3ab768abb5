//! Honey Kitchen storefront: catalog browsing, reviews, per-user carts and likes.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod flash;
pub mod handlers;
pub mod likes;
pub mod middleware;
pub mod models;
pub mod render;
pub mod routes;
pub mod seed;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::ShopError;
pub use state::AppState;
