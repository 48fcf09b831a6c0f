//! mysite-web - server-rendered frontend for a personal blog and portfolio
//!
//! Pages, comments, likes, sign-in and the assistant panel are rendered here;
//! all data lives behind the backend REST API.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod models;
pub mod services;
pub mod templates;
