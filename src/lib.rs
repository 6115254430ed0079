// Library exports for clubranks
// This allows integration tests and external code to use the club modules

pub mod auth;
pub mod chat;
pub mod clubs;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod journal;
pub mod leaderboard;
pub mod membership;
pub mod routes;
pub mod state;
