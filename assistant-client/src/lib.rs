pub mod auth;
pub mod commands;
pub mod config;
pub mod dtos;
pub mod models;
pub mod services;
pub mod session;
pub mod startup;
pub mod store;
pub mod transfers;
