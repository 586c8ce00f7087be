pub mod bus;
pub mod cli;
pub mod config;
pub mod domain;
pub mod entity;
pub mod errors;
pub mod services;
pub mod sources;
