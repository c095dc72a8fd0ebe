pub mod app;
pub mod bcp;
pub mod config;
pub mod domain;
pub mod emit;
pub mod error;
pub mod journal;
pub mod keys;
pub mod output;
pub mod record;
pub mod resolver;
pub mod rows;
pub mod state;
pub mod store;
pub mod validate;
