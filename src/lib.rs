pub mod app;
pub mod config;
pub mod counts;
pub mod domain;
pub mod error;
pub mod output;
pub mod store;
pub mod table;
pub mod translate;
