pub mod catalog;
pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod scrapers;
