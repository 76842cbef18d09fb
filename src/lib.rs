pub mod ae;
pub mod app;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod geo;
pub mod keys;
pub mod ledger;
pub mod reconcile;
pub mod report;
pub mod resolver;
pub mod store;
pub mod text;
pub mod walker;
