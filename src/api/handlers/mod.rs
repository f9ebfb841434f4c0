//! HTTP request handlers

pub mod endpoints;
pub mod health;
pub mod memes;
