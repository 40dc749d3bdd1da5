//! Newsroom - a small news publishing site
//!
//! Readers browse published articles by category; registered users write
//! articles and drafts; administrators moderate articles, accounts and
//! contact messages from the `/admin` area.

pub mod admin;
pub mod auth;
pub mod config;
pub mod db;
pub mod forms;
pub mod routes;
pub mod session;
