//! HTTP request handlers

pub mod resumable;
pub mod upload;
