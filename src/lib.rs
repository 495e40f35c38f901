//! Multi-tenant legal document store.
//!
//! A master libSQL database holds accounts and tenant mappings. Every
//! non-admin account gets its own libSQL file for documents, chat
//! transcripts, and a glossary that grows as documents are processed.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod legal;
pub mod pipeline;
pub mod reporting;
pub mod settings;
pub mod tenancy;
