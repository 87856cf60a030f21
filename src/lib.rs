//! Access Index - materialized index of indirect access
//!
//! Computes, for every entitlement node and role in a catalog, the targets it
//! grants directly, through its entitlement hierarchy, or through role
//! composition, and keeps that index up to date incrementally.
//! It exposes all modules for testing purposes.

pub mod catalog;
pub mod entities;
pub mod errors;
pub mod index;
pub mod jobs;
pub mod settings;
pub mod storage;
