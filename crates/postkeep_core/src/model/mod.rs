//! Domain model: posts with comments, accounts with studies.
//!
//! # Invariants
//! - Identities are assigned by the store on first save.
//! - Parent/child links are changed only through paired helpers on the
//!   parent (`Post::add_comment`, `Account::add_study`, ...).

pub mod account;
pub mod comment;
pub mod entity;
pub mod post;
