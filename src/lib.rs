//! # Notu (Notes API)
//!
//! `notu` is the REST backend for a small note-taking application. It manages
//! user accounts, email one-time-passcode (OTP) verification, Google sign-in,
//! and per-user notes.
//!
//! ## Authentication
//!
//! Accounts sign up with an email address and an optional password. A freshly
//! created account is unverified until a 6-digit OTP, delivered by email, is
//! confirmed. Login accepts either a password (bcrypt) or a LOGIN OTP, and
//! Google sign-in verifies an ID token against Google's published keys.
//! Sessions are HS256 JSON Web Tokens carried in an `HttpOnly` cookie, with a
//! bearer header fallback.
//!
//! ## Ownership
//!
//! Notes belong to exactly one user. Every read and write is scoped by the
//! authenticated user's id, and acting on another user's note id returns
//! `404 Not Found` rather than `403 Forbidden` to prevent note enumeration.
//!
//! ## Delivery
//!
//! OTP emails go through a transactional outbox: issuing a code enqueues a row
//! in the same transaction, and a background worker delivers it with retries.
//! A delivery failure never fails the request that issued the code.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
