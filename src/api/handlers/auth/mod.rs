//! Auth handlers and supporting modules.
//!
//! ## Flows
//!
//! - **Signup** creates an unverified account and emails a SIGNUP OTP; no
//!   session is issued until the code is confirmed.
//! - **Login** accepts a password (bcrypt) or a LOGIN OTP against a verified
//!   account.
//! - **Google** verifies an ID token offline against Google's JWKS; accounts
//!   created or linked through Google are verified immediately.
//!
//! ## Invariants
//!
//! - At most one unused OTP exists per (email, purpose): issuing a new code
//!   invalidates its predecessors in the same transaction.
//! - OTP verification succeeds at most once per code; the unused -> used
//!   transition is a single conditional update.
//! - An unverified account is never handed a session token except through
//!   the Google path, which verifies on creation.

pub(crate) mod google;
pub(crate) mod login;
mod otp;
pub(crate) mod principal;
pub(crate) mod session;
pub(crate) mod signup;
mod state;
mod storage;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use otp::{spawn_cleanup_sweep, OtpPurpose};
pub use state::{AuthConfig, AuthState};

pub(crate) use storage::{delete_user, lookup_user_by_id, update_profile};
