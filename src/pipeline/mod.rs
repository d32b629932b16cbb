//! Pipeline stages for one conversion request.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the HTTP layer stays a thin adapter.
//!
//! ## Data Flow
//!
//! ```text
//! request parts ──▶ validate ──▶ stage ──▶ chain ──▶ markdown
//!                   (pure)       (tmpfile) (engine × 3)
//! ```
//!
//! 1. [`validate`]: pick the input kind (file > text > URL) and check it;
//!    touches no files, so rejected requests leave nothing behind
//! 2. [`stage`]: write the input to a uniquely named temp file that is
//!    deleted when its guard drops
//! 3. [`chain`]: Primary → Basic → RawText fallback over the
//!    [`crate::engine::ConversionEngine`]

pub mod chain;
pub mod stage;
pub mod validate;
