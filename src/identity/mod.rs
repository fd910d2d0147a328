//! Outbound identity management.
//!
//! [`IdentityRotator`] holds the current [`IdentityProfile`], rotates through a
//! fixed list of user agents when the service starts rejecting us, and folds
//! server-issued cookies back into the persisted session.

mod profile;
mod rotator;

pub use profile::IdentityProfile;
pub use rotator::{IdentityError, IdentityRotator};
