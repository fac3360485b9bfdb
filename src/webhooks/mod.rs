//! Webhook collaborators: signature checks, payload extraction, and user updates.

pub mod events;
pub mod signature;
pub mod users;

pub use events::{ClerkEvent, ClerkUser, LemonSqueezyEvent, Order};
pub use signature::{sign_lemon_squeezy, verify_lemon_squeezy, SvixHeaders, SvixVerifier};
pub use users::{MemoryUserDirectory, ProUpgrade, UserDirectory, UserRecord};
