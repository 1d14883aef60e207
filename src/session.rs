//! Keys under which the sign-in flow stores the caller's identity.

pub const USER_ID: &str = "user_id";
pub const ROLE: &str = "role";
