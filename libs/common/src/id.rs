use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = quizline_common::id::prefixed_ulid("quiz");
/// assert!(id.starts_with("quiz_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that own a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate_id() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const QUIZ: &str = "quiz";
    pub const USER: &str = "usr";
    pub const CLIENT: &str = "conn";
    pub const EVENT: &str = "evt";
    pub const INSTANCE: &str = "inst";
}
