pub mod rules;
pub mod store;

pub use store::SessionStore;
