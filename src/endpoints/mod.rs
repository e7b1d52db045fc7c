//! Built-in endpoint namespaces.
//!
//! Applications mount their own namespaces next to these; the account
//! namespace ships with the engine because login and password recovery are
//! coupled to the access gate.

pub mod account;
