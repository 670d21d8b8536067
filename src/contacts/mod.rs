//! Contacts served by the random user API.

mod api_types;
mod client;
mod types;

pub use client::ContactsClient;
pub use types::Contact;

#[cfg(test)]
pub(crate) use types::test_contact;
