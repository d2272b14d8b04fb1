//! Firestore over REST, shared by the cloud quota store and the cloud library.

pub mod auth;
pub mod client;
pub mod value;

pub use client::{CommitOutcome, Document, FirestoreClient};
pub use value::Fields;
