mod builder;
/// Internal callback type
mod callback;
mod client;

pub use builder::ClientBuilder;
pub use client::{DomainEvent, Subscription, TestClient};
