//! Publish/subscribe matching engine: bucket/object/prefix subscriptions
//! fanning out mutation events over long-lived streams (`spec.md` §4.5).

pub mod registry;
pub mod service;

pub use registry::{PublicationType, StreamEvent, SubscriptionType};
pub use service::PubSubService;
