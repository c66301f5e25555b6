//! Sea-ORM entities for concierge-store

pub mod guest_conversation;
pub mod guest_messages;
pub mod service_requests;

pub use guest_conversation::Entity as GuestConversation;
pub use guest_messages::Entity as GuestMessages;
pub use service_requests::Entity as ServiceRequests;
