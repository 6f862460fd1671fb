pub mod admin;
pub mod api_router;
pub mod config;
pub mod contact;
pub mod donations;
pub mod email;
pub mod events;
pub mod livestream;
pub mod pastevents;
pub mod payments;
pub mod registrations;
pub mod shared;
pub mod volunteers;
pub mod webhooks;
