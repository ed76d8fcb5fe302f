pub mod files;
pub mod group_service;
pub mod message_service;
pub mod push;
pub mod thread_service;

pub use group_service::GroupService;
pub use message_service::MessageService;
pub use thread_service::ThreadService;
