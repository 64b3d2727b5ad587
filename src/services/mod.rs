pub mod attendance;
pub mod backend;
pub mod calls;
pub mod chat;
