pub mod events;
pub mod protocol;
pub mod ws;
