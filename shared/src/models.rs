pub mod character;
pub mod conversation;
pub mod events;
pub mod job;
pub mod message;

pub use character::*;
pub use conversation::*;
pub use events::*;
pub use job::*;
pub use message::*;
