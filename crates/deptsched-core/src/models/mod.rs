pub mod category;
pub mod message;
pub mod priority;
pub mod schedule_item;
pub mod unread;

pub use category::{builtin_categories, Category, PersonalSource};
pub use message::Message;
pub use priority::Priority;
pub use schedule_item::{Origin, ScheduleItem};
pub use unread::UnreadIndex;
