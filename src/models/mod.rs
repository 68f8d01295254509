pub mod event;
pub mod payment;
pub mod reminder;
pub mod ticket;
pub mod user;

pub use event::Event;
pub use payment::{Payment, PaymentStatus};
pub use reminder::Reminder;
pub use ticket::Ticket;
pub use user::{User, UserPublic, UserRole};
