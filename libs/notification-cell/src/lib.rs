pub mod dispatcher;
pub mod models;

pub use dispatcher::{MailerClient, NotificationDispatcher};
pub use models::{BookingEmail, CancellationEmail};
