// Notification composition and delivery module
pub mod composer;
pub mod mailer;

pub use composer::{batch_by_entity, Crossing, MessageTemplate, NotificationBatch, RenderedMessage};
pub use mailer::{DeliveryError, Mailer, SmtpMailer};
