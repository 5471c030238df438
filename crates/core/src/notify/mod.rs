pub mod alert;
pub mod dispatcher;
pub mod engine;

pub use alert::{AlertMessage, AlertSink, HttpAlertSink, LogAlertSink};
pub use dispatcher::{HttpWebhookDispatcher, WebhookDispatcher};
pub use engine::NotificationEngine;
