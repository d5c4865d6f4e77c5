pub mod activity;
pub mod api;
pub mod center;
pub mod dispatcher;
pub mod error_log;
pub mod notifications;
pub mod poller;
pub mod toast;
