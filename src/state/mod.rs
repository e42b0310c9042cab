pub mod messages;
pub mod settings;
