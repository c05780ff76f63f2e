pub mod event;
pub mod intent;
pub mod settings;
pub mod suggestion;
