pub mod events;
pub mod plugin;
