pub mod brief;
pub mod events;
pub mod jobs;
pub mod shots;
pub mod verify;
