pub mod chrome;
pub mod coordinator;
pub mod input;
pub mod sequencer;
pub mod session;
