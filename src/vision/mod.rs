pub mod client;
pub mod decode;
