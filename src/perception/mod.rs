pub mod extract;
pub mod literal;
pub mod matcher;
pub mod parser;
pub mod screenshot;
pub mod types;
pub mod validator;
