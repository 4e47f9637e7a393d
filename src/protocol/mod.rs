//! Text protocol: command kinds, request line parsing and responses

pub mod command;
pub mod parser;
pub mod response;

pub use command::{Command, MAX_KEY_LENGTH, is_valid_key};
pub use parser::{ParsedLine, parse_line};
pub use response::ResponseWriter;
