pub mod parser;
pub mod types;
pub mod writer;

pub use parser::{is_complete, parse};
pub use types::RespValue;
pub use writer::{encode_command, encode_value};
