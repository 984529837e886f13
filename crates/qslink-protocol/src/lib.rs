pub mod codec;
pub mod command;
pub mod parser;
pub mod system;

pub use codec::TelnetCodec;
pub use command::Command;
pub use parser::ResponseParser;
pub use system::{normalize_time_zone, parse_clock_time, parse_lat_long, parse_system_time};
