//! SL651 frame types, framer, parser and builder (§4.2-§4.4).

pub mod builder;
pub mod config;
pub mod frame;
pub mod framer;
pub mod parser;

pub use builder::{build_ack_frame, build_down_frame, build_link_keep_ack, BuildDownFrameParams, ElementValue};
pub use config::{ConnectionTable, DeviceConfig, DeviceConfigRegistry, Encode, ElementDef};
pub use frame::{Direction, FrameControl, FuncCodes, Sl651Frame};
pub use framer::{Framer, FramerDrain};
pub use parser::{decode_header, ParseContext, ParseOutcome, ParsedFrameResult, Sl651Parser};
