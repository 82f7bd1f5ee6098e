//! Protocol module - CPX wire format, routed packets and framing.
//!
//! This module implements the CPX link layer:
//! - 4-byte header encoding/decoding with the packed routing byte
//! - Routed packet type carried by one frame
//! - Frame buffer for splitting a byte stream into packets

mod frame_buffer;
mod packet;
mod wire_format;

pub use frame_buffer::FrameBuffer;
pub use packet::RoutedPacket;
pub use wire_format::{
    routing, Function, Header, Target, HEADER_SIZE, MAX_PAYLOAD_SIZE, MAX_WIRE_LENGTH,
    ROUTING_INFO_SIZE,
};
