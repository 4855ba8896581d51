//! Frame header constants and the command code enum.
//!
//! All frames share a fixed 6-octet header in network byte order:
//! `length:u16 | marker:u8 | version:u8 | command:u16`.

use byteorder::{BigEndian, ByteOrder};

/// Constant marker byte every frame must carry at offset 2.
pub const MARKER: u8 = 0xFE;
/// Protocol version this crate speaks; frames with any other version are rejected.
pub const VERSION: u8 = 3;
/// Fixed header size, in octets.
pub const HEADER_SIZE: usize = 6;
/// Starting capacity of the ingress buffer, and the largest frame we'll
/// accept without growing it.
pub const MAX_PACKET: usize = 4096;

/// Inbound/outbound command codes (HELLO = 0x17, ROUTER_ID_ADD = 0x0C,
/// matching the worked examples below); the exact numeric assignment
/// only has to agree with whatever peer this client is wired to, so it
/// lives in one place.
#[derive(num_derive::FromPrimitive, num_derive::ToPrimitive, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum Command {
    InterfaceAdd = 1,
    InterfaceDelete = 2,
    InterfaceAddressAdd = 3,
    InterfaceAddressDelete = 4,
    InterfaceUp = 5,
    InterfaceDown = 6,
    RouterIdAdd = 0x0C,
    RouterIdDelete = 0x0D,
    RouterIdUpdate = 0x0E,
    Ipv4RouteAdd = 7,
    Ipv4RouteDelete = 8,
    Ipv6RouteAdd = 9,
    Ipv6RouteDelete = 10,
    RedistributeAdd = 11,
    RedistributeDelete = 12,
    RedistributeDefaultAdd = 13,
    RedistributeDefaultDelete = 14,
    Hello = 0x17,
}

impl Command {
    pub fn from_u16(v: u16) -> Option<Command> {
        num_traits::FromPrimitive::from_u16(v)
    }

    pub fn to_u16(self) -> u16 {
        num_traits::ToPrimitive::to_u16(&self).expect("Command always fits in u16")
    }
}

/// A parsed, validated frame header.
#[derive(Debug, Copy, Clone)]
pub struct Header {
    pub length: u16,
    pub command: u16,
}

/// Parse and validate the 6-octet header at the start of `buf`.
///
/// Returns `Err` if `buf` is shorter than [`HEADER_SIZE`], if the marker or
/// version octets don't match the constants above, or if the declared
/// length is shorter than the header itself.
pub fn parse_header(buf: &[u8]) -> Result<Header, crate::error::ClientError> {
    if buf.len() < HEADER_SIZE {
        return Err(crate::error::ClientError::Framing("header truncated"));
    }
    let length = BigEndian::read_u16(&buf[0..2]);
    let marker = buf[2];
    let version = buf[3];
    let command = BigEndian::read_u16(&buf[4..6]);
    if marker != MARKER {
        return Err(crate::error::ClientError::Framing("bad marker"));
    }
    if version != VERSION {
        return Err(crate::error::ClientError::Framing("bad version"));
    }
    if (length as usize) < HEADER_SIZE {
        return Err(crate::error::ClientError::Framing("length shorter than header"));
    }
    Ok(Header { length, command })
}

/// Write the header at the start of `buf`, `buf` must be at least
/// [`HEADER_SIZE`] long. `length` is the full frame length, header included.
pub fn write_header(buf: &mut [u8], length: u16, command: u16) {
    BigEndian::write_u16(&mut buf[0..2], length);
    buf[2] = MARKER;
    buf[3] = VERSION;
    BigEndian::write_u16(&mut buf[4..6], command);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header() {
        let mut buf = [0u8; HEADER_SIZE];
        write_header(&mut buf, 7, Command::Hello.to_u16());
        let hdr = parse_header(&buf).unwrap();
        assert_eq!(hdr.length, 7);
        assert_eq!(hdr.command, Command::Hello.to_u16());
    }

    #[test]
    fn rejects_bad_marker() {
        let mut buf = [0u8; HEADER_SIZE];
        write_header(&mut buf, 6, 0);
        buf[2] = 0x00;
        assert!(parse_header(&buf).is_err());
    }

    #[test]
    fn rejects_short_length() {
        let mut buf = [0u8; HEADER_SIZE];
        write_header(&mut buf, 2, 0);
        assert!(parse_header(&buf).is_err());
    }

    #[test]
    fn hello_header_with_redist_default_nine() {
        let mut buf = [0u8; 7];
        write_header(&mut buf, 7, Command::Hello.to_u16());
        buf[6] = 9;
        assert_eq!(buf, [0x00, 0x07, 0xFE, 0x03, 0x00, 0x17, 0x09]);
    }

    #[test]
    fn router_id_add_header_has_empty_body() {
        let mut buf = [0u8; HEADER_SIZE];
        write_header(&mut buf, 6, Command::RouterIdAdd.to_u16());
        assert_eq!(buf, [0x00, 0x06, 0xFE, 0x03, 0x00, 0x0C]);
    }
}
