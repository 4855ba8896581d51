//! Message body encoders and decoders.
//!
//! Encoders build a full frame (header + body) into a caller-supplied
//! scratch buffer and return its length. Decoders are cursor-oriented
//! readers over an inbound frame's body, handed to the matching
//! dispatch handler.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::route::{nexthop_type, Family, MessageFlags, NextHop, Prefix, RouteType, Safi, ZebraFlags};
use crate::wire::{self, Command, HEADER_SIZE};

/// Reusable scratch buffer used to build one outbound frame at a time.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { buf: Vec::with_capacity(wire::MAX_PACKET) }
    }

    fn begin(&mut self, command: Command) {
        self.buf.clear();
        self.buf.resize(HEADER_SIZE, 0);
        wire::write_header(&mut self.buf[..HEADER_SIZE], HEADER_SIZE as u16, command.to_u16());
    }

    /// Patch the header's length field to the final size and return the
    /// complete frame.
    fn finish(&mut self) -> &[u8] {
        let len = self.buf.len() as u16;
        byteorder::BigEndian::write_u16(&mut self.buf[0..2], len);
        &self.buf
    }

    pub fn hello(&mut self, redist_default: RouteType) -> &[u8] {
        self.begin(Command::Hello);
        self.buf.push(redist_default);
        self.finish()
    }

    pub fn redistribute_add(&mut self, route_type: RouteType) -> &[u8] {
        self.begin(Command::RedistributeAdd);
        self.buf.push(route_type);
        self.finish()
    }

    pub fn redistribute_delete(&mut self, route_type: RouteType) -> &[u8] {
        self.begin(Command::RedistributeDelete);
        self.buf.push(route_type);
        self.finish()
    }

    pub fn redistribute_default_add(&mut self) -> &[u8] {
        self.begin(Command::RedistributeDefaultAdd);
        self.finish()
    }

    pub fn redistribute_default_delete(&mut self) -> &[u8] {
        self.begin(Command::RedistributeDefaultDelete);
        self.finish()
    }

    pub fn router_id_add(&mut self) -> &[u8] {
        self.begin(Command::RouterIdAdd);
        self.finish()
    }

    pub fn interface_add(&mut self) -> &[u8] {
        self.begin(Command::InterfaceAdd);
        self.finish()
    }

    /// Encode an IPv4 or IPv6 route add/delete frame. `add` selects
    /// ADD vs DELETE for the given family; nexthops/distance/metric are
    /// included per the flags actually set in `msg_flags`.
    #[allow(clippy::too_many_arguments)]
    pub fn route(
        &mut self,
        family: Family,
        add: bool,
        route_type: RouteType,
        zebra_flags: ZebraFlags,
        msg_flags: MessageFlags,
        safi: Safi,
        prefix: &Prefix,
        nexthops: &[NextHop],
        distance: Option<u8>,
        metric: Option<u32>,
    ) -> &[u8] {
        let command = match (family, add) {
            (Family::Inet, true) => Command::Ipv4RouteAdd,
            (Family::Inet, false) => Command::Ipv4RouteDelete,
            (Family::Inet6, true) => Command::Ipv6RouteAdd,
            (Family::Inet6, false) => Command::Ipv6RouteDelete,
        };
        self.begin(command);
        self.buf.push(route_type);
        self.buf.push(zebra_flags.bits());
        self.buf.push(msg_flags.bits());
        self.buf.write_u16::<BigEndian>(safi).unwrap();
        self.buf.push(prefix.prefixlen);
        self.buf.extend_from_slice(&prefix.bytes[..Prefix::byte_len(prefix.prefixlen)]);

        if msg_flags.contains(MessageFlags::NEXTHOP) {
            if zebra_flags.contains(ZebraFlags::BLACKHOLE) {
                self.buf.push(1);
                self.buf.push(nexthop_type::BLACKHOLE);
            } else {
                self.buf.push(nexthops.len() as u8);
                for nh in nexthops {
                    match nh {
                        NextHop::Ipv4(addr) => {
                            self.buf.push(nexthop_type::IPV4);
                            self.buf.extend_from_slice(&addr.octets());
                        }
                        NextHop::Ipv6(addr) => {
                            self.buf.push(nexthop_type::IPV6);
                            self.buf.extend_from_slice(&addr.octets());
                        }
                        NextHop::IfIndex(idx) => {
                            self.buf.push(nexthop_type::IFINDEX);
                            self.buf.write_u32::<BigEndian>(*idx).unwrap();
                        }
                    }
                }
            }
        }
        if msg_flags.contains(MessageFlags::DISTANCE) {
            self.buf.push(distance.expect("DISTANCE flag set without a distance"));
        }
        if msg_flags.contains(MessageFlags::METRIC) {
            self.buf.write_u32::<BigEndian>(metric.expect("METRIC flag set without a metric")).unwrap();
        }
        self.finish()
    }
}

/// A parsed `ROUTER_ID_UPDATE` body.
#[derive(Debug, Copy, Clone)]
pub struct RouterId {
    pub family: Family,
    pub address: std::net::IpAddr,
    pub prefixlen: u8,
}

/// Decode a `ROUTER_ID_UPDATE` body: family, address octets, prefixlen.
pub fn decode_router_id_update(cursor: &mut Cursor<&[u8]>) -> io::Result<RouterId> {
    let family_byte = cursor.read_u8()?;
    let family = Family::from_wire(family_byte)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown address family"))?;
    let address = read_address(cursor, family)?;
    let prefixlen = cursor.read_u8()?;
    Ok(RouterId { family, address, prefixlen })
}

fn read_address(cursor: &mut Cursor<&[u8]>, family: Family) -> io::Result<std::net::IpAddr> {
    match family {
        Family::Inet => {
            let mut octets = [0u8; 4];
            cursor.read_exact(&mut octets)?;
            Ok(std::net::IpAddr::V4(std::net::Ipv4Addr::from(octets)))
        }
        Family::Inet6 => {
            let mut octets = [0u8; 16];
            cursor.read_exact(&mut octets)?;
            Ok(std::net::IpAddr::V6(std::net::Ipv6Addr::from(octets)))
        }
    }
}

/// Fields common to `INTERFACE_ADD`/`DELETE`/`UP`/`DOWN`: fixed name,
/// ifindex and status word.
#[derive(Debug, Clone)]
pub struct InterfaceCommon {
    pub name: String,
    pub ifindex: u32,
    pub status: u8,
    pub flags: u64,
    pub metric: u32,
    pub mtu: u32,
    pub mtu6: u32,
    pub bandwidth: u32,
}

/// Fixed interface-name field width on the wire.
pub const NAMSIZ: usize = 20;

fn decode_interface_common(cursor: &mut Cursor<&[u8]>) -> io::Result<InterfaceCommon> {
    let mut name_buf = [0u8; NAMSIZ];
    cursor.read_exact(&mut name_buf)?;
    let nul = name_buf.iter().position(|&b| b == 0).unwrap_or(NAMSIZ);
    let name = String::from_utf8_lossy(&name_buf[..nul]).into_owned();
    let ifindex = cursor.read_u32::<BigEndian>()?;
    let status = cursor.read_u8()?;
    let flags = cursor.read_u64::<BigEndian>()?;
    let metric = cursor.read_u32::<BigEndian>()?;
    let mtu = cursor.read_u32::<BigEndian>()?;
    let mtu6 = cursor.read_u32::<BigEndian>()?;
    let bandwidth = cursor.read_u32::<BigEndian>()?;
    Ok(InterfaceCommon { name, ifindex, status, flags, metric, mtu, mtu6, bandwidth })
}

/// The link-layer tail carried only by `INTERFACE_ADD`: a
/// length-prefixed hardware address. A fixed-size platform `sockaddr`
/// encoding is also possible on the wire; this client only produces and
/// consumes the length-prefixed form.
#[derive(Debug, Clone)]
pub struct InterfaceAdd {
    pub common: InterfaceCommon,
    pub hw_addr: Vec<u8>,
}

pub fn decode_interface_add(cursor: &mut Cursor<&[u8]>) -> io::Result<InterfaceAdd> {
    let common = decode_interface_common(cursor)?;
    let hw_addr_len = cursor.read_u32::<BigEndian>()? as usize;
    let mut hw_addr = vec![0u8; hw_addr_len];
    cursor.read_exact(&mut hw_addr)?;
    Ok(InterfaceAdd { common, hw_addr })
}

pub fn decode_interface_delete(cursor: &mut Cursor<&[u8]>) -> io::Result<InterfaceCommon> {
    decode_interface_common(cursor)
}

pub fn decode_interface_up(cursor: &mut Cursor<&[u8]>) -> io::Result<InterfaceCommon> {
    decode_interface_common(cursor)
}

pub fn decode_interface_down(cursor: &mut Cursor<&[u8]>) -> io::Result<InterfaceCommon> {
    decode_interface_common(cursor)
}

/// A parsed `INTERFACE_ADDRESS_ADD`/`DELETE` body. An all-zero
/// destination on the wire decodes to `destination: None`.
#[derive(Debug, Clone)]
pub struct InterfaceAddress {
    pub ifindex: u32,
    pub ifc_flags: u8,
    pub family: Family,
    pub address: Prefix,
    pub destination: Option<Prefix>,
}

pub fn decode_interface_address(cursor: &mut Cursor<&[u8]>) -> io::Result<InterfaceAddress> {
    let ifindex = cursor.read_u32::<BigEndian>()?;
    let ifc_flags = cursor.read_u8()?;
    let family_byte = cursor.read_u8()?;
    let family = Family::from_wire(family_byte)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown address family"))?;
    let addr_len = family.addr_len();

    let mut addr_bytes = vec![0u8; addr_len];
    cursor.read_exact(&mut addr_bytes)?;
    let prefixlen = cursor.read_u8()?;
    let address = Prefix::new(prefixlen, addr_bytes);

    let mut dest_bytes = vec![0u8; addr_len];
    cursor.read_exact(&mut dest_bytes)?;
    let destination = if dest_bytes.iter().all(|&b| b == 0) {
        None
    } else {
        // A non-zero destination inherits the source prefix's length.
        Some(Prefix::new(prefixlen, dest_bytes))
    };

    Ok(InterfaceAddress { ifindex, ifc_flags, family, address, destination })
}

/// A parsed IPv4 or IPv6 route add/delete body, the decode-side mirror
/// of [`Encoder::route`].
#[derive(Debug, Clone)]
pub struct Route {
    pub route_type: RouteType,
    pub zebra_flags: ZebraFlags,
    pub msg_flags: MessageFlags,
    pub safi: Safi,
    pub prefix: Prefix,
    pub nexthops: Vec<NextHop>,
    pub distance: Option<u8>,
    pub metric: Option<u32>,
}

/// Decode an IPv4 or IPv6 route add/delete body. Which address family
/// the prefix and nexthops belong to is implied by which command
/// carried the frame, not repeated in the body; the prefix's own byte
/// width comes from its prefixlen, matching how `Encoder::route` writes
/// it.
pub fn decode_route(cursor: &mut Cursor<&[u8]>) -> io::Result<Route> {
    let route_type = cursor.read_u8()?;
    let zebra_flags = ZebraFlags::from_bits_truncate(cursor.read_u8()?);
    let msg_flags = MessageFlags::from_bits_truncate(cursor.read_u8()?);
    let safi = cursor.read_u16::<BigEndian>()?;
    let prefixlen = cursor.read_u8()?;
    let mut prefix_bytes = vec![0u8; Prefix::byte_len(prefixlen)];
    cursor.read_exact(&mut prefix_bytes)?;
    let prefix = Prefix::new(prefixlen, prefix_bytes);

    let mut nexthops = Vec::new();
    if msg_flags.contains(MessageFlags::NEXTHOP) {
        let count = cursor.read_u8()?;
        for _ in 0..count {
            match cursor.read_u8()? {
                nexthop_type::IPV4 => {
                    let mut octets = [0u8; 4];
                    cursor.read_exact(&mut octets)?;
                    nexthops.push(NextHop::Ipv4(Ipv4Addr::from(octets)));
                }
                nexthop_type::IPV6 => {
                    let mut octets = [0u8; 16];
                    cursor.read_exact(&mut octets)?;
                    nexthops.push(NextHop::Ipv6(Ipv6Addr::from(octets)));
                }
                nexthop_type::IFINDEX => {
                    nexthops.push(NextHop::IfIndex(cursor.read_u32::<BigEndian>()?));
                }
                nexthop_type::BLACKHOLE => {
                    // Synthetic marker only; no address payload follows and
                    // no NextHop entry is produced for it.
                }
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unknown nexthop type {other}"),
                    ))
                }
            }
        }
    }
    let distance =
        if msg_flags.contains(MessageFlags::DISTANCE) { Some(cursor.read_u8()?) } else { None };
    let metric = if msg_flags.contains(MessageFlags::METRIC) {
        Some(cursor.read_u32::<BigEndian>()?)
    } else {
        None
    };

    Ok(Route { route_type, zebra_flags, msg_flags, safi, prefix, nexthops, distance, metric })
}
