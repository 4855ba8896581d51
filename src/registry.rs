//! The interface table and connected-address registry are external
//! collaborators: this crate never owns interface/address storage
//! itself, it only names the lookups a handler needs in order to apply
//! the fields an `INTERFACE_*`/`INTERFACE_ADDRESS_*` frame carries. This
//! module defines those lookups as traits so a [`crate::client::Handler`]
//! can be written against them, and supplies `HashMap`-backed test
//! doubles; a real daemon embedding this crate brings its own
//! implementation (routing table, netlink cache, whatever it already
//! has).

use std::collections::HashMap;

use crate::codec::{InterfaceAddress, InterfaceCommon};

/// Lookup/creation operations a handler needs to apply an
/// `INTERFACE_ADD`/`DELETE`/`UP`/`DOWN` frame to whatever table the
/// embedding daemon keeps. `lookup_by_index`/`lookup_by_name` return a
/// mutable handle so a handler can overwrite the full set of fields an
/// UP/DOWN frame refreshes (flags, metric, MTU, bandwidth), not just
/// flip a status bit. There is no `remove`: a DELETE frame only carries
/// enough to look an interface up, removing it from whatever table
/// backs the registry is the caller's decision, not this trait's.
pub trait InterfaceRegistry {
    /// Look up an interface by ifindex, creating an empty entry under
    /// `name` if none exists yet.
    fn get_or_create(&mut self, name: &str, ifindex: u32) -> &mut InterfaceCommon;
    fn lookup_by_name(&mut self, name: &str) -> Option<&mut InterfaceCommon>;
    fn lookup_by_index(&mut self, ifindex: u32) -> Option<&mut InterfaceCommon>;
}

/// Lookup/creation operations invoked by `INTERFACE_ADDRESS_ADD`/
/// `DELETE` handlers.
pub trait ConnectedAddressRegistry {
    fn attach(&mut self, ifindex: u32, address: InterfaceAddress);
    /// Look up a connected address by ifindex and prefix length, so a
    /// DELETE handler can remove it from whatever table backs the
    /// registry.
    fn lookup(&mut self, ifindex: u32, prefixlen: u8) -> Option<&InterfaceAddress>;
}

/// Test double for [`InterfaceRegistry`], keyed by ifindex.
#[derive(Default)]
pub struct InterfaceTable {
    interfaces: HashMap<u32, InterfaceCommon>,
    by_name: HashMap<String, u32>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ifindex: u32) -> Option<&InterfaceCommon> {
        self.interfaces.get(&ifindex)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

impl InterfaceRegistry for InterfaceTable {
    fn get_or_create(&mut self, name: &str, ifindex: u32) -> &mut InterfaceCommon {
        self.by_name.insert(name.to_string(), ifindex);
        self.interfaces.entry(ifindex).or_insert_with(|| InterfaceCommon {
            name: name.to_string(),
            ifindex,
            status: 0,
            flags: 0,
            metric: 0,
            mtu: 0,
            mtu6: 0,
            bandwidth: 0,
        })
    }

    fn lookup_by_name(&mut self, name: &str) -> Option<&mut InterfaceCommon> {
        let ifindex = *self.by_name.get(name)?;
        self.interfaces.get_mut(&ifindex)
    }

    fn lookup_by_index(&mut self, ifindex: u32) -> Option<&mut InterfaceCommon> {
        self.interfaces.get_mut(&ifindex)
    }
}

/// Test double for [`ConnectedAddressRegistry`], keyed by
/// `(ifindex, prefixlen)` — not a faithful address-tree, just enough to
/// exercise attach/lookup-by-prefix.
#[derive(Default)]
pub struct ConnectedAddressTable {
    addresses: HashMap<(u32, u8), InterfaceAddress>,
}

impl ConnectedAddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&mut self, ifindex: u32, prefixlen: u8) -> Option<InterfaceAddress> {
        self.addresses.remove(&(ifindex, prefixlen))
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }
}

impl ConnectedAddressRegistry for ConnectedAddressTable {
    fn attach(&mut self, ifindex: u32, address: InterfaceAddress) {
        self.addresses.insert((ifindex, address.address.prefixlen), address);
    }

    fn lookup(&mut self, ifindex: u32, prefixlen: u8) -> Option<&InterfaceAddress> {
        self.addresses.get(&(ifindex, prefixlen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{Family, Prefix};

    #[test]
    fn get_or_create_is_idempotent_on_repeat_ifindex() {
        let mut table = InterfaceTable::new();
        table.get_or_create("eth0", 3).mtu = 1500;
        table.get_or_create("eth0", 3).metric = 1;
        assert_eq!(table.get(3).unwrap().mtu, 1500);
        assert_eq!(table.get(3).unwrap().metric, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn lookup_by_name_resolves_to_the_same_entry_as_by_index() {
        let mut table = InterfaceTable::new();
        table.get_or_create("eth0", 3);
        table.lookup_by_name("eth0").unwrap().flags = 0xff;
        assert_eq!(table.lookup_by_index(3).unwrap().flags, 0xff);
    }

    #[test]
    fn up_down_refresh_overwrites_the_full_interface_state() {
        let mut table = InterfaceTable::new();
        table.get_or_create("eth0", 3);
        {
            let iface = table.lookup_by_index(3).unwrap();
            iface.status = 1;
            iface.flags = 0x1103;
            iface.metric = 1;
            iface.mtu = 1500;
            iface.mtu6 = 1500;
            iface.bandwidth = 1_000_000;
        }
        let iface = table.lookup_by_index(3).unwrap();
        assert_eq!(iface.status, 1);
        assert_eq!(iface.flags, 0x1103);
        assert_eq!(iface.bandwidth, 1_000_000);
    }

    #[test]
    fn lookup_by_index_is_none_for_an_unknown_ifindex() {
        let mut table = InterfaceTable::new();
        assert!(table.lookup_by_index(99).is_none());
    }

    #[test]
    fn attach_then_lookup_then_remove_by_ifindex_and_prefixlen() {
        let mut table = ConnectedAddressTable::new();
        let addr = InterfaceAddress {
            ifindex: 3,
            ifc_flags: 0,
            family: Family::Inet,
            address: Prefix::new(24, vec![10, 0, 0, 0]),
            destination: None,
        };
        table.attach(3, addr);
        assert_eq!(table.len(), 1);
        assert!(table.lookup(3, 24).is_some());
        table.remove(3, 24);
        assert_eq!(table.len(), 0);
    }
}
