use crate::protocol::{
    discovery::{NetworkReply, SearchReply, FULL_PROTOCOL_PORT, SIMPLIFIED_PROTOCOL_PORT},
    ProtocolVariant,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

/// How to reach one physical camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraDescriptor {
    pub name: String,
    pub addr: IpAddr,
    /// Hardware address, as the camera reports it.
    pub mac: String,
    pub netmask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    /// Control port.
    pub port: u16,
    pub protocol: ProtocolVariant,
}

impl CameraDescriptor {
    /// A camera using the full protocol on the standard port.
    pub fn new(name: impl Into<String>, addr: IpAddr, mac: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr,
            mac: mac.into(),
            netmask: None,
            gateway: None,
            port: FULL_PROTOCOL_PORT,
            protocol: ProtocolVariant::Full,
        }
    }

    /// A camera using the simplified protocol on its alternate port.
    pub fn simplified(name: impl Into<String>, addr: IpAddr, mac: impl Into<String>) -> Self {
        Self {
            port: SIMPLIFIED_PROTOCOL_PORT,
            protocol: ProtocolVariant::Simplified,
            ..Self::new(name, addr, mac)
        }
    }

    /// A family A camera which answered an enquiry from `source`.
    pub fn from_network_reply(reply: &NetworkReply, source: IpAddr) -> Self {
        Self {
            netmask: reply.netmask,
            gateway: reply.gateway,
            ..Self::new(reply.name.clone(), source, reply.mac.clone())
        }
    }

    /// A family B camera which answered a search.
    pub fn from_search_reply(reply: &SearchReply) -> Self {
        Self {
            netmask: reply.netmask,
            gateway: reply.gateway,
            ..Self::simplified(reply.display_name(), reply.ip.into(), reply.mac.clone())
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl Display for CameraDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}) {}", self.name, self.mac, self.addr)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn family_a() {
        let reply = NetworkReply::parse(b"\x02MAC:AA-BB\xffNAME:CAM1\xff\x03").unwrap();
        let desc = CameraDescriptor::from_network_reply(&reply, Ipv4Addr::new(10, 0, 1, 20).into());
        assert_eq!("AA-BB", desc.mac);
        assert_eq!("CAM1", desc.name);
        assert_eq!(ProtocolVariant::Full, desc.protocol);
        assert_eq!(52381, desc.port);
        assert_eq!("CAM1(AA-BB) 10.0.1.20", desc.to_string());
    }

    #[test]
    fn family_b() {
        let reply = SearchReply::parse(
            b"Client-ID=7\r\nDevice-ID=HD20X0012345\r\nIP=10.0.0.5\r\nMASK=255.255.255.0\r\nGATEWAY=10.0.0.1\r\nMAC=aa:bb:cc:dd:ee:ff\r\n",
        )
        .unwrap();
        let desc = CameraDescriptor::from_search_reply(&reply);
        assert_eq!(ProtocolVariant::Simplified, desc.protocol);
        assert_eq!(1259, desc.port);
        assert_eq!("aa:bb:cc:dd:ee:ff", desc.mac);
        assert_eq!("HD20X001", desc.name);
        assert_eq!(SocketAddr::from(([10, 0, 0, 5], 1259)), desc.socket_addr());
        assert_eq!(Some(Ipv4Addr::new(10, 0, 0, 1)), desc.gateway);
    }
}
