//! # Discovery and network configuration messages
//!
//! Two camera families are found with different probes:
//!
//! * **Family A** answers a broadcast [ENQUIRY] on UDP port
//!   [DISCOVERY_PORT] with a [NetworkReply], and is controlled with the
//!   full protocol on [FULL_PROTOCOL_PORT]. Its network settings can be
//!   changed with a [SetNetworkRequest].
//!
//! * **Family B** answers a [SEARCH_TOKEN] sent to the multicast group
//!   [MULTICAST_GROUP]:[MULTICAST_PORT] with a text [SearchReply], and is
//!   controlled with the simplified protocol on [SIMPLIFIED_PROTOCOL_PORT].
//!
//! ## Family A message format
//!
//! `02 field FF field FF ... 03`, where each field is ASCII `KEY:value`.
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::net::Ipv4Addr;

pub const DISCOVERY_PORT: u16 = 52380;
pub const FULL_PROTOCOL_PORT: u16 = 52381;
pub const SIMPLIFIED_PROTOCOL_PORT: u16 = 1259;
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 251);
pub const MULTICAST_PORT: u16 = 8005;

/// Family A network settings enquiry.
pub const ENQUIRY: &[u8] = b"\x02ENQ:network\xff\x03";

/// Family B search request.
pub const SEARCH_TOKEN: &[u8] = b"SEARCH * HDS/1.0\r\nSearch-Type: device\r\n\r\n";

/// Maximum family B display name length.
pub const NAME_LENGTH: usize = 8;

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const SEPARATOR: u8 = 0xff;

/// Splits a family A message into its `KEY:value` fields.
fn fields(raw: &[u8]) -> impl Iterator<Item = (&[u8], &[u8])> {
    raw.split(|&b| b == SEPARATOR).filter_map(|field| {
        let field = field.strip_prefix(&[STX]).unwrap_or(field);
        let colon = field.iter().position(|&b| b == b':')?;
        Some((&field[..colon], &field[colon + 1..]))
    })
}

fn field_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value).trim().to_string()
}

/// A family A camera's reply to [ENQUIRY].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NetworkReply {
    pub mac: String,
    pub name: String,
    pub ip: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub model: Option<String>,
}

impl NetworkReply {
    /// Parses a reply. Returns `None` for anything without `MAC` and `NAME`
    /// fields, such as our own [ENQUIRY] echoed back.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let mut mac = None;
        let mut name = None;
        let mut o = Self::default();

        for (key, value) in fields(raw) {
            match key {
                b"MAC" => mac = Some(field_string(value)),
                b"NAME" => name = Some(field_string(value)),
                b"IPADR" => o.ip = field_string(value).parse().ok(),
                b"MASK" => o.netmask = field_string(value).parse().ok(),
                b"GATEWAY" => o.gateway = field_string(value).parse().ok(),
                b"MODEL" => o.model = Some(field_string(value)),
                _ => trace!("ignoring network reply field {}", String::from_utf8_lossy(key)),
            }
        }

        o.mac = mac?;
        o.name = name?;
        Some(o)
    }
}

/// Changes a family A camera's network settings. Sent by broadcast, and
/// addressed by MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetNetworkRequest {
    pub mac: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// Up to 8 alphanumeric characters; longer names are truncated.
    pub name: String,
}

impl SetNetworkRequest {
    pub fn to_bytes(&self) -> Vec<u8> {
        let name: String = self.name.chars().take(NAME_LENGTH).collect();
        let ip = self.ip.to_string();
        let netmask = self.netmask.to_string();
        let gateway = self.gateway.to_string();

        let mut o = vec![STX];
        for (key, value) in [
            ("MAC", self.mac.as_str()),
            ("IPADR", ip.as_str()),
            ("MASK", netmask.as_str()),
            ("GATEWAY", gateway.as_str()),
            ("NAME", name.as_str()),
        ] {
            o.extend_from_slice(key.as_bytes());
            o.push(b':');
            o.extend_from_slice(value.as_bytes());
            o.push(SEPARATOR);
        }
        o.push(ETX);
        o
    }

    /// Returns `true` if `raw` is the camera acknowledging this request.
    pub fn is_ack(&self, raw: &[u8]) -> bool {
        fields(raw).any(|(key, value)| {
            key == b"ACK" && field_string(value).eq_ignore_ascii_case(&self.mac)
        })
    }
}

lazy_static! {
    static ref SEARCH_REPLY: Result<Regex, regex::Error> = Regex::new(
        r"(?s)Client-ID[=:]\s*(?P<client_id>\S+).*?Device-ID[=:]\s*(?P<device_id>\S+).*?\bIP[=:]\s*(?P<ip>\d{1,3}(?:\.\d{1,3}){3})(?:.*?MASK[=:]\s*(?P<mask>\d{1,3}(?:\.\d{1,3}){3}))?(?:.*?GATEWAY[=:]\s*(?P<gateway>\d{1,3}(?:\.\d{1,3}){3}))?.*?MAC[=:]\s*(?P<mac>[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){5})"
    );
}

/// A family B camera's reply to [SEARCH_TOKEN].
///
/// ```text
/// HDS/1.0 200 OK
/// Client-ID=4f2a
/// Device-ID=PTZ0A1B2C3D4
/// IP=10.0.0.5
/// MASK=255.255.255.0
/// GATEWAY=10.0.0.1
/// MAC=aa:bb:cc:dd:ee:ff
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReply {
    pub client_id: String,
    pub device_id: String,
    pub ip: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub mac: String,
}

impl SearchReply {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let pattern = SEARCH_REPLY
            .as_ref()
            .map_err(|e| error!("search reply pattern: {e}"))
            .ok()?;
        let caps = pattern.captures(raw)?;
        let text = |name: &str| caps.name(name).map(|m| field_string(m.as_bytes()));
        let addr = |name: &str| text(name).and_then(|v| v.parse::<Ipv4Addr>().ok());

        Some(Self {
            client_id: text("client_id")?,
            device_id: text("device_id")?,
            ip: addr("ip")?,
            netmask: addr("mask"),
            gateway: addr("gateway"),
            mac: text("mac")?,
        })
    }

    /// Display name: the first [NAME_LENGTH] characters of the device ID.
    pub fn display_name(&self) -> String {
        self.device_id.chars().take(NAME_LENGTH).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn network_reply() {
        let reply = NetworkReply::parse(b"\x02MAC:AA-BB\xffNAME:CAM1\xff\x03").unwrap();
        assert_eq!("AA-BB", reply.mac);
        assert_eq!("CAM1", reply.name);
        assert_eq!(None, reply.ip);

        // Field order seen from real cameras
        let reply = NetworkReply::parse(
            b"\x02MAC:00-1d-c1-12-34-56\xffINFO:\xffMODEL:IPCARD\xffSOFTVERSION:1.00\xffIPADR:192.168.0.100\xffMASK:255.255.255.0\xffGATEWAY:192.168.0.1\xffNAME:CAM2\xffWRITE:on\xff\x03",
        )
        .unwrap();
        assert_eq!("00-1d-c1-12-34-56", reply.mac);
        assert_eq!("CAM2", reply.name);
        assert_eq!(Some(Ipv4Addr::new(192, 168, 0, 100)), reply.ip);
        assert_eq!(Some(Ipv4Addr::new(255, 255, 255, 0)), reply.netmask);
        assert_eq!(Some(Ipv4Addr::new(192, 168, 0, 1)), reply.gateway);
        assert_eq!(Some("IPCARD".to_string()), reply.model);

        assert_eq!(None, NetworkReply::parse(ENQUIRY));
        assert_eq!(None, NetworkReply::parse(b"\x02MAC:AA-BB\xff\x03"));
        assert_eq!(None, NetworkReply::parse(b""));
    }

    #[test]
    fn set_network() {
        let req = SetNetworkRequest {
            mac: "AA-BB".to_string(),
            ip: Ipv4Addr::new(10, 0, 0, 9),
            netmask: Ipv4Addr::new(255, 0, 0, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            name: "STUDIOCAM1".to_string(),
        };
        assert_eq!(
            b"\x02MAC:AA-BB\xffIPADR:10.0.0.9\xffMASK:255.0.0.0\xffGATEWAY:10.0.0.1\xffNAME:STUDIOCA\xff\x03".as_slice(),
            req.to_bytes()
        );

        assert!(req.is_ack(b"\x02ACK:AA-BB\xff\x03"));
        assert!(req.is_ack(b"\x02ACK:aa-bb\xff\x03"));
        assert!(!req.is_ack(b"\x02ACK:CC-DD\xff\x03"));
        assert!(!req.is_ack(b"\x02NAK:AA-BB\xff\x03"));
        assert!(!req.is_ack(&req.to_bytes()));
    }

    #[test]
    fn search_reply() {
        let reply = SearchReply::parse(
            b"HDS/1.0 200 OK\r\nClient-ID=4f2a\r\nDevice-ID=PTZ0A1B2C3D4\r\nIP=10.0.0.5\r\nMASK=255.255.255.0\r\nGATEWAY=10.0.0.1\r\nMAC=aa:bb:cc:dd:ee:ff\r\n",
        )
        .unwrap();
        assert_eq!("4f2a", reply.client_id);
        assert_eq!("PTZ0A1B2C3D4", reply.device_id);
        assert_eq!("PTZ0A1B2", reply.display_name());
        assert_eq!(Ipv4Addr::new(10, 0, 0, 5), reply.ip);
        assert_eq!(Some(Ipv4Addr::new(255, 255, 255, 0)), reply.netmask);
        assert_eq!(Some(Ipv4Addr::new(10, 0, 0, 1)), reply.gateway);
        assert_eq!("aa:bb:cc:dd:ee:ff", reply.mac);

        // Mask and gateway are optional
        let reply =
            SearchReply::parse(b"Client-ID=1\nDevice-ID=CAM\nIP=10.0.0.5 MAC=aa:bb:cc:dd:ee:ff")
                .unwrap();
        assert_eq!(Ipv4Addr::new(10, 0, 0, 5), reply.ip);
        assert_eq!(None, reply.netmask);
        assert_eq!("CAM", reply.display_name());

        assert_eq!(None, SearchReply::parse(SEARCH_TOKEN));
        assert_eq!(None, SearchReply::parse(b"Client-ID=1\nDevice-ID=CAM\nIP=10.0.0.5\n"));
    }
}
