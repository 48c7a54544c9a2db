use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{PacketComponent, decode_name, encode_name, labels_from_name, name_from_labels},
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: DNSResourceData,
}

/// Record data. Types whose rdata embeds domain names are decoded so that
/// compression pointers into the original message are resolved; everything
/// else is carried as raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DNSResourceData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(Vec<String>),
    CNAME(Vec<String>),
    PTR(Vec<String>),
    MX {
        preference: u16,
        exchange: Vec<String>,
    },
    SOA {
        mname: Vec<String>,
        rname: Vec<String>,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: Vec<String>,
    },
    Raw(Vec<u8>),
}

impl Default for DNSResourceData {
    fn default() -> Self {
        DNSResourceData::Raw(Vec::new())
    }
}

impl DNSResource {
    pub fn a(name: &str, ttl: u32, address: Ipv4Addr) -> Self {
        Self {
            labels: labels_from_name(name),
            rtype: DNSResourceType::A,
            rclass: DNSResourceClass::IN,
            ttl,
            rdata: DNSResourceData::A(address),
        }
    }

    pub fn ns(name: &str, ttl: u32, target: &str) -> Self {
        Self {
            labels: labels_from_name(name),
            rtype: DNSResourceType::NS,
            rclass: DNSResourceClass::IN,
            ttl,
            rdata: DNSResourceData::NS(labels_from_name(target)),
        }
    }

    /// Owner name, fully qualified.
    pub fn name(&self) -> String {
        name_from_labels(&self.labels)
    }
}

impl fmt::Display for DNSResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name(),
            self.ttl,
            self.rclass,
            self.rtype,
            self.rdata
        )
    }
}

impl fmt::Display for DNSResourceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSResourceData::A(addr) => write!(f, "{}", addr),
            DNSResourceData::AAAA(addr) => write!(f, "{}", addr),
            DNSResourceData::NS(name) | DNSResourceData::CNAME(name) | DNSResourceData::PTR(name) => {
                write!(f, "{}", name_from_labels(name))
            }
            DNSResourceData::MX {
                preference,
                exchange,
            } => write!(f, "{} {}", preference, name_from_labels(exchange)),
            DNSResourceData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{} {} {} {} {} {} {}",
                name_from_labels(mname),
                name_from_labels(rname),
                serial,
                refresh,
                retry,
                expire,
                minimum
            ),
            DNSResourceData::SRV {
                priority,
                weight,
                port,
                target,
            } => write!(
                f,
                "{} {} {} {}",
                priority,
                weight,
                port,
                name_from_labels(target)
            ),
            DNSResourceData::Raw(bytes) => {
                write!(f, "\\# {}", bytes.len())?;
                if !bytes.is_empty() {
                    write!(f, " ")?;
                    for b in bytes {
                        write!(f, "{:02x}", b)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16, ParseError> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| ParseError::InvalidRdata("rdata too short".into()))
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32, ParseError> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ParseError::InvalidRdata("rdata too short".into()))
}

impl DNSResourceData {
    /// Decodes `rdata` for `rtype`; `packet` resolves compressed names.
    pub fn decode(
        rtype: DNSResourceType,
        rdata: &[u8],
        packet: &[u8],
    ) -> Result<Self, ParseError> {
        let data = match rtype {
            DNSResourceType::A => {
                let octets: [u8; 4] = rdata
                    .try_into()
                    .map_err(|_| ParseError::InvalidRdata(format!("A rdata of {} bytes", rdata.len())))?;
                DNSResourceData::A(Ipv4Addr::from(octets))
            }
            DNSResourceType::AAAA => {
                let octets: [u8; 16] = rdata.try_into().map_err(|_| {
                    ParseError::InvalidRdata(format!("AAAA rdata of {} bytes", rdata.len()))
                })?;
                DNSResourceData::AAAA(Ipv6Addr::from(octets))
            }
            DNSResourceType::NS => DNSResourceData::NS(decode_name(rdata, 0, packet)?.0),
            DNSResourceType::CNAME => DNSResourceData::CNAME(decode_name(rdata, 0, packet)?.0),
            DNSResourceType::PTR => DNSResourceData::PTR(decode_name(rdata, 0, packet)?.0),
            DNSResourceType::MX => DNSResourceData::MX {
                preference: read_u16(rdata, 0)?,
                exchange: decode_name(rdata, 2, packet)?.0,
            },
            DNSResourceType::SOA => {
                let (mname, pos) = decode_name(rdata, 0, packet)?;
                let (rname, pos) = decode_name(rdata, pos, packet)?;
                DNSResourceData::SOA {
                    mname,
                    rname,
                    serial: read_u32(rdata, pos)?,
                    refresh: read_u32(rdata, pos + 4)?,
                    retry: read_u32(rdata, pos + 8)?,
                    expire: read_u32(rdata, pos + 12)?,
                    minimum: read_u32(rdata, pos + 16)?,
                }
            }
            DNSResourceType::SRV => DNSResourceData::SRV {
                priority: read_u16(rdata, 0)?,
                weight: read_u16(rdata, 2)?,
                port: read_u16(rdata, 4)?,
                target: decode_name(rdata, 6, packet)?.0,
            },
            _ => DNSResourceData::Raw(rdata.to_vec()),
        };
        Ok(data)
    }

    /// Wire form with every embedded name written out in full.
    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        let bytes = match self {
            DNSResourceData::A(addr) => addr.octets().to_vec(),
            DNSResourceData::AAAA(addr) => addr.octets().to_vec(),
            DNSResourceData::NS(name) | DNSResourceData::CNAME(name) | DNSResourceData::PTR(name) => {
                encode_name(name)?
            }
            DNSResourceData::MX {
                preference,
                exchange,
            } => {
                let mut out = preference.to_be_bytes().to_vec();
                out.extend(encode_name(exchange)?);
                out
            }
            DNSResourceData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                let mut out = encode_name(mname)?;
                out.extend(encode_name(rname)?);
                for value in [serial, refresh, retry, expire, minimum] {
                    out.extend_from_slice(&value.to_be_bytes());
                }
                out
            }
            DNSResourceData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                let mut out = Vec::new();
                for value in [priority, weight, port] {
                    out.extend_from_slice(&value.to_be_bytes());
                }
                out.extend(encode_name(target)?);
                out
            }
            DNSResourceData::Raw(bytes) => bytes.clone(),
        };
        Ok(bytes)
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        let rdata = self.rdata.encode()?;
        let rdlength = u16::try_from(rdata.len())
            .map_err(|_| ParseError::InvalidRdata(format!("rdata of {} bytes", rdata.len())))?;

        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, rdlength)?;
        writer.write_bytes(&rdata)?;
        Ok(())
    }

    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<(), ParseError> {
        self.labels = self.read_labels(reader, packet)?;
        self.rtype = reader.read_var::<u16>(16)?.into();
        self.rclass = reader.read_var::<u16>(16)?.into();
        self.ttl = reader.read_var::<u32>(32)?;
        let rdlength = reader.read_var::<u16>(16)?;
        let mut buf = vec![0_u8; rdlength as usize];
        reader.read_bytes(&mut buf)?;
        self.rdata = DNSResourceData::decode(self.rtype, &buf, packet)?;

        Ok(())
    }
}
