pub mod common;
pub mod constants;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use bitstream_io::{BigEndian, BitReader, BitWriter};
use common::PacketComponent;
use constants::{DEFAULT_UDP_PAYLOAD, DNSRcode};
use enums::DNSResourceType;
use header::DNSHeader;
use question::DNSQuestion;
use resource::DNSResource;
use tracing::{debug, trace};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
}

#[derive(Debug)]
pub enum ParseError {
    InvalidHeader,
    InvalidLabel,
    InvalidName(String),
    InvalidRdata(String),
    NameTooLong,
    PointerLoop,
    TooManyRecords,
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidHeader => write!(f, "Invalid DNS header"),
            ParseError::InvalidLabel => write!(f, "Invalid DNS label"),
            ParseError::InvalidName(e) => write!(f, "Invalid DNS name: {}", e),
            ParseError::InvalidRdata(e) => write!(f, "Invalid record data: {}", e),
            ParseError::NameTooLong => write!(f, "DNS name too long"),
            ParseError::PointerLoop => write!(f, "Compression pointer loop"),
            ParseError::TooManyRecords => write!(f, "Too many records for one message"),
            ParseError::InvalidBitStream(e) => write!(f, "Invalid bit stream: {}", e),
        }
    }
}

impl std::error::Error for ParseError {}

fn section_count(len: usize) -> Result<u16, ParseError> {
    u16::try_from(len).map_err(|_| ParseError::TooManyRecords)
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        if buf.len() < header::HEADER_LEN {
            return Err(ParseError::InvalidHeader);
        }
        let mut reader = BitReader::<_, BigEndian>::new(buf);
        let mut packet = DNSPacket::default();
        packet.header.read(&mut reader, buf)?;
        debug!(
            "Parsed DNS header: id={}, qr={}, opcode={}, questions={}",
            packet.header.id, packet.header.qr, packet.header.opcode, packet.header.qdcount
        );

        for _ in 0..packet.header.qdcount {
            let mut question = DNSQuestion::default();
            question.read(&mut reader, buf)?;
            packet.questions.push(question);
        }

        for _ in 0..packet.header.ancount {
            let mut answer = DNSResource::default();
            answer.read(&mut reader, buf)?;
            packet.answers.push(answer);
        }

        for _ in 0..packet.header.nscount {
            let mut authority = DNSResource::default();
            authority.read(&mut reader, buf)?;
            packet.authorities.push(authority);
        }

        for _ in 0..packet.header.arcount {
            let mut resource = DNSResource::default();
            resource.read(&mut reader, buf)?;
            packet.resources.push(resource);
        }

        Ok(packet)
    }

    /// Encodes the message without name compression. Section counts in the
    /// header are taken from the sections themselves.
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

        let mut header = self.header.clone();
        header.qdcount = section_count(self.questions.len())?;
        header.ancount = section_count(self.answers.len())?;
        header.nscount = section_count(self.authorities.len())?;
        header.arcount = section_count(self.resources.len())?;
        header.write(&mut writer)?;

        for question in self.questions.iter() {
            question.write(&mut writer)?;
        }

        for answer in self.answers.iter() {
            answer.write(&mut writer)?;
        }

        for authority in self.authorities.iter() {
            authority.write(&mut writer)?;
        }

        for resource in self.resources.iter() {
            resource.write(&mut writer)?;
        }

        Ok(buf)
    }

    /// Decodes only the fixed header, for messages whose body is unusable.
    pub fn parse_header(buf: &[u8]) -> Result<DNSHeader, ParseError> {
        if buf.len() < header::HEADER_LEN {
            return Err(ParseError::InvalidHeader);
        }
        let mut reader = BitReader::<_, BigEndian>::new(buf);
        let mut header = DNSHeader::default();
        header.read(&mut reader, buf)?;
        Ok(header)
    }

    pub fn is_response(&self) -> bool {
        self.header.qr
    }

    /// Empty reply to `request`: id, opcode and RD copied, questions echoed.
    pub fn reply_to(request: &DNSPacket) -> Self {
        let mut packet = DNSPacket::default();
        packet.header.id = request.header.id;
        packet.header.qr = true;
        packet.header.opcode = request.header.opcode;
        packet.header.rd = request.header.rd;
        packet.header.rcode = DNSRcode::NOERROR;
        packet.questions = request.questions.clone();
        packet
    }

    /// Error reply echoing the question section with recursion available.
    pub fn error_response(request: &DNSPacket, rcode: u8) -> Self {
        let mut packet = Self::reply_to(request);
        packet.header.ra = true;
        packet.header.rcode = rcode;
        packet
    }

    pub fn servfail_response(request: &DNSPacket) -> Self {
        Self::error_response(request, DNSRcode::SERVFAIL)
    }

    pub fn formerr_response(request: &DNSPacket) -> Self {
        Self::error_response(request, DNSRcode::FORMERR)
    }

    /// Maximum UDP reply size the sender of this message accepts, read from
    /// its OPT pseudo-record when present.
    pub fn max_udp_payload_size(&self) -> u16 {
        self.resources
            .iter()
            .find(|r| r.rtype == DNSResourceType::OPT)
            .map(|opt| u16::from(opt.rclass).max(DEFAULT_UDP_PAYLOAD))
            .unwrap_or(DEFAULT_UDP_PAYLOAD)
    }

    /// Header and questions only, with TC set.
    pub fn truncated(&self) -> Self {
        let mut packet = DNSPacket {
            header: self.header.clone(),
            questions: self.questions.clone(),
            ..Default::default()
        };
        packet.header.tc = true;
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::DNSResourceClass;
    use crate::dns::resource::DNSResourceData;
    use std::net::Ipv4Addr;

    fn query_bytes() -> Vec<u8> {
        vec![
            0x12, 0x34, // ID
            0x01, 0x00, // Flags: standard query, RD
            0x00, 0x01, // Questions: 1
            0x00, 0x00, // Answers: 0
            0x00, 0x00, // Authority: 0
            0x00, 0x00, // Additional: 0
            0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0x03, b'c', b'o', b'm', 0x00,
            0x00, 0x01, // Type: A
            0x00, 0x01, // Class: IN
        ]
    }

    #[test]
    fn test_parse_query() {
        let packet = DNSPacket::parse(&query_bytes()).unwrap();
        assert_eq!(packet.header.id, 0x1234);
        assert!(packet.header.rd);
        assert!(!packet.is_response());
        assert_eq!(packet.questions.len(), 1);
        assert_eq!(packet.questions[0].name(), "example.com.");
        assert_eq!(packet.questions[0].qtype, DNSResourceType::A);
    }

    #[test]
    fn test_serialize_matches_wire_form() {
        let packet = DNSPacket::parse(&query_bytes()).unwrap();
        assert_eq!(packet.serialize().unwrap(), query_bytes());
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        assert!(matches!(
            DNSPacket::parse(&[0x12, 0x34, 0x01]),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_parse_response_with_compressed_owner() {
        let mut bytes = query_bytes();
        bytes[2] = 0x81; // QR + RD
        bytes[3] = 0x80; // RA
        bytes[7] = 0x01; // ANCOUNT = 1
        // answer: pointer to question name at offset 12
        bytes.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x01, 0x2C]); // TTL 300
        bytes.extend_from_slice(&[0x00, 0x04, 93, 184, 216, 34]);

        let packet = DNSPacket::parse(&bytes).unwrap();
        assert!(packet.is_response());
        assert!(packet.header.ra);
        assert_eq!(packet.answers.len(), 1);
        assert_eq!(
            packet.answers[0].to_string(),
            "example.com. 300 IN A 93.184.216.34"
        );
    }

    #[test]
    fn test_header_counts_follow_sections() {
        let request = DNSPacket::parse(&query_bytes()).unwrap();
        let mut reply = DNSPacket::reply_to(&request);
        reply
            .answers
            .push(DNSResource::a("example.com.", 60, Ipv4Addr::new(10, 0, 0, 1)));

        let parsed = DNSPacket::parse(&reply.serialize().unwrap()).unwrap();
        assert_eq!(parsed.header.ancount, 1);
        assert_eq!(parsed.header.qdcount, 1);
        assert_eq!(parsed.answers[0].rdata, DNSResourceData::A(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_servfail_echoes_question() {
        let request = DNSPacket::parse(&query_bytes()).unwrap();
        let response = DNSPacket::servfail_response(&request);
        assert_eq!(response.header.id, request.header.id);
        assert_eq!(response.header.rcode, DNSRcode::SERVFAIL);
        assert!(response.header.ra);
        assert!(response.header.qr);
        assert_eq!(response.questions, request.questions);
        assert!(response.answers.is_empty());
    }

    #[test]
    fn test_payload_size_from_opt() {
        let mut request = DNSPacket::parse(&query_bytes()).unwrap();
        assert_eq!(request.max_udp_payload_size(), 512);

        request.resources.push(DNSResource {
            labels: vec![String::new()],
            rtype: DNSResourceType::OPT,
            rclass: DNSResourceClass::from(1232),
            ttl: 0,
            rdata: DNSResourceData::Raw(Vec::new()),
        });
        assert_eq!(request.max_udp_payload_size(), 1232);

        // OPT survives a round trip with its payload size intact
        let parsed = DNSPacket::parse(&request.serialize().unwrap()).unwrap();
        assert_eq!(parsed.max_udp_payload_size(), 1232);
    }

    #[test]
    fn test_truncated_keeps_questions_only() {
        let request = DNSPacket::parse(&query_bytes()).unwrap();
        let mut reply = DNSPacket::reply_to(&request);
        reply
            .answers
            .push(DNSResource::a("example.com.", 60, Ipv4Addr::new(10, 0, 0, 1)));

        let truncated = reply.truncated();
        assert!(truncated.header.tc);
        assert!(truncated.answers.is_empty());
        assert_eq!(truncated.questions.len(), 1);
    }
}
