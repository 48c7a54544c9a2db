use std::fmt;

use bitstream_io::{BitRead, BitReader, BitWriter, BitWrite, Endianness};

use super::{
    ParseError,
    common::{PacketComponent, labels_from_name, name_from_labels},
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSQuestion {
    pub labels: Vec<String>,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl DNSQuestion {
    pub fn new(name: &str, qtype: DNSResourceType) -> Self {
        Self {
            labels: labels_from_name(name),
            qtype,
            qclass: DNSResourceClass::IN,
        }
    }

    /// Fully-qualified queried name, case preserved.
    pub fn name(&self) -> String {
        name_from_labels(&self.labels)
    }
}

impl fmt::Display for DNSQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name(), self.qclass, self.qtype)
    }
}

impl PacketComponent for DNSQuestion {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.qtype.into())?;
        writer.write_var::<u16>(16, self.qclass.into())?;
        Ok(())
    }

    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<(), ParseError> {
        let labels = self.read_labels(reader, packet)?;
        let qtype = reader.read_var::<u16>(16)?.into();
        let qclass = reader.read_var::<u16>(16)?.into();
        *self = DNSQuestion {
            labels,
            qtype,
            qclass,
        };
        Ok(())
    }
}
