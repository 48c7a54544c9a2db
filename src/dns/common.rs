use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Upper bound on compression pointers followed while decoding one name.
pub const MAX_POINTER_HOPS: usize = 16;
pub const MAX_LABEL_LEN: usize = 63;
pub const MAX_NAME_LEN: usize = 255;

pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    /// `packet` is the whole message, needed to follow compression pointers.
    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<(), ParseError>;

    fn read_labels<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        let mut total = 0;
        loop {
            let label_len = reader.read_var::<u8>(8)?;
            if label_len == 0 {
                labels.push(String::new());
                break;
            }
            if label_len & 0xC0 == 0xC0 {
                let low = reader.read_var::<u8>(8)?;
                let target = (((label_len & 0x3F) as usize) << 8) | low as usize;
                let (rest, _) = decode_name(packet, target, packet)?;
                total += rest.iter().map(|l| l.len() + 1).sum::<usize>();
                labels.extend(rest);
                break;
            }
            if label_len as usize > MAX_LABEL_LEN {
                return Err(ParseError::InvalidLabel);
            }
            let mut buf = vec![0; label_len as usize];
            reader.read_bytes(&mut buf)?;
            total += buf.len() + 1;
            let label = String::from_utf8(buf).map_err(|_| ParseError::InvalidLabel)?;
            labels.push(label);
        }

        if total > MAX_NAME_LEN {
            return Err(ParseError::NameTooLong);
        }
        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        writer.write_bytes(&encode_name(labels)?)?;
        Ok(())
    }
}

/// Decodes a name starting at `start` in `data`, following compression
/// pointers into `packet`. Returns the labels (root label included) and the
/// position in `data` just past the name.
pub fn decode_name(
    data: &[u8],
    start: usize,
    packet: &[u8],
) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    let mut buf = data;
    let mut pos = start;
    let mut resume = None;
    let mut hops = 0;
    let mut total = 0;

    loop {
        let len = *buf
            .get(pos)
            .ok_or_else(|| ParseError::InvalidName("name runs past end of message".into()))?
            as usize;

        if len == 0 {
            labels.push(String::new());
            return Ok((labels, resume.unwrap_or(pos + 1)));
        }

        if len & 0xC0 == 0xC0 {
            let low = *buf
                .get(pos + 1)
                .ok_or_else(|| ParseError::InvalidName("truncated compression pointer".into()))?
                as usize;
            if resume.is_none() {
                resume = Some(pos + 2);
            }
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(ParseError::PointerLoop);
            }
            buf = packet;
            pos = ((len & 0x3F) << 8) | low;
            continue;
        }

        if len > MAX_LABEL_LEN {
            return Err(ParseError::InvalidLabel);
        }
        let raw = buf
            .get(pos + 1..pos + 1 + len)
            .ok_or_else(|| ParseError::InvalidName("label runs past end of message".into()))?;
        total += len + 1;
        if total > MAX_NAME_LEN {
            return Err(ParseError::NameTooLong);
        }
        labels.push(String::from_utf8(raw.to_vec()).map_err(|_| ParseError::InvalidLabel)?);
        pos += 1 + len;
    }
}

/// Encodes labels without compression, always terminating with the root label.
pub fn encode_name(labels: &[String]) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::with_capacity(labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1);
    for label in labels.iter().filter(|l| !l.is_empty()) {
        if label.len() > MAX_LABEL_LEN {
            return Err(ParseError::InvalidLabel);
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    if out.len() > MAX_NAME_LEN {
        return Err(ParseError::NameTooLong);
    }
    Ok(out)
}

/// Splits a presentation-format name into labels, appending the root label.
pub fn labels_from_name(name: &str) -> Vec<String> {
    let mut labels: Vec<String> = name
        .split('.')
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    labels.push(String::new());
    labels
}

/// Renders labels as a fully-qualified name with a trailing dot.
pub fn name_from_labels(labels: &[String]) -> String {
    let mut name = labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(".");
    name.push('.');
    name
}
