//! Binary property list (`bplist00`) reader.
//!
//! Layout: an 8 byte header, the object table, an offset table holding the
//! position of every object, and a 32 byte trailer describing the other two.
//! Containers reference their children by index into the offset table.

use crate::error::{ArchiveError, Result};
use crate::model::{Uid, Value};
use crate::parser::helpers::absolute_to_datetime;
use indexmap::IndexMap;

pub const MAGIC: &[u8; 8] = b"bplist00";
pub(crate) const TRAILER_LEN: usize = 32;
const MAX_DEPTH: usize = 512;
/// Upper bound on decoded values, counting every copy of a shared object.
pub const MAX_VALUES: usize = 1 << 22;

fn err(msg: impl Into<String>) -> ArchiveError {
    ArchiveError::Binary(msg.into())
}

/// Parse a complete binary plist.
pub fn parse_binary(bytes: &[u8]) -> Result<Value> {
    let mut reader = BinaryReader::new(bytes)?;
    let top = reader.top_object;
    reader.parse_object(top)
}

/// Big-endian unsigned integer of up to 8 bytes.
fn read_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

struct BinaryReader<'a> {
    bytes: &'a [u8],
    ref_size: usize,
    top_object: usize,
    /// End of the object table (start of the offset table).
    objects_end: usize,
    offsets: Vec<usize>,
    /// Objects currently being decoded, used to reject cycles.
    stack: Vec<usize>,
    /// Finished objects by index, with the number of values each expands to.
    cache: Vec<Option<(Value, usize)>>,
    /// Values produced so far.
    produced: usize,
}

impl<'a> BinaryReader<'a> {
    fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() + TRAILER_LEN {
            return Err(err(format!("File too short ({} bytes)", bytes.len())));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(err("Missing 'bplist00' header"));
        }

        let trailer = &bytes[bytes.len() - TRAILER_LEN..];
        let offset_size = trailer[6] as usize;
        let ref_size = trailer[7] as usize;
        let num_objects = read_uint(&trailer[8..16]);
        let top_object = read_uint(&trailer[16..24]);
        let table_offset = read_uint(&trailer[24..32]);

        if !(1..=8).contains(&offset_size) || !(1..=8).contains(&ref_size) {
            return Err(err(format!(
                "Invalid trailer sizes (offset {}, ref {})",
                offset_size, ref_size
            )));
        }
        if num_objects == 0 || top_object >= num_objects {
            return Err(err(format!(
                "Top object {} out of range ({} objects)",
                top_object, num_objects
            )));
        }

        let trailer_start = bytes.len() - TRAILER_LEN;
        let num_objects = usize::try_from(num_objects).map_err(|_| err("Too many objects"))?;
        let table_offset = usize::try_from(table_offset).map_err(|_| err("Bad offset table"))?;
        let table_end = num_objects
            .checked_mul(offset_size)
            .and_then(|len| len.checked_add(table_offset))
            .ok_or_else(|| err("Offset table overflows"))?;
        if table_offset < MAGIC.len() || table_end > trailer_start {
            return Err(err(format!(
                "Offset table at {} does not fit in {} bytes",
                table_offset,
                bytes.len()
            )));
        }

        let mut offsets = Vec::with_capacity(num_objects);
        for i in 0..num_objects {
            let start = table_offset + i * offset_size;
            let offset = read_uint(&bytes[start..start + offset_size]) as usize;
            if offset < MAGIC.len() || offset >= table_offset {
                return Err(err(format!("Object {} has invalid offset {}", i, offset)));
            }
            offsets.push(offset);
        }

        Ok(Self {
            bytes,
            ref_size,
            top_object: top_object as usize,
            objects_end: table_offset,
            cache: vec![None; offsets.len()],
            offsets,
            stack: Vec::new(),
            produced: 0,
        })
    }

    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8]> {
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.objects_end)
            .ok_or_else(|| err(format!("Object data at {} runs past the object table", start)))?;
        Ok(&self.bytes[start..end])
    }

    /// Length of a variable-sized object and the position its payload starts.
    /// A low nibble of `0xF` means the length follows as an integer object.
    fn read_length(&self, offset: usize, info: u8) -> Result<(usize, usize)> {
        if info != 0x0F {
            return Ok((info as usize, offset + 1));
        }
        let marker = self.slice(offset + 1, 1)?[0];
        if marker >> 4 != 0x1 || marker & 0x0F > 3 {
            return Err(err(format!("Bad length marker 0x{:02x} at {}", marker, offset)));
        }
        let width = 1usize << (marker & 0x0F);
        let len = read_uint(self.slice(offset + 2, width)?);
        let len = usize::try_from(len).map_err(|_| err("Length overflows"))?;
        Ok((len, offset + 2 + width))
    }

    fn read_refs(&self, start: usize, count: usize) -> Result<Vec<usize>> {
        let total = count
            .checked_mul(self.ref_size)
            .ok_or_else(|| err("Reference list overflows"))?;
        let raw = self.slice(start, total)?;
        raw.chunks(self.ref_size)
            .map(|chunk| {
                let r = read_uint(chunk) as usize;
                if r >= self.offsets.len() {
                    Err(err(format!(
                        "Object reference {} out of range ({} objects)",
                        r,
                        self.offsets.len()
                    )))
                } else {
                    Ok(r)
                }
            })
            .collect()
    }

    fn charge(&mut self, count: usize) -> Result<()> {
        let total = self.produced.saturating_add(count);
        if total > MAX_VALUES {
            return Err(err(format!("More than {} values", MAX_VALUES)));
        }
        self.produced = total;
        Ok(())
    }

    fn parse_object(&mut self, index: usize) -> Result<Value> {
        if let Some(size) = self.cache[index].as_ref().map(|(_, size)| *size) {
            self.charge(size)?;
            if let Some((value, _)) = &self.cache[index] {
                return Ok(value.clone());
            }
        }
        if self.stack.contains(&index) {
            return Err(err(format!("Object {} contains itself", index)));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(err("Nesting too deep"));
        }
        let before = self.produced;
        self.charge(1)?;
        self.stack.push(index);
        let result = self.decode(index);
        self.stack.pop();
        let value = result?;
        self.cache[index] = Some((value.clone(), self.produced - before));
        Ok(value)
    }

    fn decode(&mut self, index: usize) -> Result<Value> {
        let offset = self.offsets[index];
        let marker = self.slice(offset, 1)?[0];
        let info = marker & 0x0F;

        match marker >> 4 {
            0x0 => match info {
                0x8 => Ok(Value::Boolean(false)),
                0x9 => Ok(Value::Boolean(true)),
                _ => Err(err(format!("Unsupported singleton 0x{:02x}", marker))),
            },
            0x1 => {
                if info > 4 {
                    return Err(err(format!("Bad integer width marker 0x{:02x}", marker)));
                }
                let raw = self.slice(offset + 1, 1 << info)?;
                match raw.len() {
                    8 => Ok(Value::Integer(i64::from_be_bytes(
                        raw.try_into().map_err(|_| err("Bad 8 byte integer"))?,
                    ))),
                    16 => {
                        let wide = i128::from_be_bytes(
                            raw.try_into().map_err(|_| err("Bad 16 byte integer"))?,
                        );
                        i64::try_from(wide)
                            .map(Value::Integer)
                            .map_err(|_| err(format!("Integer {} does not fit in 64 bits", wide)))
                    }
                    _ => Ok(Value::Integer(read_uint(raw) as i64)),
                }
            }
            0x2 => match info {
                2 => {
                    let raw = self.slice(offset + 1, 4)?;
                    let bits = read_uint(raw) as u32;
                    Ok(Value::Real(f64::from(f32::from_bits(bits))))
                }
                3 => {
                    let raw = self.slice(offset + 1, 8)?;
                    Ok(Value::Real(f64::from_bits(read_uint(raw))))
                }
                _ => Err(err(format!("Bad real width marker 0x{:02x}", marker))),
            },
            0x3 if info == 3 => {
                let raw = self.slice(offset + 1, 8)?;
                Ok(Value::Date(absolute_to_datetime(f64::from_bits(read_uint(
                    raw,
                )))?))
            }
            0x4 => {
                let (len, start) = self.read_length(offset, info)?;
                Ok(Value::Data(self.slice(start, len)?.to_vec()))
            }
            0x5 => {
                let (len, start) = self.read_length(offset, info)?;
                let raw = self.slice(start, len)?;
                if !raw.is_ascii() {
                    return Err(err(format!("Non-ASCII byte in ASCII string at {}", offset)));
                }
                Ok(Value::String(raw.iter().map(|b| char::from(*b)).collect()))
            }
            0x6 => {
                let (len, start) = self.read_length(offset, info)?;
                let byte_len = len
                    .checked_mul(2)
                    .ok_or_else(|| err("UTF-16 string length overflows"))?;
                let raw = self.slice(start, byte_len)?;
                let units: Vec<u16> = raw
                    .chunks(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units)
                    .map(Value::String)
                    .map_err(|_| err(format!("Invalid UTF-16 string at {}", offset)))
            }
            0x8 => {
                let raw = self.slice(offset + 1, info as usize + 1)?;
                if raw.len() > 8 && raw[..raw.len() - 8].iter().any(|b| *b != 0) {
                    return Err(err(format!("UID at {} does not fit in 64 bits", offset)));
                }
                Ok(Value::Uid(Uid(read_uint(&raw[raw.len().saturating_sub(8)..]))))
            }
            0xA | 0xC => {
                let (count, start) = self.read_length(offset, info)?;
                let refs = self.read_refs(start, count)?;
                let mut items = Vec::with_capacity(refs.len());
                for r in refs {
                    items.push(self.parse_object(r)?);
                }
                Ok(Value::Array(items))
            }
            0xD => {
                let (count, start) = self.read_length(offset, info)?;
                let refs = self.read_refs(start, count.saturating_mul(2))?;
                let (key_refs, value_refs) = refs.split_at(count);
                let mut dict = IndexMap::with_capacity(count);
                for (k, v) in key_refs.iter().zip(value_refs) {
                    let key = match self.parse_object(*k)? {
                        Value::String(s) => s,
                        other => {
                            return Err(err(format!(
                                "Dictionary key must be a string, found {}",
                                other.type_name()
                            )));
                        }
                    };
                    let value = self.parse_object(*v)?;
                    dict.insert(key, value);
                }
                Ok(Value::Dictionary(dict))
            }
            _ => Err(err(format!(
                "Unknown object marker 0x{:02x} at offset {}",
                marker, offset
            ))),
        }
    }
}
