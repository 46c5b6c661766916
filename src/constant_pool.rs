//! Class-file constant pool, read and (append-only) rewritten.
//!
//! Strings are kept as raw modified UTF-8 so that rewriting a class file
//! leaves every untouched constant byte-identical.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const CLASS_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("truncated class file")]
    Truncated,
    #[error("bad magic number")]
    BadMagic,
    #[error("unknown constant pool tag {0}")]
    UnknownTag(u8),
    #[error("constant pool index {0} out of range")]
    BadIndex(u16),
    #[error("constant pool entry {index} is not a {expected}")]
    WrongKind { index: u16, expected: &'static str },
    #[error("constant pool entry {0} is not valid modified UTF-8")]
    BadUtf8(u16),
    #[error("constant pool overflow")]
    Overflow,
    #[error("{0}")]
    Malformed(String),
}

impl From<std::io::Error> for FormatError {
    fn from(_: std::io::Error) -> Self {
        FormatError::Truncated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    // slot 0 and the slot after a long/double are `None`
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![None],
        }
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self, FormatError> {
        let count = reader.read_u16::<BigEndian>()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(None);

        while entries.len() < count as usize {
            let tag = reader.read_u8()?;
            let constant = match tag {
                1 => {
                    let len = reader.read_u16::<BigEndian>()? as usize;
                    let mut bytes = vec![0u8; len];
                    reader.read_exact(&mut bytes)?;
                    Constant::Utf8(bytes)
                }
                3 => Constant::Integer(reader.read_u32::<BigEndian>()?),
                4 => Constant::Float(reader.read_u32::<BigEndian>()?),
                5 => Constant::Long(reader.read_u64::<BigEndian>()?),
                6 => Constant::Double(reader.read_u64::<BigEndian>()?),
                7 => Constant::Class(reader.read_u16::<BigEndian>()?),
                8 => Constant::String(reader.read_u16::<BigEndian>()?),
                9 => Constant::FieldRef(read_u16(reader)?, read_u16(reader)?),
                10 => Constant::MethodRef(read_u16(reader)?, read_u16(reader)?),
                11 => Constant::InterfaceMethodRef(read_u16(reader)?, read_u16(reader)?),
                12 => Constant::NameAndType(read_u16(reader)?, read_u16(reader)?),
                15 => Constant::MethodHandle(reader.read_u8()?, read_u16(reader)?),
                16 => Constant::MethodType(read_u16(reader)?),
                17 => Constant::Dynamic(read_u16(reader)?, read_u16(reader)?),
                18 => Constant::InvokeDynamic(read_u16(reader)?, read_u16(reader)?),
                19 => Constant::Module(read_u16(reader)?),
                20 => Constant::Package(read_u16(reader)?),
                other => return Err(FormatError::UnknownTag(other)),
            };
            let wide = constant.is_wide();
            entries.push(Some(constant));
            if wide {
                entries.push(None);
            }
        }

        if entries.len() != count as usize {
            return Err(FormatError::Malformed(
                "wide constant overruns the constant pool".to_string(),
            ));
        }
        Ok(Self { entries })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<BigEndian>(self.entries.len() as u16)?;
        for constant in self.entries.iter().flatten() {
            match constant {
                Constant::Utf8(bytes) => {
                    writer.write_u8(1)?;
                    writer.write_u16::<BigEndian>(bytes.len() as u16)?;
                    writer.write_all(bytes)?;
                }
                Constant::Integer(v) => tagged_u32(writer, 3, *v)?,
                Constant::Float(v) => tagged_u32(writer, 4, *v)?,
                Constant::Long(v) => {
                    writer.write_u8(5)?;
                    writer.write_u64::<BigEndian>(*v)?;
                }
                Constant::Double(v) => {
                    writer.write_u8(6)?;
                    writer.write_u64::<BigEndian>(*v)?;
                }
                Constant::Class(i) => tagged_u16(writer, 7, *i)?,
                Constant::String(i) => tagged_u16(writer, 8, *i)?,
                Constant::FieldRef(a, b) => tagged_pair(writer, 9, *a, *b)?,
                Constant::MethodRef(a, b) => tagged_pair(writer, 10, *a, *b)?,
                Constant::InterfaceMethodRef(a, b) => tagged_pair(writer, 11, *a, *b)?,
                Constant::NameAndType(a, b) => tagged_pair(writer, 12, *a, *b)?,
                Constant::MethodHandle(kind, i) => {
                    writer.write_u8(15)?;
                    writer.write_u8(*kind)?;
                    writer.write_u16::<BigEndian>(*i)?;
                }
                Constant::MethodType(i) => tagged_u16(writer, 16, *i)?,
                Constant::Dynamic(a, b) => tagged_pair(writer, 17, *a, *b)?,
                Constant::InvokeDynamic(a, b) => tagged_pair(writer, 18, *a, *b)?,
                Constant::Module(i) => tagged_u16(writer, 19, *i)?,
                Constant::Package(i) => tagged_u16(writer, 20, *i)?,
            }
        }
        Ok(())
    }

    pub fn get(&self, index: u16) -> Result<&Constant, FormatError> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(FormatError::BadIndex(index))
    }

    pub fn utf8(&self, index: u16) -> Result<String, FormatError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => {
                decode_modified_utf8(bytes).ok_or(FormatError::BadUtf8(index))
            }
            _ => Err(FormatError::WrongKind {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Optional string: index 0 means absent.
    pub fn opt_utf8(&self, index: u16) -> Result<Option<String>, FormatError> {
        if index == 0 {
            Ok(None)
        } else {
            self.utf8(index).map(Some)
        }
    }

    pub fn class_name(&self, index: u16) -> Result<String, FormatError> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(FormatError::WrongKind {
                index,
                expected: "Class",
            }),
        }
    }

    pub fn opt_class_name(&self, index: u16) -> Result<Option<String>, FormatError> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    pub fn module_name(&self, index: u16) -> Result<String, FormatError> {
        match self.get(index)? {
            Constant::Module(name) => self.utf8(*name),
            _ => Err(FormatError::WrongKind {
                index,
                expected: "Module",
            }),
        }
    }

    pub fn package_name(&self, index: u16) -> Result<String, FormatError> {
        match self.get(index)? {
            Constant::Package(name) => self.utf8(*name),
            _ => Err(FormatError::WrongKind {
                index,
                expected: "Package",
            }),
        }
    }

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16, FormatError> {
        let encoded = encode_modified_utf8(value);
        if let Some(index) = self.position(|c| matches!(c, Constant::Utf8(b) if *b == encoded)) {
            return Ok(index);
        }
        self.push(Constant::Utf8(encoded))
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16, FormatError> {
        let name = self.intern_utf8(internal_name)?;
        self.intern_ref(Constant::Class(name))
    }

    pub fn intern_module(&mut self, module_name: &str) -> Result<u16, FormatError> {
        let name = self.intern_utf8(module_name)?;
        self.intern_ref(Constant::Module(name))
    }

    pub fn intern_package(&mut self, internal_name: &str) -> Result<u16, FormatError> {
        let name = self.intern_utf8(internal_name)?;
        self.intern_ref(Constant::Package(name))
    }

    fn intern_ref(&mut self, constant: Constant) -> Result<u16, FormatError> {
        if let Some(index) = self.position(|c| *c == constant) {
            return Ok(index);
        }
        self.push(constant)
    }

    fn position(&self, pred: impl Fn(&Constant) -> bool) -> Option<u16> {
        self.entries
            .iter()
            .position(|c| c.as_ref().is_some_and(&pred))
            .map(|i| i as u16)
    }

    fn push(&mut self, constant: Constant) -> Result<u16, FormatError> {
        let index = self.entries.len();
        if index >= u16::MAX as usize {
            return Err(FormatError::Overflow);
        }
        self.entries.push(Some(constant));
        Ok(index as u16)
    }
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16, FormatError> {
    Ok(reader.read_u16::<BigEndian>()?)
}

fn tagged_u16<W: Write>(writer: &mut W, tag: u8, value: u16) -> std::io::Result<()> {
    writer.write_u8(tag)?;
    writer.write_u16::<BigEndian>(value)
}

fn tagged_u32<W: Write>(writer: &mut W, tag: u8, value: u32) -> std::io::Result<()> {
    writer.write_u8(tag)?;
    writer.write_u32::<BigEndian>(value)
}

fn tagged_pair<W: Write>(writer: &mut W, tag: u8, a: u16, b: u16) -> std::io::Result<()> {
    writer.write_u8(tag)?;
    writer.write_u16::<BigEndian>(a)?;
    writer.write_u16::<BigEndian>(b)
}

pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let unit = if b & 0x80 == 0 {
            if b == 0 {
                return None;
            }
            i += 1;
            b as u16
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1)?;
            i += 2;
            ((b as u16 & 0x1F) << 6) | (b2 as u16 & 0x3F)
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            i += 3;
            ((b as u16 & 0x0F) << 12) | ((b2 as u16 & 0x3F) << 6) | (b3 as u16 & 0x3F)
        } else {
            return None;
        };
        units.push(unit);
    }
    String::from_utf16(&units).ok()
}

pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }
    out
}
