//! Structural class descriptor extraction.
//!
//! Only the parts of a class file needed for binary-compatibility comparison
//! are decoded: header, access flags, super class, public members, the
//! `Exceptions` attribute of methods and the nesting attributes of the class.

use bitflags::bitflags;
use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use crate::constant_pool::{CLASS_MAGIC, ConstantPool, FormatError};

bitflags! {
    /// Access flags shared by classes, fields and methods.
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    /// Public or protected, i.e. part of the exported API.
    pub fn is_api_visible(self) -> bool {
        self.intersects(AccessFlags::PUBLIC | AccessFlags::PROTECTED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FieldSignature {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MethodSignature {
    pub access: u16,
    pub name: String,
    /// Parameter part of the descriptor, return type removed.
    pub parameters: String,
    pub exceptions: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    /// Internal binary name, e.g. `p/Outer$Inner`.
    pub name: String,
    pub access: AccessFlags,
    pub is_public: bool,
    pub is_nested: bool,
    pub outer_class_name: Option<String>,
    pub major_version: u16,
    pub minor_version: u16,
    pub super_name: Option<String>,
    pub fields: BTreeSet<FieldSignature>,
    pub methods: BTreeSet<MethodSignature>,
}

impl ClassDescriptor {
    /// Same public API: access flags, super class and public member sets.
    /// The class name and generic signatures are not compared.
    pub fn is_same_api(&self, other: &ClassDescriptor) -> bool {
        self.access == other.access
            && self.super_name == other.super_name
            && self.fields == other.fields
            && self.methods == other.methods
    }
}

pub fn has_class_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == CLASS_MAGIC
}

/// Extracts the structural descriptor of a class file. Buffers that are
/// shorter than four bytes or lack the class magic are not classes and yield
/// `Ok(None)`; a class file that is cut short or otherwise malformed is an
/// error.
pub fn extract(bytes: &[u8]) -> Result<Option<ClassDescriptor>, FormatError> {
    if !has_class_magic(bytes) {
        return Ok(None);
    }
    parse(bytes).map(Some)
}

fn parse(bytes: &[u8]) -> Result<ClassDescriptor, FormatError> {
    let mut r = Cursor::new(bytes);
    r.set_position(4);
    let minor_version = r.read_u16::<BigEndian>()?;
    let major_version = r.read_u16::<BigEndian>()?;
    let pool = ConstantPool::read(&mut r)?;

    let access = AccessFlags::from_bits_truncate(r.read_u16::<BigEndian>()?);
    let name = pool.class_name(r.read_u16::<BigEndian>()?)?;
    let super_name = pool.opt_class_name(r.read_u16::<BigEndian>()?)?;
    let interfaces = r.read_u16::<BigEndian>()?;
    for _ in 0..interfaces {
        r.read_u16::<BigEndian>()?;
    }

    let mut fields = BTreeSet::new();
    for _ in 0..r.read_u16::<BigEndian>()? {
        let field_access = r.read_u16::<BigEndian>()?;
        let field_name = pool.utf8(r.read_u16::<BigEndian>()?)?;
        let descriptor = pool.utf8(r.read_u16::<BigEndian>()?)?;
        skip_attributes(&mut r)?;
        if AccessFlags::from_bits_truncate(field_access).is_api_visible() {
            fields.insert(FieldSignature {
                access: field_access,
                name: field_name,
                descriptor,
            });
        }
    }

    let mut methods = BTreeSet::new();
    for _ in 0..r.read_u16::<BigEndian>()? {
        let method_access = r.read_u16::<BigEndian>()?;
        let method_name = pool.utf8(r.read_u16::<BigEndian>()?)?;
        let descriptor = pool.utf8(r.read_u16::<BigEndian>()?)?;
        let mut exceptions = BTreeSet::new();
        for _ in 0..r.read_u16::<BigEndian>()? {
            let (attr_name, data) = read_attribute(&mut r, &pool)?;
            if attr_name == "Exceptions" {
                let mut a = Cursor::new(data.as_slice());
                for _ in 0..a.read_u16::<BigEndian>()? {
                    exceptions.insert(pool.class_name(a.read_u16::<BigEndian>()?)?);
                }
            }
        }
        if AccessFlags::from_bits_truncate(method_access).is_api_visible() {
            methods.insert(MethodSignature {
                access: method_access,
                name: method_name,
                parameters: strip_return_type(&descriptor).to_string(),
                exceptions,
            });
        }
    }

    let maybe_nested = name.contains('$');
    let mut is_nested = false;
    let mut is_public = access.is_api_visible();
    let mut outer_class_name = None;

    let mut enclosing_owner = None;
    let mut inner_classes = Vec::new();
    for _ in 0..r.read_u16::<BigEndian>()? {
        let (attr_name, data) = read_attribute(&mut r, &pool)?;
        let mut a = Cursor::new(data.as_slice());
        match attr_name.as_str() {
            "EnclosingMethod" => {
                enclosing_owner = Some(pool.class_name(a.read_u16::<BigEndian>()?)?);
            }
            "InnerClasses" => {
                for _ in 0..a.read_u16::<BigEndian>()? {
                    let inner = a.read_u16::<BigEndian>()?;
                    let outer = a.read_u16::<BigEndian>()?;
                    let _simple_name = a.read_u16::<BigEndian>()?;
                    let inner_access = a.read_u16::<BigEndian>()?;
                    inner_classes.push((inner, outer, inner_access));
                }
            }
            _ => {}
        }
    }

    if maybe_nested {
        if let Some(owner) = enclosing_owner {
            is_nested = true;
            outer_class_name = Some(owner);
        }
        for (inner, outer, inner_access) in inner_classes {
            if pool.class_name(inner)? != name {
                continue;
            }
            is_nested = true;
            if outer_class_name.is_none() {
                outer_class_name = pool.opt_class_name(outer)?;
            }
            is_public = AccessFlags::from_bits_truncate(inner_access).is_api_visible();
        }
    }

    Ok(ClassDescriptor {
        name,
        access,
        is_public,
        is_nested,
        outer_class_name,
        major_version,
        minor_version,
        super_name,
        fields,
        methods,
    })
}

fn read_attribute(
    r: &mut Cursor<&[u8]>,
    pool: &ConstantPool,
) -> Result<(String, Vec<u8>), FormatError> {
    let name = pool.utf8(r.read_u16::<BigEndian>()?)?;
    let len = r.read_u32::<BigEndian>()? as usize;
    let remaining = r.get_ref().len().saturating_sub(r.position() as usize);
    if len > remaining {
        return Err(FormatError::Truncated);
    }
    let mut data = vec![0u8; len];
    r.read_exact(&mut data)?;
    Ok((name, data))
}

fn skip_attributes(r: &mut Cursor<&[u8]>) -> Result<(), FormatError> {
    for _ in 0..r.read_u16::<BigEndian>()? {
        r.read_u16::<BigEndian>()?;
        let len = r.read_u32::<BigEndian>()? as u64;
        let end = r.position() + len;
        if end > r.get_ref().len() as u64 {
            return Err(FormatError::Truncated);
        }
        r.set_position(end);
    }
    Ok(())
}

fn strip_return_type(descriptor: &str) -> &str {
    match descriptor.rfind(')') {
        Some(i) => &descriptor[..=i],
        None => descriptor,
    }
}
