//! In-memory model of a JVM class file and its binary codec.
//!
//! The layout mirrors `ClassFile` in the JVM specification directly:
//! magic/version header, constant pool, access flags, this/super class,
//! interfaces, fields, methods, attributes. [`ClassFile::read`] is used by
//! the archive loader to bring `java.base` classes into the type table;
//! [`ClassFile::write`] is used once per compiled source file.

pub mod attributes;
pub mod constant_pool;
pub mod io;
pub mod opcodes;

use attributes::Attribute;
use constant_pool::{ConstantPool, PoolIndex};
use io::{ByteReader, ByteWriter, ReadError, ReadResult};

pub const MAGIC: u32 = 0xCAFEBABE;

/// Bytecode output is pinned to Java 17's major version (61), the
/// lowest LTS release with full support for everything this compiler emits.
pub const DEFAULT_MAJOR_VERSION: u16 = 61;
pub const DEFAULT_MINOR_VERSION: u16 = 0;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemberAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: MemberAccessFlags,
    pub name_index: PoolIndex,
    pub descriptor_index: PoolIndex,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: MemberAccessFlags,
    pub name_index: PoolIndex,
    pub descriptor_index: PoolIndex,
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> &'a str {
        pool.utf8_at(self.name_index).unwrap_or("")
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> &'a str {
        pool.utf8_at(self.descriptor_index).unwrap_or("")
    }

    pub fn code(&self) -> Option<&attributes::CodeAttribute> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn is_inline_only(&self, pool: &ConstantPool) -> bool {
        attributes::has_inline_only_annotation(&self.attributes, pool)
    }
}

/// The full binary representation of a `.class` file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: PoolIndex,
    pub super_class: PoolIndex,
    pub interfaces: Vec<PoolIndex>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// A fresh, otherwise-empty class file ready for the code generator to
    /// populate. `this_internal_name` uses `/`-separated internal form,
    /// e.g. `"HelloKt"`.
    pub fn new(this_internal_name: &str, super_internal_name: &str) -> ClassFile {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.add_class(this_internal_name);
        let super_class = constant_pool.add_class(super_internal_name);
        ClassFile {
            minor_version: DEFAULT_MINOR_VERSION,
            major_version: DEFAULT_MAJOR_VERSION,
            constant_pool,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn this_name(&self) -> &str {
        self.constant_pool.class_name_at(self.this_class).unwrap_or("")
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name(&self.constant_pool) == name && m.descriptor(&self.constant_pool) == descriptor)
    }

    pub fn read(bytes: &[u8]) -> ReadResult<ClassFile> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.u4()?;
        if magic != MAGIC {
            return Err(ReadError(format!(
                "bad magic: expected {MAGIC:#010x}, got {magic:#010x}"
            )));
        }
        let minor_version = reader.u2()?;
        let major_version = reader.u2()?;
        let constant_pool_count = reader.u2()?;
        let constant_pool = ConstantPool::read(&mut reader, constant_pool_count)?;
        let access_flags = ClassAccessFlags::from_bits_truncate(reader.u2()?);
        let this_class = reader.u2()?;
        let super_class = reader.u2()?;
        let interfaces_count = reader.u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(reader.u2()?);
        }
        let fields_count = reader.u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            fields.push(read_field(&mut reader, &constant_pool)?);
        }
        let methods_count = reader.u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            methods.push(read_method(&mut reader, &constant_pool)?);
        }
        let attributes_count = reader.u2()? as usize;
        let mut attributes = Vec::with_capacity(attributes_count);
        for _ in 0..attributes_count {
            attributes.push(Attribute::read(&mut reader, &constant_pool)?);
        }
        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn write(&self) -> Vec<u8> {
        let mut pool = self.constant_pool.clone();
        let mut body = ByteWriter::new();
        body.u2(self.access_flags.bits());
        body.u2(self.this_class);
        body.u2(self.super_class);
        body.u2(self.interfaces.len() as u16);
        for iface in &self.interfaces {
            body.u2(*iface);
        }
        body.u2(self.fields.len() as u16);
        for field in &self.fields {
            write_field(&mut body, field, &mut pool);
        }
        body.u2(self.methods.len() as u16);
        for method in &self.methods {
            write_method(&mut body, method, &mut pool);
        }
        body.u2(self.attributes.len() as u16);
        for attribute in &self.attributes {
            attribute.write_with_pool(&mut body, &mut pool);
        }

        let mut out = ByteWriter::new();
        out.u4(MAGIC);
        out.u2(self.minor_version);
        out.u2(self.major_version);
        pool.write(&mut out);
        out.bytes(&body.into_bytes());
        out.into_bytes()
    }
}

fn read_field(reader: &mut ByteReader, pool: &ConstantPool) -> ReadResult<FieldInfo> {
    let access_flags = MemberAccessFlags::from_bits_truncate(reader.u2()?);
    let name_index = reader.u2()?;
    let descriptor_index = reader.u2()?;
    let attribute_count = reader.u2()? as usize;
    let mut attributes = Vec::with_capacity(attribute_count);
    for _ in 0..attribute_count {
        attributes.push(Attribute::read(reader, pool)?);
    }
    Ok(FieldInfo {
        access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn write_field(writer: &mut ByteWriter, field: &FieldInfo, pool: &mut ConstantPool) {
    writer.u2(field.access_flags.bits());
    writer.u2(field.name_index);
    writer.u2(field.descriptor_index);
    writer.u2(field.attributes.len() as u16);
    for attribute in &field.attributes {
        attribute.write_with_pool(writer, pool);
    }
}

fn read_method(reader: &mut ByteReader, pool: &ConstantPool) -> ReadResult<MethodInfo> {
    let access_flags = MemberAccessFlags::from_bits_truncate(reader.u2()?);
    let name_index = reader.u2()?;
    let descriptor_index = reader.u2()?;
    let attribute_count = reader.u2()? as usize;
    let mut attributes = Vec::with_capacity(attribute_count);
    for _ in 0..attribute_count {
        attributes.push(Attribute::read(reader, pool)?);
    }
    Ok(MethodInfo {
        access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn write_method(writer: &mut ByteWriter, method: &MethodInfo, pool: &mut ConstantPool) {
    writer.u2(method.access_flags.bits());
    writer.u2(method.name_index);
    writer.u2(method.descriptor_index);
    writer.u2(method.attributes.len() as u16);
    for attribute in &method.attributes {
        attribute.write_with_pool(writer, pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_class_file_round_trips_through_bytes() {
        let mut class = ClassFile::new("HelloKt", "java/lang/Object");
        let name_index = class.constant_pool.add_utf8("main");
        let descriptor_index = class.constant_pool.add_utf8("([Ljava/lang/String;)V");
        class.methods.push(MethodInfo {
            access_flags: MemberAccessFlags::PUBLIC | MemberAccessFlags::STATIC,
            name_index,
            descriptor_index,
            attributes: vec![Attribute::Code(attributes::CodeAttribute {
                max_stack: 0,
                max_locals: 1,
                code: vec![opcodes::RETURN],
                exception_table: vec![],
                attributes: vec![],
            })],
        });

        let bytes = class.write();
        assert_eq!(&bytes[0..4], &MAGIC.to_be_bytes());

        let read_back = ClassFile::read(&bytes).unwrap();
        assert_eq!(read_back.this_name(), "HelloKt");
        assert_eq!(read_back.methods.len(), 1);
        assert_eq!(read_back.methods[0].name(&read_back.constant_pool), "main");
        let code = read_back.methods[0].code().unwrap();
        assert_eq!(code.code, vec![opcodes::RETURN]);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 16];
        assert!(ClassFile::read(&bytes).is_err());
    }
}
