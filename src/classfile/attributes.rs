//! Class-file attributes.
//!
//! The reader understands `SourceFile`, `Code`, `StackMapTable`,
//! `LineNumberTable`, `Exceptions`, `InnerClasses`, and
//! `RuntimeInvisibleAnnotations` (needed to detect `InlineOnly`); every
//! other attribute — including `Deprecated`/`RuntimeVisibleAnnotations`,
//! which real `java.base` classes carry — is kept as an opaque blob and
//! re-emitted verbatim rather than dropped. The writer only ever produces
//! `SourceFile`, `Code` (with a nested `StackMapTable`), and
//! `LineNumberTable`.

use crate::classfile::constant_pool::{ConstantPool, PoolIndex};
use crate::classfile::io::{ByteReader, ByteWriter, ReadResult};

#[derive(Debug, Clone)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// One verification-info entry for a local or an operand-stack slot.
/// `Long`/`Double` count as two words on the abstract
/// stack/locals, but as a *single* `VerificationInfo` entry here — width is
/// tracked separately by the code generator's frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationInfo {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    Object { class_index: PoolIndex },
    Uninitialized { offset: u16 },
}

impl VerificationInfo {
    fn tag(&self) -> u8 {
        match self {
            VerificationInfo::Top => 0,
            VerificationInfo::Integer => 1,
            VerificationInfo::Float => 2,
            VerificationInfo::Double => 3,
            VerificationInfo::Long => 4,
            VerificationInfo::Null => 5,
            VerificationInfo::Object { .. } => 7,
            VerificationInfo::Uninitialized { .. } => 8,
        }
    }

    fn read(reader: &mut ByteReader) -> ReadResult<Self> {
        Ok(match reader.u1()? {
            0 => VerificationInfo::Top,
            1 => VerificationInfo::Integer,
            2 => VerificationInfo::Float,
            3 => VerificationInfo::Double,
            4 => VerificationInfo::Long,
            5 => VerificationInfo::Null,
            7 => VerificationInfo::Object {
                class_index: reader.u2()?,
            },
            8 => VerificationInfo::Uninitialized {
                offset: reader.u2()?,
            },
            other => {
                return Err(crate::classfile::io::ReadError(format!(
                    "unknown verification_type_info tag {other}"
                )));
            }
        })
    }

    fn write(&self, writer: &mut ByteWriter) {
        writer.u1(self.tag());
        match self {
            VerificationInfo::Object { class_index } => writer.u2(*class_index),
            VerificationInfo::Uninitialized { offset } => writer.u2(*offset),
            _ => {}
        }
    }
}

/// A resolved stack-map frame, already chosen into one of the encoding
/// families.
#[derive(Debug, Clone)]
pub enum StackMapFrameEntry {
    Same { offset_delta: u16 },
    SameLocals1StackItem { offset_delta: u16, stack: VerificationInfo },
    Chop { offset_delta: u16, chop_count: u8 },
    SameExtended { offset_delta: u16 },
    Append { offset_delta: u16, locals: Vec<VerificationInfo> },
    Full {
        offset_delta: u16,
        locals: Vec<VerificationInfo>,
        stack: Vec<VerificationInfo>,
    },
}

impl StackMapFrameEntry {
    fn write(&self, writer: &mut ByteWriter) {
        match self {
            StackMapFrameEntry::Same { offset_delta } => {
                writer.u1(*offset_delta as u8); // caller guarantees < 64
            }
            StackMapFrameEntry::SameLocals1StackItem { offset_delta, stack } => {
                writer.u1(64 + *offset_delta as u8);
                stack.write(writer);
            }
            StackMapFrameEntry::Chop {
                offset_delta,
                chop_count,
            } => {
                writer.u1(251 - chop_count);
                writer.u2(*offset_delta);
            }
            StackMapFrameEntry::SameExtended { offset_delta } => {
                writer.u1(251);
                writer.u2(*offset_delta);
            }
            StackMapFrameEntry::Append {
                offset_delta,
                locals,
            } => {
                writer.u1(251 + locals.len() as u8);
                writer.u2(*offset_delta);
                for local in locals {
                    local.write(writer);
                }
            }
            StackMapFrameEntry::Full {
                offset_delta,
                locals,
                stack,
            } => {
                writer.u1(255);
                writer.u2(*offset_delta);
                writer.u2(locals.len() as u16);
                for local in locals {
                    local.write(writer);
                }
                writer.u2(stack.len() as u16);
                for item in stack {
                    item.write(writer);
                }
            }
        }
    }

    fn read(reader: &mut ByteReader) -> ReadResult<Self> {
        let tag = reader.u1()?;
        Ok(match tag {
            0..=63 => StackMapFrameEntry::Same {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrameEntry::SameLocals1StackItem {
                offset_delta: (tag - 64) as u16,
                stack: VerificationInfo::read(reader)?,
            },
            248..=250 => StackMapFrameEntry::Chop {
                offset_delta: reader.u2()?,
                chop_count: 251 - tag,
            },
            251 => StackMapFrameEntry::SameExtended {
                offset_delta: reader.u2()?,
            },
            252..=254 => {
                let offset_delta = reader.u2()?;
                let count = (tag - 251) as usize;
                let mut locals = Vec::with_capacity(count);
                for _ in 0..count {
                    locals.push(VerificationInfo::read(reader)?);
                }
                StackMapFrameEntry::Append {
                    offset_delta,
                    locals,
                }
            }
            255 => {
                let offset_delta = reader.u2()?;
                let locals_count = reader.u2()? as usize;
                let mut locals = Vec::with_capacity(locals_count);
                for _ in 0..locals_count {
                    locals.push(VerificationInfo::read(reader)?);
                }
                let stack_count = reader.u2()? as usize;
                let mut stack = Vec::with_capacity(stack_count);
                for _ in 0..stack_count {
                    stack.push(VerificationInfo::read(reader)?);
                }
                StackMapFrameEntry::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            other => {
                return Err(crate::classfile::io::ReadError(format!(
                    "reserved stack map frame tag {other}"
                )));
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<Attribute>,
}

/// A parsed attribute. `Unknown` preserves anything the reader doesn't
/// interpret structurally — skipped by length on read, re-emitted
/// byte-for-byte on write.
#[derive(Debug, Clone)]
pub enum Attribute {
    SourceFile { sourcefile_index: PoolIndex },
    Code(CodeAttribute),
    StackMapTable(Vec<StackMapFrameEntry>),
    LineNumberTable(Vec<LineNumberEntry>),
    Exceptions { exception_index_table: Vec<PoolIndex> },
    InnerClasses,
    RuntimeInvisibleAnnotations { raw: Vec<u8> },
    Unknown { name_index: PoolIndex, data: Vec<u8> },
}

impl Attribute {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> &'a str {
        let idx = match self {
            Attribute::SourceFile { .. } => return "SourceFile",
            Attribute::Code(_) => return "Code",
            Attribute::StackMapTable(_) => return "StackMapTable",
            Attribute::LineNumberTable(_) => return "LineNumberTable",
            Attribute::Exceptions { .. } => return "Exceptions",
            Attribute::InnerClasses => return "InnerClasses",
            Attribute::RuntimeInvisibleAnnotations { .. } => {
                return "RuntimeInvisibleAnnotations";
            }
            Attribute::Unknown { name_index, .. } => *name_index,
        };
        pool.utf8_at(idx).unwrap_or("")
    }

    pub fn read(reader: &mut ByteReader, pool: &ConstantPool) -> ReadResult<Attribute> {
        let name_index = reader.u2()?;
        let length = reader.u4()? as usize;
        let name = pool.utf8_at(name_index).unwrap_or("");
        let body = reader.bytes(length)?;
        let mut body_reader = ByteReader::new(body);
        Ok(match name {
            "SourceFile" => Attribute::SourceFile {
                sourcefile_index: body_reader.u2()?,
            },
            "Code" => Attribute::Code(read_code_attribute(&mut body_reader, pool)?),
            "StackMapTable" => {
                let count = body_reader.u2()? as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    entries.push(StackMapFrameEntry::read(&mut body_reader)?);
                }
                Attribute::StackMapTable(entries)
            }
            "LineNumberTable" => {
                let count = body_reader.u2()? as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    entries.push(LineNumberEntry {
                        start_pc: body_reader.u2()?,
                        line_number: body_reader.u2()?,
                    });
                }
                Attribute::LineNumberTable(entries)
            }
            "Exceptions" => {
                let count = body_reader.u2()? as usize;
                let mut table = Vec::with_capacity(count);
                for _ in 0..count {
                    table.push(body_reader.u2()?);
                }
                Attribute::Exceptions {
                    exception_index_table: table,
                }
            }
            "InnerClasses" => Attribute::InnerClasses,
            "RuntimeInvisibleAnnotations" => Attribute::RuntimeInvisibleAnnotations {
                raw: body.to_vec(),
            },
            _ => Attribute::Unknown {
                name_index,
                data: body.to_vec(),
            },
        })
    }

    pub fn write(&self, writer: &mut ByteWriter, pool: &mut ConstantPool) {
        let name_index = pool.add_utf8(self.static_name().unwrap_or_else(|| {
            panic!("Unknown attributes must carry their own name_index");
        }));
        let mut body = ByteWriter::new();
        match self {
            Attribute::SourceFile { sourcefile_index } => body.u2(*sourcefile_index),
            Attribute::Code(code) => write_code_attribute(&mut body, code, pool),
            Attribute::StackMapTable(entries) => {
                body.u2(entries.len() as u16);
                for entry in entries {
                    entry.write(&mut body);
                }
            }
            Attribute::LineNumberTable(entries) => {
                body.u2(entries.len() as u16);
                for entry in entries {
                    body.u2(entry.start_pc);
                    body.u2(entry.line_number);
                }
            }
            Attribute::Exceptions {
                exception_index_table,
            } => {
                body.u2(exception_index_table.len() as u16);
                for idx in exception_index_table {
                    body.u2(*idx);
                }
            }
            Attribute::InnerClasses => body.u2(0),
            Attribute::RuntimeInvisibleAnnotations { raw } => body.bytes(raw),
            Attribute::Unknown { data, .. } => body.bytes(data),
        }
        let body = body.into_bytes();
        writer.u2(name_index);
        writer.u4(body.len() as u32);
        writer.bytes(&body);
    }

    fn static_name(&self) -> Option<&'static str> {
        Some(match self {
            Attribute::SourceFile { .. } => "SourceFile",
            Attribute::Code(_) => "Code",
            Attribute::StackMapTable(_) => "StackMapTable",
            Attribute::LineNumberTable(_) => "LineNumberTable",
            Attribute::Exceptions { .. } => "Exceptions",
            Attribute::InnerClasses => "InnerClasses",
            Attribute::RuntimeInvisibleAnnotations { .. } => "RuntimeInvisibleAnnotations",
            Attribute::Unknown { .. } => return None,
        })
    }
}

/// For `Unknown` attributes, `write` needs the original `name_index`
/// instead of interning a static name — handled by this wrapper so
/// `Attribute::write`'s `pool.add_utf8` path above isn't hit for them.
impl Attribute {
    pub fn write_with_pool(&self, writer: &mut ByteWriter, pool: &mut ConstantPool) {
        if let Attribute::Unknown { name_index, data } = self {
            writer.u2(*name_index);
            writer.u4(data.len() as u32);
            writer.bytes(data);
        } else {
            self.write(writer, pool);
        }
    }
}

fn read_code_attribute(reader: &mut ByteReader, pool: &ConstantPool) -> ReadResult<CodeAttribute> {
    let max_stack = reader.u2()?;
    let max_locals = reader.u2()?;
    let code_length = reader.u4()? as usize;
    let code = reader.bytes(code_length)?.to_vec();
    let exception_count = reader.u2()? as usize;
    let mut exception_table = Vec::with_capacity(exception_count);
    for _ in 0..exception_count {
        exception_table.push(ExceptionTableEntry {
            start_pc: reader.u2()?,
            end_pc: reader.u2()?,
            handler_pc: reader.u2()?,
            catch_type: reader.u2()?,
        });
    }
    let attribute_count = reader.u2()? as usize;
    let mut attributes = Vec::with_capacity(attribute_count);
    for _ in 0..attribute_count {
        attributes.push(Attribute::read(reader, pool)?);
    }
    Ok(CodeAttribute {
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes,
    })
}

fn write_code_attribute(writer: &mut ByteWriter, code: &CodeAttribute, pool: &mut ConstantPool) {
    writer.u2(code.max_stack);
    writer.u2(code.max_locals);
    writer.u4(code.code.len() as u32);
    writer.bytes(&code.code);
    writer.u2(code.exception_table.len() as u16);
    for entry in &code.exception_table {
        writer.u2(entry.start_pc);
        writer.u2(entry.end_pc);
        writer.u2(entry.handler_pc);
        writer.u2(entry.catch_type);
    }
    writer.u2(code.attributes.len() as u16);
    for attribute in &code.attributes {
        attribute.write_with_pool(writer, pool);
    }
}

/// The `InlineOnly` sentinel descriptor recognized in
/// `RuntimeInvisibleAnnotations`. The standard library
/// ships it as `kotlin.internal.InlineOnly`.
pub const INLINE_ONLY_DESCRIPTOR: &str = "Lkotlin/internal/InlineOnly;";

/// Scan a method's `RuntimeInvisibleAnnotations` attribute (if present) for
/// the `InlineOnly` sentinel.
pub fn has_inline_only_annotation(attributes: &[Attribute], pool: &ConstantPool) -> bool {
    for attribute in attributes {
        if let Attribute::RuntimeInvisibleAnnotations { raw } = attribute {
            let mut reader = ByteReader::new(raw);
            if scan_annotations_for_inline_only(&mut reader, pool).unwrap_or(false) {
                return true;
            }
        }
    }
    false
}

fn scan_annotations_for_inline_only(reader: &mut ByteReader, pool: &ConstantPool) -> ReadResult<bool> {
    let num_annotations = reader.u2()?;
    let mut found = false;
    for _ in 0..num_annotations {
        let type_index = reader.u2()?;
        let is_inline_only = pool.utf8_at(type_index) == Some(INLINE_ONLY_DESCRIPTOR);
        let num_pairs = reader.u2()?;
        for _ in 0..num_pairs {
            reader.u2()?; // element_name_index
            skip_annotation_element_value(reader)?;
        }
        found |= is_inline_only;
    }
    Ok(found)
}

fn skip_annotation_element_value(reader: &mut ByteReader) -> ReadResult<()> {
    let tag = reader.u1()?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            reader.u2()?;
        }
        b'e' => {
            reader.u2()?;
            reader.u2()?;
        }
        b'@' => {
            reader.u2()?; // type_index
            let num_pairs = reader.u2()?;
            for _ in 0..num_pairs {
                reader.u2()?;
                skip_annotation_element_value(reader)?;
            }
        }
        b'[' => {
            let count = reader.u2()?;
            for _ in 0..count {
                skip_annotation_element_value(reader)?;
            }
        }
        other => {
            return Err(crate::classfile::io::ReadError(format!(
                "unknown annotation element tag {other}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_map_frame_encoding_round_trips() {
        let mut writer = ByteWriter::new();
        let frame = StackMapFrameEntry::Same { offset_delta: 10 };
        frame.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        match StackMapFrameEntry::read(&mut reader).unwrap() {
            StackMapFrameEntry::Same { offset_delta } => assert_eq!(offset_delta, 10),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn full_frame_round_trips_locals_and_stack() {
        let mut writer = ByteWriter::new();
        let frame = StackMapFrameEntry::Full {
            offset_delta: 5,
            locals: vec![VerificationInfo::Integer, VerificationInfo::Long],
            stack: vec![VerificationInfo::Object { class_index: 7 }],
        };
        frame.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        match StackMapFrameEntry::read(&mut reader).unwrap() {
            StackMapFrameEntry::Full {
                offset_delta,
                locals,
                stack,
            } => {
                assert_eq!(offset_delta, 5);
                assert_eq!(locals.len(), 2);
                assert_eq!(stack, vec![VerificationInfo::Object { class_index: 7 }]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
