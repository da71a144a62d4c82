//! The constant pool: a per-class-file interned table of literal constants,
//! addressed by 1-based indices.
//!
//! `Long`/`Double` entries occupy two consecutive slots; the second slot is
//! a tombstone that must never be referenced directly. The pool only grows:
//! entries, once written, never move or renumber.

use crate::classfile::io::{ByteReader, ByteWriter, ReadError, ReadResult};
use std::collections::HashMap;

pub type PoolIndex = u16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantPoolEntry {
    Utf8(String),
    Integer(i32),
    Float(u32), // IEEE-754 bits, so the enum can derive Eq/Hash for interning
    Long(i64),
    Double(u64), // IEEE-754 bits
    Class { name_index: PoolIndex },
    String { string_index: PoolIndex },
    FieldRef { class_index: PoolIndex, name_and_type_index: PoolIndex },
    MethodRef { class_index: PoolIndex, name_and_type_index: PoolIndex },
    InterfaceMethodRef { class_index: PoolIndex, name_and_type_index: PoolIndex },
    NameAndType { name_index: PoolIndex, descriptor_index: PoolIndex },
    MethodHandle { reference_kind: u8, reference_index: PoolIndex },
    MethodType { descriptor_index: PoolIndex },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: PoolIndex },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: PoolIndex },
    Module { name_index: PoolIndex },
    Package { name_index: PoolIndex },
    /// The tombstone occupying the slot after a `Long`/`Double` entry.
    Tombstone,
}

impl ConstantPoolEntry {
    pub fn tag(&self) -> u8 {
        use ConstantPoolEntry::*;
        match self {
            Utf8(_) => 1,
            Integer(_) => 3,
            Float(_) => 4,
            Long(_) => 5,
            Double(_) => 6,
            Class { .. } => 7,
            String { .. } => 8,
            FieldRef { .. } => 9,
            MethodRef { .. } => 10,
            InterfaceMethodRef { .. } => 11,
            NameAndType { .. } => 12,
            MethodHandle { .. } => 15,
            MethodType { .. } => 16,
            Dynamic { .. } => 17,
            InvokeDynamic { .. } => 18,
            Module { .. } => 19,
            Package { .. } => 20,
            Tombstone => 0,
        }
    }

    /// Long/Double count as two words in the pool's index space.
    pub fn width(&self) -> u16 {
        match self {
            ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_) => 2,
            _ => 1,
        }
    }
}

/// A class file's constant pool. `entries[0]` is unused padding so indices
/// line up 1:1 with the JVM's 1-based addressing.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolEntry>,
    utf8_interning: HashMap<String, PoolIndex>,
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![ConstantPoolEntry::Tombstone],
            utf8_interning: HashMap::new(),
        }
    }

    /// Build a pool from entries already read off disk (1-based, tombstones
    /// included) without re-running the interning logic — used by the
    /// archive loader, which reads pools whose layout it must preserve.
    pub fn from_raw_entries(entries: Vec<ConstantPoolEntry>) -> Self {
        ConstantPool {
            entries,
            utf8_interning: HashMap::new(),
        }
    }

    pub fn get(&self, index: PoolIndex) -> Option<&ConstantPoolEntry> {
        self.entries.get(index as usize)
    }

    pub fn entries(&self) -> &[ConstantPoolEntry] {
        &self.entries
    }

    /// Count including the unused slot 0 and Long/Double tombstones, i.e.
    /// the `constant_pool_count` field of the binary format.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    fn push(&mut self, entry: ConstantPoolEntry) -> PoolIndex {
        let index = self.entries.len() as PoolIndex;
        let width = entry.width();
        self.entries.push(entry);
        if width == 2 {
            self.entries.push(ConstantPoolEntry::Tombstone);
        }
        index
    }

    pub fn add_utf8(&mut self, value: &str) -> PoolIndex {
        if let Some(&index) = self.utf8_interning.get(value) {
            return index;
        }
        let index = self.push(ConstantPoolEntry::Utf8(value.to_string()));
        self.utf8_interning.insert(value.to_string(), index);
        index
    }

    pub fn add_integer(&mut self, value: i32) -> PoolIndex {
        self.push(ConstantPoolEntry::Integer(value))
    }

    pub fn add_long(&mut self, value: i64) -> PoolIndex {
        self.push(ConstantPoolEntry::Long(value))
    }

    pub fn add_float_bits(&mut self, bits: u32) -> PoolIndex {
        self.push(ConstantPoolEntry::Float(bits))
    }

    pub fn add_double_bits(&mut self, bits: u64) -> PoolIndex {
        self.push(ConstantPoolEntry::Double(bits))
    }

    pub fn add_class(&mut self, internal_name: &str) -> PoolIndex {
        let name_index = self.add_utf8(internal_name);
        self.push(ConstantPoolEntry::Class { name_index })
    }

    pub fn add_string(&mut self, value: &str) -> PoolIndex {
        let string_index = self.add_utf8(value);
        self.push(ConstantPoolEntry::String { string_index })
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> PoolIndex {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.push(ConstantPoolEntry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> PoolIndex {
        let class_index = self.add_class(class);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(ConstantPoolEntry::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> PoolIndex {
        let class_index = self.add_class(class);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(ConstantPoolEntry::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn add_interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> PoolIndex {
        let class_index = self.add_class(class);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(ConstantPoolEntry::InterfaceMethodRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn utf8_at(&self, index: PoolIndex) -> Option<&str> {
        match self.get(index) {
            Some(ConstantPoolEntry::Utf8(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn class_name_at(&self, index: PoolIndex) -> Option<&str> {
        match self.get(index) {
            Some(ConstantPoolEntry::Class { name_index }) => self.utf8_at(*name_index),
            _ => None,
        }
    }

    /// Deep-import the entry at `source_index` of `source` into `self`,
    /// recursively importing anything it references (methodref -> classinfo
    /// -> utf8, etc.), and return its new index here. Used when inlining a
    /// method body cloned from another class file's pool.
    pub fn import_constant(&mut self, source: &ConstantPool, source_index: PoolIndex) -> PoolIndex {
        match source.get(source_index) {
            None | Some(ConstantPoolEntry::Tombstone) => 0,
            Some(ConstantPoolEntry::Utf8(s)) => self.add_utf8(s),
            Some(ConstantPoolEntry::Integer(v)) => self.add_integer(*v),
            Some(ConstantPoolEntry::Long(v)) => self.add_long(*v),
            Some(ConstantPoolEntry::Float(bits)) => self.add_float_bits(*bits),
            Some(ConstantPoolEntry::Double(bits)) => self.add_double_bits(*bits),
            Some(ConstantPoolEntry::Class { name_index }) => {
                let name_index = self.import_constant(source, *name_index);
                self.push(ConstantPoolEntry::Class { name_index })
            }
            Some(ConstantPoolEntry::String { string_index }) => {
                let string_index = self.import_constant(source, *string_index);
                self.push(ConstantPoolEntry::String { string_index })
            }
            Some(ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            }) => {
                let name_index = self.import_constant(source, *name_index);
                let descriptor_index = self.import_constant(source, *descriptor_index);
                self.push(ConstantPoolEntry::NameAndType {
                    name_index,
                    descriptor_index,
                })
            }
            Some(ConstantPoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            }) => {
                let class_index = self.import_constant(source, *class_index);
                let name_and_type_index = self.import_constant(source, *name_and_type_index);
                self.push(ConstantPoolEntry::FieldRef {
                    class_index,
                    name_and_type_index,
                })
            }
            Some(ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            }) => {
                let class_index = self.import_constant(source, *class_index);
                let name_and_type_index = self.import_constant(source, *name_and_type_index);
                self.push(ConstantPoolEntry::MethodRef {
                    class_index,
                    name_and_type_index,
                })
            }
            Some(ConstantPoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }) => {
                let class_index = self.import_constant(source, *class_index);
                let name_and_type_index = self.import_constant(source, *name_and_type_index);
                self.push(ConstantPoolEntry::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                })
            }
            Some(ConstantPoolEntry::MethodHandle {
                reference_kind,
                reference_index,
            }) => {
                let reference_index = self.import_constant(source, *reference_index);
                self.push(ConstantPoolEntry::MethodHandle {
                    reference_kind: *reference_kind,
                    reference_index,
                })
            }
            Some(ConstantPoolEntry::MethodType { descriptor_index }) => {
                let descriptor_index = self.import_constant(source, *descriptor_index);
                self.push(ConstantPoolEntry::MethodType { descriptor_index })
            }
            Some(ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }) => {
                let name_and_type_index = self.import_constant(source, *name_and_type_index);
                self.push(ConstantPoolEntry::Dynamic {
                    bootstrap_method_attr_index: *bootstrap_method_attr_index,
                    name_and_type_index,
                })
            }
            Some(ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }) => {
                let name_and_type_index = self.import_constant(source, *name_and_type_index);
                self.push(ConstantPoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index: *bootstrap_method_attr_index,
                    name_and_type_index,
                })
            }
            Some(ConstantPoolEntry::Module { name_index }) => {
                let name_index = self.import_constant(source, *name_index);
                self.push(ConstantPoolEntry::Module { name_index })
            }
            Some(ConstantPoolEntry::Package { name_index }) => {
                let name_index = self.import_constant(source, *name_index);
                self.push(ConstantPoolEntry::Package { name_index })
            }
        }
    }

    /// Read `constant_pool_count - 1` entries (the count itself is read by
    /// the caller, since it precedes the pool in the class-file layout).
    pub fn read(reader: &mut ByteReader, constant_pool_count: u16) -> ReadResult<ConstantPool> {
        let mut entries = vec![ConstantPoolEntry::Tombstone];
        let mut index = 1u16;
        while index < constant_pool_count {
            let tag = reader.u1()?;
            let entry = match tag {
                1 => {
                    let len = reader.u2()? as usize;
                    let bytes = reader.bytes(len)?;
                    ConstantPoolEntry::Utf8(decode_modified_utf8(bytes))
                }
                3 => ConstantPoolEntry::Integer(reader.i4()?),
                4 => ConstantPoolEntry::Float(reader.u4()?),
                5 => ConstantPoolEntry::Long(reader.u8_value()? as i64),
                6 => ConstantPoolEntry::Double(reader.u8_value()?),
                7 => ConstantPoolEntry::Class {
                    name_index: reader.u2()?,
                },
                8 => ConstantPoolEntry::String {
                    string_index: reader.u2()?,
                },
                9 => ConstantPoolEntry::FieldRef {
                    class_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                10 => ConstantPoolEntry::MethodRef {
                    class_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                11 => ConstantPoolEntry::InterfaceMethodRef {
                    class_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                12 => ConstantPoolEntry::NameAndType {
                    name_index: reader.u2()?,
                    descriptor_index: reader.u2()?,
                },
                15 => ConstantPoolEntry::MethodHandle {
                    reference_kind: reader.u1()?,
                    reference_index: reader.u2()?,
                },
                16 => ConstantPoolEntry::MethodType {
                    descriptor_index: reader.u2()?,
                },
                17 => ConstantPoolEntry::Dynamic {
                    bootstrap_method_attr_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                18 => ConstantPoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                19 => ConstantPoolEntry::Module {
                    name_index: reader.u2()?,
                },
                20 => ConstantPoolEntry::Package {
                    name_index: reader.u2()?,
                },
                other => {
                    return Err(ReadError(format!(
                        "unknown constant pool tag {other} at index {index}"
                    )));
                }
            };
            let width = entry.width();
            entries.push(entry);
            if width == 2 {
                entries.push(ConstantPoolEntry::Tombstone);
            }
            index += width;
        }
        Ok(ConstantPool {
            entries,
            utf8_interning: HashMap::new(),
        })
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.u2(self.count());
        let mut i = 1usize;
        while i < self.entries.len() {
            match &self.entries[i] {
                ConstantPoolEntry::Tombstone => {
                    i += 1;
                    continue;
                }
                entry => {
                    writer.u1(entry.tag());
                    write_entry_body(writer, entry);
                }
            }
            i += 1;
        }
    }
}

fn write_entry_body(writer: &mut ByteWriter, entry: &ConstantPoolEntry) {
    match entry {
        ConstantPoolEntry::Utf8(s) => {
            let bytes = encode_modified_utf8(s);
            writer.u2(bytes.len() as u16);
            writer.bytes(&bytes);
        }
        ConstantPoolEntry::Integer(v) => writer.i4(*v),
        ConstantPoolEntry::Float(bits) => writer.u4(*bits),
        ConstantPoolEntry::Long(v) => writer.u8_value(*v as u64),
        ConstantPoolEntry::Double(bits) => writer.u8_value(*bits),
        ConstantPoolEntry::Class { name_index } => writer.u2(*name_index),
        ConstantPoolEntry::String { string_index } => writer.u2(*string_index),
        ConstantPoolEntry::FieldRef {
            class_index,
            name_and_type_index,
        }
        | ConstantPoolEntry::MethodRef {
            class_index,
            name_and_type_index,
        }
        | ConstantPoolEntry::InterfaceMethodRef {
            class_index,
            name_and_type_index,
        } => {
            writer.u2(*class_index);
            writer.u2(*name_and_type_index);
        }
        ConstantPoolEntry::NameAndType {
            name_index,
            descriptor_index,
        } => {
            writer.u2(*name_index);
            writer.u2(*descriptor_index);
        }
        ConstantPoolEntry::MethodHandle {
            reference_kind,
            reference_index,
        } => {
            writer.u1(*reference_kind);
            writer.u2(*reference_index);
        }
        ConstantPoolEntry::MethodType { descriptor_index } => writer.u2(*descriptor_index),
        ConstantPoolEntry::Dynamic {
            bootstrap_method_attr_index,
            name_and_type_index,
        }
        | ConstantPoolEntry::InvokeDynamic {
            bootstrap_method_attr_index,
            name_and_type_index,
        } => {
            writer.u2(*bootstrap_method_attr_index);
            writer.u2(*name_and_type_index);
        }
        ConstantPoolEntry::Module { name_index } | ConstantPoolEntry::Package { name_index } => {
            writer.u2(*name_index)
        }
        ConstantPoolEntry::Tombstone => {}
    }
}

/// The subset of modified UTF-8 this compiler ever needs to decode: ASCII
/// and the 2-byte encoding CESU-8 uses for code points up to U+07FF covers
/// everything `java.base` class names and descriptors contain. Anything
/// above that range round-trips as the JVM's 3-byte form as well.
fn decode_modified_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn encode_modified_utf8(s: &str) -> Vec<u8> {
    // The strings produced by this compiler (class/method/field names and
    // descriptors) are always within plain ASCII/UTF-8 range, where
    // modified UTF-8 and standard UTF-8 agree byte-for-byte.
    s.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_is_interned() {
        let mut pool = ConstantPool::new();
        let a = pool.add_utf8("hello");
        let b = pool.add_utf8("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn long_occupies_two_slots_with_tombstone() {
        let mut pool = ConstantPool::new();
        let index = pool.add_long(42);
        assert!(matches!(pool.get(index), Some(ConstantPoolEntry::Long(42))));
        assert!(matches!(
            pool.get(index + 1),
            Some(ConstantPoolEntry::Tombstone)
        ));
    }

    #[test]
    fn import_constant_deep_copies_methodref_chain() {
        let mut source = ConstantPool::new();
        let method_ref = source.add_method_ref("pkg/Owner", "target", "(I)V");

        let mut dest = ConstantPool::new();
        let imported = dest.import_constant(&source, method_ref);
        match dest.get(imported) {
            Some(ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            }) => {
                assert_eq!(dest.class_name_at(*class_index), Some("pkg/Owner"));
                match dest.get(*name_and_type_index) {
                    Some(ConstantPoolEntry::NameAndType {
                        name_index,
                        descriptor_index,
                    }) => {
                        assert_eq!(dest.utf8_at(*name_index), Some("target"));
                        assert_eq!(dest.utf8_at(*descriptor_index), Some("(I)V"));
                    }
                    other => panic!("expected NameAndType, got {other:?}"),
                }
            }
            other => panic!("expected MethodRef, got {other:?}"),
        }
    }
}
