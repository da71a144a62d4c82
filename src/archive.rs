//! On-demand class-path resolution: directories, `.jar`, and `.jmod`.
//!
//! Classes are loaded lazily, the first time the resolver asks for an fqn
//! it doesn't already have a [`crate::types::TypeId`] for. `.jar` files use
//! the `zip` crate for both the Stored and Deflate methods `java.base.jmod`
//! and ordinary library jars are built with — hand-rolling DEFLATE would
//! just be a worse version of what the crate already does. A `.jmod` is a
//! zip archive too, prefixed with a 4-byte `JM\x01\x00` magic that isn't
//! part of the zip format; entries live under `classes/` instead of at the
//! archive root.

use crate::classfile::{ClassFile, MemberAccessFlags, MethodInfo};
use crate::config::ClassPathEntry;
use crate::types::{InlineBody, MethodFlags, MethodSignature, TypeId, TypeTable};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

const JMOD_MAGIC: &[u8; 4] = b"JM\x01\x00";

/// Read the raw bytes of `fqn.class` (internal form, `/`-separated) from a
/// single class-path entry, or `None` if this entry doesn't contain it.
fn read_from_entry(entry: &ClassPathEntry, fqn: &str) -> Result<Option<Vec<u8>>, String> {
    match entry {
        ClassPathEntry::Directory(dir) => {
            let path = dir.join(format!("{fqn}.class"));
            if !path.is_file() {
                return Ok(None);
            }
            fs::read(&path)
                .map(Some)
                .map_err(|e| format!("{}: {e}", path.display()))
        }
        ClassPathEntry::Jar(path) => read_zip_entry(path, &format!("{fqn}.class"), 0),
        ClassPathEntry::Jmod(path) => {
            read_zip_entry(path, &format!("classes/{fqn}.class"), JMOD_MAGIC.len())
        }
    }
}

fn read_zip_entry(archive_path: &Path, entry_name: &str, skip_bytes: usize) -> Result<Option<Vec<u8>>, String> {
    let file = fs::File::open(archive_path).map_err(|e| format!("{}: {e}", archive_path.display()))?;
    let mut file = file;
    if skip_bytes > 0 {
        let mut magic = vec![0u8; skip_bytes];
        file.read_exact(&mut magic)
            .map_err(|e| format!("{}: {e}", archive_path.display()))?;
        if magic != JMOD_MAGIC {
            return Err(format!(
                "{}: missing jmod magic header",
                archive_path.display()
            ));
        }
    }
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| format!("{}: {e}", archive_path.display()))?;
    match archive.by_name(entry_name) {
        Ok(mut zip_file) => {
            let mut bytes = Vec::with_capacity(zip_file.size() as usize);
            zip_file
                .read_to_end(&mut bytes)
                .map_err(|e| format!("{}: {e}", archive_path.display()))?;
            Ok(Some(bytes))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(format!("{}: {e}", archive_path.display())),
    }
}

/// Resolves fqns against a fixed class-path, caching everything it loads
/// so a name is never read twice from disk in one compilation run.
pub struct ClassPath {
    entries: Vec<ClassPathEntry>,
    loaded: HashMap<String, Option<TypeId>>,
}

impl ClassPath {
    pub fn new(entries: Vec<ClassPathEntry>) -> Self {
        ClassPath {
            entries,
            loaded: HashMap::new(),
        }
    }

    /// Find `fqn` in the type table, loading it off the class-path and
    /// registering it if this is the first time it's been asked for.
    /// `None` means no class-path entry has it (not a hard error — callers
    /// turn that into the right diagnostic).
    pub fn resolve(&mut self, table: &mut TypeTable, fqn: &str) -> Result<Option<TypeId>, String> {
        if let Some(id) = table.lookup_fqn(fqn) {
            return Ok(Some(id));
        }
        if let Some(&cached) = self.loaded.get(fqn) {
            return Ok(cached);
        }
        for entry in &self.entries {
            if let Some(bytes) = read_from_entry(entry, fqn)? {
                let class = ClassFile::read(&bytes)
                    .map_err(|e| format!("{fqn}.class: {e}"))?;
                let id = register_class_file(table, &class);
                self.loaded.insert(fqn.to_string(), Some(id));
                return Ok(Some(id));
            }
        }
        self.loaded.insert(fqn.to_string(), None);
        Ok(None)
    }
}

/// Register every field and method of a loaded class file into `table`,
/// returning the `Instance` `TypeId` assigned to the class itself.
/// `InlineOnly`-annotated methods get their code and referenced constant
/// pool entries deep-cloned out of `class.constant_pool` so the code
/// generator can splice the body in at the call site without keeping the
/// whole donor class file alive.
pub fn register_class_file(table: &mut TypeTable, class: &ClassFile) -> TypeId {
    let fqn = class.this_name().to_string();
    let package_name = fqn.rsplit_once('/').map(|(p, _)| p.to_string()).unwrap_or_default();
    let super_fqn = class
        .constant_pool
        .class_name_at(class.super_class)
        .map(|s| s.to_string());
    let owner = table.add_instance(&fqn, package_name, super_fqn.clone());

    if let Some(super_fqn) = &super_fqn {
        if let Some(super_id) = table.lookup_fqn(super_fqn) {
            table.get(owner).set_super_type(super_id);
        }
    }

    for method in &class.methods {
        if let Some(method_id) = register_method(table, class, method, owner) {
            table.add_method(owner, method_id);
        }
    }

    owner
}

fn register_method(
    table: &mut TypeTable,
    class: &ClassFile,
    method: &MethodInfo,
    owner: TypeId,
) -> Option<TypeId> {
    let name = method.name(&class.constant_pool).to_string();
    // Constructors and the JVM's static class-init hook aren't candidates
    // for ordinary call-site overload resolution.
    if name == "<clinit>" {
        return None;
    }
    let descriptor = method.descriptor(&class.constant_pool).to_string();
    let (argument_types, return_type) =
        crate::descriptor::parse_method_descriptor(table, &descriptor)?;

    let mut flags = MethodFlags::empty();
    if method.access_flags.contains(MemberAccessFlags::STATIC) {
        flags |= MethodFlags::STATIC;
    }
    let inline = if method.is_inline_only(&class.constant_pool) {
        flags |= MethodFlags::INLINE_ONLY;
        method.code().map(|code| InlineBody {
            code: code.code.clone(),
            imported_pool: import_referenced_pool(&class.constant_pool, method),
        })
    } else {
        None
    };

    let is_constructor = name == "<init>";
    let label = format!("{}::{name}{descriptor}", class.this_name());
    let signature = MethodSignature {
        name: if is_constructor { "<init>".to_string() } else { name },
        source_file_name: String::new(),
        source_line: 0,
        argument_types,
        return_type,
        access_flags: method.access_flags.bits(),
        this_class_type: owner,
        flags,
        inline,
    };
    let kind = if is_constructor {
        crate::types::TypeKind::Constructor(signature)
    } else {
        crate::types::TypeKind::Method(signature)
    };
    Some(table.add(label, kind))
}

/// Clone the donor class's constant pool verbatim, index for index.
///
/// The inline body's code bytes (cloned alongside, in [`register_method`])
/// reference donor-pool indices directly; `Self::import_constant` with its
/// UTF-8 interning would compact/reorder duplicate entries and silently
/// desynchronize those indices from the cloned bytecode. `from_raw_entries`
/// preserves the exact layout instead, so every operand in the spliced code
/// still addresses the same entry it did in the donor class file.
fn import_referenced_pool(
    source: &crate::classfile::constant_pool::ConstantPool,
    _method: &MethodInfo,
) -> crate::classfile::constant_pool::ConstantPool {
    crate::classfile::constant_pool::ConstantPool::from_raw_entries(source.entries().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{ClassAccessFlags, attributes::{Attribute, CodeAttribute}};

    fn sample_class() -> ClassFile {
        let mut class = ClassFile::new("pkg/Sample", "java/lang/Object");
        class.access_flags = ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER;
        let name_index = class.constant_pool.add_utf8("doIt");
        let descriptor_index = class.constant_pool.add_utf8("(I)I");
        class.methods.push(MethodInfo {
            access_flags: MemberAccessFlags::PUBLIC | MemberAccessFlags::STATIC,
            name_index,
            descriptor_index,
            attributes: vec![Attribute::Code(CodeAttribute {
                max_stack: 1,
                max_locals: 1,
                code: vec![crate::classfile::opcodes::RETURN],
                exception_table: vec![],
                attributes: vec![],
            })],
        });
        class
    }

    #[test]
    fn registers_methods_as_candidates() {
        let mut table = TypeTable::new();
        let class = sample_class();
        let owner = register_class_file(&mut table, &class);
        let methods = table.methods_of(owner);
        assert_eq!(methods.len(), 1);
    }
}
