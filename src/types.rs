//! The type table: a growable, append-only arena of [`Type`] values
//! addressed by [`TypeId`].
//!
//! The first eleven slots are pre-reserved for the well-known primitives in
//! a fixed order, so code generation can name them as constants instead of
//! searching the table. Adding an `Instance` type with a recognized
//! fully-qualified name *lowers* it to the matching primitive, so boxed
//! references like `java/lang/Integer` are canonicalized at registration
//! time rather than scattered through every call site that compares types.

use bitflags::bitflags;
use std::cell::Cell;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const ANY: TypeId = TypeId(0);
    pub const UNIT: TypeId = TypeId(1);
    pub const BOOLEAN: TypeId = TypeId(2);
    pub const BYTE: TypeId = TypeId(3);
    pub const CHAR: TypeId = TypeId(4);
    pub const SHORT: TypeId = TypeId(5);
    pub const INT: TypeId = TypeId(6);
    pub const FLOAT: TypeId = TypeId(7);
    pub const LONG: TypeId = TypeId(8);
    pub const DOUBLE: TypeId = TypeId(9);
    pub const STRING: TypeId = TypeId(10);

    fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Which integer kinds an [`TypeKind::IntegerLiteral`] type can still
    /// inhabit. An `IntegerLiteral` is both sub- and super-type of every
    /// integer kind its mask contains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntegerKinds: u8 {
        const BYTE  = 0b0001;
        const SHORT = 0b0010;
        const INT   = 0b0100;
        const LONG  = 0b1000;
    }
}

impl IntegerKinds {
    /// The widening set for a concrete integer type:
    /// `Int` widens to `{Byte,Short,Int,Long}`, `Short` to `{Byte,Short}`,
    /// others to themselves.
    pub fn widen(kind: TypeId) -> IntegerKinds {
        match kind {
            TypeId::BYTE => IntegerKinds::BYTE,
            TypeId::SHORT => IntegerKinds::BYTE | IntegerKinds::SHORT,
            TypeId::INT => IntegerKinds::BYTE | IntegerKinds::SHORT | IntegerKinds::INT,
            TypeId::LONG => {
                IntegerKinds::BYTE | IntegerKinds::SHORT | IntegerKinds::INT | IntegerKinds::LONG
            }
            _ => IntegerKinds::empty(),
        }
    }
}

/// A method or constructor signature, shared by [`TypeKind::Method`] and
/// [`TypeKind::Constructor`].
#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: String,
    pub source_file_name: String,
    pub source_line: u32,
    pub argument_types: Vec<TypeId>,
    pub return_type: TypeId,
    pub access_flags: u16,
    pub this_class_type: TypeId,
    pub flags: MethodFlags,
    /// Present only for methods imported from a class file annotated
    /// `InlineOnly`: the method's raw code bytes plus the
    /// constant pool they reference, cloned out of the source class so the
    /// code generator can re-emit them byte-by-byte at the call site.
    pub inline: Option<InlineBody>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodFlags: u8 {
        const STATIC      = 0b0001;
        const INLINE_ONLY = 0b0010;
    }
}

#[derive(Debug, Clone)]
pub struct InlineBody {
    pub code: Vec<u8>,
    pub imported_pool: crate::classfile::constant_pool::ConstantPool,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Any,
    Unit,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
    String,
    Method(MethodSignature),
    Constructor(MethodSignature),
    Instance,
    Array { element_type: TypeId },
    IntegerLiteral { possible: IntegerKinds },
}

/// A registered type. Shared fields mirror the source `Type` variant;
/// `super_type` is resolved lazily (`resolver_resolve_super_lazily`) and
/// memoized in place, so repeated subtype checks don't re-walk the archive
/// loader.
#[derive(Debug)]
pub struct Type {
    pub this_class_name: String,
    pub super_class_name: Option<String>,
    pub package_name: String,
    super_type: Cell<Option<TypeId>>,
    pub kind: TypeKind,
}

impl Type {
    pub fn super_type(&self) -> Option<TypeId> {
        self.super_type.get()
    }

    pub fn set_super_type(&self, id: TypeId) {
        self.super_type.set(Some(id));
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Byte
                | TypeKind::Short
                | TypeKind::Int
                | TypeKind::Long
                | TypeKind::IntegerLiteral { .. }
        )
    }

    pub fn fqn(&self) -> String {
        if self.package_name.is_empty() {
            self.this_class_name.clone()
        } else {
            format!("{}/{}", self.package_name, self.this_class_name)
        }
    }
}

/// Fully-qualified names (slash form, as in descriptors) that canonicalize
/// to a primitive `TypeKind` on registration.
fn boxed_primitive(fqn: &str) -> Option<TypeKind> {
    Some(match fqn {
        "java/lang/Void" => TypeKind::Unit,
        "java/lang/Boolean" => TypeKind::Boolean,
        "java/lang/Byte" => TypeKind::Byte,
        "java/lang/Character" => TypeKind::Char,
        "java/lang/Short" => TypeKind::Short,
        "java/lang/Integer" => TypeKind::Int,
        "java/lang/Float" => TypeKind::Float,
        "java/lang/Long" => TypeKind::Long,
        "java/lang/Double" => TypeKind::Double,
        "java/lang/String" => TypeKind::String,
        _ => return None,
    })
}

pub struct TypeTable {
    types: Vec<Type>,
    by_fqn: HashMap<String, TypeId>,
    /// Methods/constructors declared on or imported for a given owner type,
    /// in declaration order — the candidate set overload resolution filters.
    /// Kept out of `Type` itself so instances registered from an on-demand
    /// archive load can grow their method list lazily without needing
    /// `&mut Type` through a shared table reference.
    methods_by_owner: HashMap<TypeId, Vec<TypeId>>,
}

fn primitive(name: &str, kind: TypeKind) -> Type {
    Type {
        this_class_name: name.to_string(),
        super_class_name: None,
        package_name: String::new(),
        super_type: Cell::new(None),
        kind,
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let types = vec![
            primitive("Any", TypeKind::Any),
            primitive("Unit", TypeKind::Unit),
            primitive("Boolean", TypeKind::Boolean),
            primitive("Byte", TypeKind::Byte),
            primitive("Char", TypeKind::Char),
            primitive("Short", TypeKind::Short),
            primitive("Int", TypeKind::Int),
            primitive("Float", TypeKind::Float),
            primitive("Long", TypeKind::Long),
            primitive("Double", TypeKind::Double),
            primitive("String", TypeKind::String),
        ];
        debug_assert_eq!(types.len(), 11);
        let mut by_fqn = HashMap::new();
        by_fqn.insert("java/lang/Object".to_string(), TypeId::ANY);
        by_fqn.insert("java/lang/String".to_string(), TypeId::STRING);
        TypeTable {
            types,
            by_fqn,
            methods_by_owner: HashMap::new(),
        }
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the eleven primitives are always present
    }

    fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// Append a fresh type for a non-instance kind (array, literal, method,
    /// constructor): these are never canonicalized, so they always get a
    /// new slot.
    pub fn add(&mut self, this_class_name: String, kind: TypeKind) -> TypeId {
        self.push(Type {
            this_class_name,
            super_class_name: None,
            package_name: String::new(),
            super_type: Cell::new(None),
            kind,
        })
    }

    /// Register an `Instance` type for `fqn` (slash-separated), lowering it
    /// to the matching primitive if `fqn` names a recognized boxed type,
    /// and deduplicating against any instance already registered for `fqn`.
    pub fn add_instance(
        &mut self,
        fqn: &str,
        package_name: String,
        super_class_name: Option<String>,
    ) -> TypeId {
        if let Some(&existing) = self.by_fqn.get(fqn) {
            return existing;
        }
        if let Some(kind) = boxed_primitive(fqn) {
            // Boxed primitives still get interned under their fqn so a
            // later lookup is O(1), but they alias the primitive slot.
            let id = match kind {
                TypeKind::Unit => TypeId::UNIT,
                TypeKind::Boolean => TypeId::BOOLEAN,
                TypeKind::Byte => TypeId::BYTE,
                TypeKind::Char => TypeId::CHAR,
                TypeKind::Short => TypeId::SHORT,
                TypeKind::Int => TypeId::INT,
                TypeKind::Float => TypeId::FLOAT,
                TypeKind::Long => TypeId::LONG,
                TypeKind::Double => TypeId::DOUBLE,
                TypeKind::String => TypeId::STRING,
                _ => unreachable!(),
            };
            self.by_fqn.insert(fqn.to_string(), id);
            return id;
        }
        let this_class_name = fqn.rsplit('/').next().unwrap_or(fqn).to_string();
        let id = self.push(Type {
            this_class_name,
            super_class_name,
            package_name,
            super_type: Cell::new(None),
            kind: TypeKind::Instance,
        });
        self.by_fqn.insert(fqn.to_string(), id);
        id
    }

    pub fn lookup_fqn(&self, fqn: &str) -> Option<TypeId> {
        self.by_fqn.get(fqn).copied()
    }

    /// Register `method_id` (a `TypeId` whose `kind` is `Method` or
    /// `Constructor`) as a candidate owned by `owner`.
    pub fn add_method(&mut self, owner: TypeId, method_id: TypeId) {
        self.methods_by_owner.entry(owner).or_default().push(method_id);
    }

    /// The overload-resolution candidate set for `owner`, in the order
    /// they were registered (declaration order for user code, constant-pool
    /// order for archive-loaded classes).
    pub fn methods_of(&self, owner: TypeId) -> &[TypeId] {
        self.methods_by_owner
            .get(&owner)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// `A <: B`: `Any` is a supertype of everything; integers widen per
    /// bitmask; instances walk the (lazily-resolved) super chain; `String`
    /// is special-cased as a subtype of `Object`/`Any`; other primitives
    /// are subtypes only of themselves. `Method`/`Constructor` are
    /// invariant.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sup == TypeId::ANY {
            return true;
        }
        if sub == sup {
            return true;
        }
        let sub_ty = self.get(sub);
        let sup_ty = self.get(sup);
        match (&sub_ty.kind, &sup_ty.kind) {
            (TypeKind::IntegerLiteral { possible }, _) if sup_ty.is_integer() => {
                possible.contains(IntegerKinds::widen(sup))
            }
            (_, TypeKind::IntegerLiteral { possible }) if sub_ty.is_integer() => {
                possible.contains(IntegerKinds::widen(sub))
            }
            _ if sub_ty.is_integer() && sup_ty.is_integer() => {
                let widened = IntegerKinds::widen(sub);
                let required = IntegerKinds::widen(sup);
                widened & required == required
            }
            (TypeKind::Instance, TypeKind::Instance) => self.walk_super_chain(sub, sup),
            (
                TypeKind::Method(a) | TypeKind::Constructor(a),
                TypeKind::Method(b) | TypeKind::Constructor(b),
            ) => {
                a.this_class_type == b.this_class_type
                    && a.argument_types.len() == b.argument_types.len()
                    && a.argument_types
                        .iter()
                        .zip(&b.argument_types)
                        .all(|(x, y)| x == y)
                    && a.return_type == b.return_type
            }
            _ => false,
        }
    }

    fn walk_super_chain(&self, mut current: TypeId, target: TypeId) -> bool {
        // The JVM verifier guarantees the super chain is acyclic, so no
        // visited-set bookkeeping is needed here.
        loop {
            if current == target {
                return true;
            }
            match self.get(current).super_type() {
                Some(next) => current = next,
                None => return false,
            }
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_occupy_fixed_slots() {
        let table = TypeTable::new();
        assert_eq!(table.len(), 11);
        assert!(matches!(table.get(TypeId::INT).kind, TypeKind::Int));
        assert!(matches!(table.get(TypeId::STRING).kind, TypeKind::String));
    }

    #[test]
    fn int_widens_to_long_but_not_vice_versa() {
        let table = TypeTable::new();
        assert!(table.is_subtype(TypeId::INT, TypeId::LONG));
        assert!(!table.is_subtype(TypeId::LONG, TypeId::INT));
    }

    #[test]
    fn boxed_integer_lowers_to_primitive() {
        let mut table = TypeTable::new();
        let id = table.add_instance("java/lang/Integer", "java/lang".to_string(), None);
        assert_eq!(id, TypeId::INT);
    }

    #[test]
    fn string_is_subtype_of_any() {
        let table = TypeTable::new();
        assert!(table.is_subtype(TypeId::STRING, TypeId::ANY));
    }
}
