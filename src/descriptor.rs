//! JVM descriptor codec: a bidirectional function between a [`TypeId`] and
//! its descriptor string (`Ljava/lang/String;`, `(II)V`, ...), bit-exact
//! with the JVM spec.

use crate::types::{TypeId, TypeKind, TypeTable};

/// Parse a field descriptor (`V`, `I`, `Ljava/lang/String;`, `[I`, ...),
/// registering any `Instance`/`Array` types it mentions that aren't already
/// in `table`. Returns the byte length consumed, so callers parsing a
/// method descriptor's argument list can iterate without re-scanning.
pub fn parse_field_descriptor(table: &mut TypeTable, descriptor: &str) -> Option<(TypeId, usize)> {
    let bytes = descriptor.as_bytes();
    match bytes.first()? {
        b'V' => Some((TypeId::UNIT, 1)),
        b'B' => Some((TypeId::BYTE, 1)),
        b'C' => Some((TypeId::CHAR, 1)),
        b'D' => Some((TypeId::DOUBLE, 1)),
        b'F' => Some((TypeId::FLOAT, 1)),
        b'I' => Some((TypeId::INT, 1)),
        b'J' => Some((TypeId::LONG, 1)),
        b'S' => Some((TypeId::SHORT, 1)),
        b'Z' => Some((TypeId::BOOLEAN, 1)),
        b'L' => {
            let end = bytes.iter().position(|&b| b == b';')?;
            let fqn = &descriptor[1..end];
            let package_name = fqn.rsplit_once('/').map(|(p, _)| p.to_string()).unwrap_or_default();
            let id = table.add_instance(fqn, package_name, None);
            Some((id, end + 1))
        }
        b'[' => {
            let (element, consumed) = parse_field_descriptor(table, &descriptor[1..])?;
            let id = table.add(format!("[{}", descriptor_of(table, element)), TypeKind::Array {
                element_type: element,
            });
            Some((id, consumed + 1))
        }
        _ => None,
    }
}

/// Parse a method descriptor `(T1T2...)R`.
pub fn parse_method_descriptor(
    table: &mut TypeTable,
    descriptor: &str,
) -> Option<(Vec<TypeId>, TypeId)> {
    let descriptor = descriptor.strip_prefix('(')?;
    let (params_str, ret_str) = descriptor.split_once(')')?;
    let mut args = Vec::new();
    let mut rest = params_str;
    while !rest.is_empty() {
        let (id, consumed) = parse_field_descriptor(table, rest)?;
        args.push(id);
        rest = &rest[consumed..];
    }
    let (ret, _) = parse_field_descriptor(table, ret_str)?;
    Some((args, ret))
}

/// Emit the descriptor for a single type.
pub fn descriptor_of(table: &TypeTable, id: TypeId) -> String {
    match &table.get(id).kind {
        TypeKind::Any | TypeKind::Instance => format!("L{};", table.get(id).fqn()),
        TypeKind::Unit => "V".to_string(),
        TypeKind::Boolean => "Z".to_string(),
        TypeKind::Byte => "B".to_string(),
        TypeKind::Char => "C".to_string(),
        TypeKind::Short => "S".to_string(),
        TypeKind::Int => "I".to_string(),
        TypeKind::Float => "F".to_string(),
        TypeKind::Long => "J".to_string(),
        TypeKind::Double => "D".to_string(),
        TypeKind::String => "Ljava/lang/String;".to_string(),
        TypeKind::Array { element_type } => format!("[{}", descriptor_of(table, *element_type)),
        // IntegerLiteral has no descriptor of its own: by the time codegen
        // needs one, the resolver has already concretized it to Int/Long.
        TypeKind::IntegerLiteral { .. } => "I".to_string(),
        TypeKind::Method(sig) | TypeKind::Constructor(sig) => method_descriptor_of(table, sig),
    }
}

fn method_descriptor_of(table: &TypeTable, sig: &crate::types::MethodSignature) -> String {
    let mut out = String::from("(");
    for &arg in &sig.argument_types {
        out.push_str(&descriptor_of(table, arg));
    }
    out.push(')');
    out.push_str(&descriptor_of(table, sig.return_type));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitive() {
        let table = TypeTable::new();
        assert_eq!(descriptor_of(&table, TypeId::INT), "I");
        assert_eq!(descriptor_of(&table, TypeId::UNIT), "V");
    }

    #[test]
    fn round_trips_object_and_array() {
        let mut table = TypeTable::new();
        let (id, consumed) =
            parse_field_descriptor(&mut table, "Ljava/lang/String;").unwrap();
        assert_eq!(consumed, "Ljava/lang/String;".len());
        assert_eq!(id, TypeId::STRING);
        assert_eq!(descriptor_of(&table, id), "Ljava/lang/String;");

        let (arr, _) = parse_field_descriptor(&mut table, "[I").unwrap();
        assert_eq!(descriptor_of(&table, arr), "[I");
    }

    #[test]
    fn round_trips_method_descriptor() {
        let mut table = TypeTable::new();
        let (args, ret) = parse_method_descriptor(&mut table, "(II)V").unwrap();
        assert_eq!(args, vec![TypeId::INT, TypeId::INT]);
        assert_eq!(ret, TypeId::UNIT);
    }
}
