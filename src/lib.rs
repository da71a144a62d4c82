//! `ktjvmc`: ahead-of-time compiler from a Kotlin-like source language to
//! JVM class files.
//!
//! The pipeline is four stages, each a free function operating on plain
//! data rather than a method on a shared "compiler" object:
//!
//! ```text
//! source bytes -> lexer::lex -> parser::parse -> resolver::resolve -> codegen::generate -> classfile::ClassFile::write
//! ```
//!
//! [`compile_file`] drives all four stages for a single source file and
//! writes the resulting `.class` file to disk. It is also the thing the
//! CLI (`src/main.rs`) calls.

pub mod archive;
pub mod ast;
pub mod classfile;
pub mod codegen;
pub mod config;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod types;

pub use config::{ClassPathEntry, CompilerConfig};
pub use error::CompileError;

use archive::ClassPath;
use classfile::ClassFile;
use std::fs;
use std::path::{Path, PathBuf};
use types::{TypeId, TypeTable};

/// Derive the output `.class` path from a `.kt` source path, per Kotlin/JVM
/// file-facade conventions: `foo.kt` -> `FooKt.class`, `fizzBuzz.kt` ->
/// `FizzBuzzKt.class`. The first byte of the stem is capitalized and `Kt`
/// is appended; the rest of the stem is left untouched.
pub fn derive_output_path(source_path: &Path) -> PathBuf {
    let stem = source_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let mut facade = String::with_capacity(stem.len() + 2);
    let mut chars = stem.chars();
    if let Some(first) = chars.next() {
        facade.extend(first.to_uppercase());
    }
    facade.push_str(chars.as_str());
    facade.push_str("Kt");
    source_path.with_file_name(format!("{facade}.class"))
}

/// Compile a single `.kt` source file to a `.class` file at `output_path`,
/// using `config` for the class-path and verbose-logging flag.
///
/// No partial output is ever written: either every phase succeeds and the
/// complete class file is written, or `Err` is returned and `output_path`
/// is left untouched.
pub fn compile_file(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileError> {
    let source = fs::read(source_path).map_err(|e| CompileError::io(source_path, e))?;

    config.log(format!("lexing {}", source_path.display()));
    let lexed = lexer::lex(&source);
    if lexed.diagnostics.has_errors() {
        return Err(CompileError::diagnostics(
            source_path,
            lexed.line_table,
            lexed.diagnostics.into_vec(),
        ));
    }

    config.log("parsing");
    let parsed = parser::parse(&source, &lexed.tokens);
    if parsed.diagnostics.has_errors() {
        return Err(CompileError::diagnostics(
            source_path,
            lexed.line_table,
            parsed.diagnostics.into_vec(),
        ));
    }

    let this_internal_name = facade_internal_name(source_path);
    let source_file_name = source_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("source.kt")
        .to_string();

    let mut table = TypeTable::new();
    let this_class: TypeId = table.add_instance(&this_internal_name, String::new(), Some("java/lang/Object".to_string()));

    let mut class_path_entries = config.class_path.clone();
    let java_base = config::find_java_base_jmod().map_err(CompileError::Usage)?;
    class_path_entries.push(ClassPathEntry::Jmod(java_base));
    let mut class_path = ClassPath::new(class_path_entries);

    config.log("resolving");
    let mut ast = parsed.ast;
    let resolve_result = resolver::resolve(
        &mut ast,
        &source,
        &lexed.tokens,
        &mut table,
        &mut class_path,
        this_class,
    );
    if resolve_result.diagnostics.has_errors() {
        return Err(CompileError::diagnostics(
            source_path,
            lexed.line_table,
            resolve_result.diagnostics.into_vec(),
        ));
    }

    config.log("generating bytecode");
    let class: ClassFile = codegen::generate(
        &ast,
        parsed.root,
        &source,
        &lexed.tokens,
        &lexed.line_table,
        &mut table,
        &resolve_result,
        &this_internal_name,
        &source_file_name,
    );

    let bytes = class.write();
    fs::write(output_path, bytes).map_err(|e| CompileError::io(output_path, e))?;
    config.log(format!("wrote {}", output_path.display()));
    Ok(())
}

/// The JVM-internal name (`/`-separated, no extension) the generated file
/// facade class is registered under: the same capitalize-and-append-`Kt`
/// rule as [`derive_output_path`], minus the `.class` suffix.
fn facade_internal_name(source_path: &Path) -> String {
    let stem = source_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let mut facade = String::with_capacity(stem.len() + 2);
    let mut chars = stem.chars();
    if let Some(first) = chars.next() {
        facade.extend(first.to_uppercase());
    }
    facade.push_str(chars.as_str());
    facade.push_str("Kt");
    facade
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_facade_class_name() {
        assert_eq!(
            derive_output_path(Path::new("foo.kt")),
            PathBuf::from("FooKt.class")
        );
        assert_eq!(
            derive_output_path(Path::new("fizzBuzz.kt")),
            PathBuf::from("FizzBuzzKt.class")
        );
    }

    #[test]
    fn derives_facade_class_name_with_directory() {
        assert_eq!(
            derive_output_path(Path::new("src/hello.kt")),
            PathBuf::from("src/HelloKt.class")
        );
    }

    #[test]
    fn facade_internal_name_matches_output_stem() {
        assert_eq!(facade_internal_name(Path::new("hello.kt")), "HelloKt");
    }
}
