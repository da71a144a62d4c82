//! End-to-end test of the public `compile_file` entry point: writes a
//! `.kt` source to a temp directory, compiles it, and checks the emitted
//! `.class` file round-trips through the codec.
//!
//! `JAVA_HOME` only needs to point at a *path that exists*: this program's
//! hello-world body resolves `println` as a built-in intrinsic
//! (`kotlin.io`'s `println`/`print` never touch the class-path), so
//! nothing ever reads the jmod's contents.

use ktjvmc::CompilerConfig;
use ktjvmc::classfile::ClassFile;
use std::fs;

// Both cases live in one test function: `JAVA_HOME` is process-global, and
// cargo runs tests in one file on separate threads of the same process, so
// two tests mutating it independently would race.
#[test]
fn compile_file_resolves_java_home_and_writes_a_readable_class_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source_path = dir.path().join("hello.kt");
    fs::write(&source_path, "fun main() { println(\"hi\") }").unwrap();

    // SAFETY: no other test in this binary touches `JAVA_HOME`.
    unsafe {
        std::env::remove_var("JAVA_HOME");
    }
    let config = CompilerConfig::new();
    let output_path = ktjvmc::derive_output_path(&source_path);
    let err = ktjvmc::compile_file(&source_path, &output_path, &config).unwrap_err();
    assert_eq!(err.exit_code(), 2, "missing JAVA_HOME must be a usage error");

    let jmods_dir = dir.path().join("jmods");
    fs::create_dir_all(&jmods_dir).unwrap();
    fs::write(jmods_dir.join("java.base.jmod"), b"").unwrap();
    // SAFETY: see above.
    unsafe {
        std::env::set_var("JAVA_HOME", dir.path());
    }

    ktjvmc::compile_file(&source_path, &output_path, &config).expect("compilation must succeed");

    assert_eq!(output_path.file_name().unwrap(), "HelloKt.class");
    let bytes = fs::read(&output_path).expect("output class file must exist");
    let class = ClassFile::read(&bytes).expect("emitted class file must parse back");
    assert_eq!(class.this_name(), "HelloKt");
    assert!(class.find_method("main", "()V").is_some());
    assert!(class.find_method("main", "([Ljava/lang/String;)V").is_some());

    // SAFETY: see above; restore process state for any later test in the binary.
    unsafe {
        std::env::remove_var("JAVA_HOME");
    }
}
