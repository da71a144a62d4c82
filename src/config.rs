//! Compiler configuration: class-path entries, verbosity, JDK discovery.
//!
//! Threaded through the pipeline as plain context: a verbose-logging flag
//! or class-path override is passed down through function arguments rather
//! than read from a `static`/global.

use std::path::{Path, PathBuf};

/// One entry of the class-path: either a directory of `a/b/C.class` files,
/// a `.jar`, or (for the bundled JDK) a `.jmod`.
#[derive(Debug, Clone)]
pub enum ClassPathEntry {
    Directory(PathBuf),
    Jar(PathBuf),
    Jmod(PathBuf),
}

impl ClassPathEntry {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match path.extension().and_then(|e| e.to_str()) {
            Some("jar") => ClassPathEntry::Jar(path),
            Some("jmod") => ClassPathEntry::Jmod(path),
            _ => ClassPathEntry::Directory(path),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ClassPathEntry::Directory(p) | ClassPathEntry::Jar(p) | ClassPathEntry::Jmod(p) => p,
        }
    }
}

/// Configuration for a single compilation run.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Class-path entries in search order. `"."` is always included first
    /// by [`CompilerConfig::new`], matching the CLI default.
    pub class_path: Vec<ClassPathEntry>,
    /// `-v`/`--verbose`: emit progress to stderr as each phase runs.
    pub verbose: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            class_path: vec![ClassPathEntry::Directory(PathBuf::from("."))],
            verbose: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Build a class-path from a colon-separated `-c` argument, with `.`
    /// implicitly prepended (it is always searched).
    pub fn with_classpath_str(mut self, classpath: &str) -> Self {
        let mut entries = vec![ClassPathEntry::Directory(PathBuf::from("."))];
        entries.extend(
            classpath
                .split(':')
                .filter(|s| !s.is_empty())
                .map(ClassPathEntry::from_path),
        );
        self.class_path = entries;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub(crate) fn log(&self, message: impl AsRef<str>) {
        if self.verbose {
            eprintln!("[ktjvmc] {}", message.as_ref());
        }
    }
}

/// Locate `$JAVA_HOME/jmods/java.base.jmod`.
///
/// Failure here is a host-misconfiguration problem — missing or wrong
/// `JAVA_HOME` — surfaced to the caller as a usage-shaped message rather
/// than a per-source diagnostic.
pub fn find_java_base_jmod() -> Result<PathBuf, String> {
    let java_home = std::env::var_os("JAVA_HOME").ok_or_else(|| {
        "JAVA_HOME is not set; ktjvmc needs it to locate jmods/java.base.jmod".to_string()
    })?;
    let candidate = PathBuf::from(java_home).join("jmods").join("java.base.jmod");
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(format!(
            "$JAVA_HOME/jmods/java.base.jmod not found (looked in {})",
            candidate.display()
        ))
    }
}
