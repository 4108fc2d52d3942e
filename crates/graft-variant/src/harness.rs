//! Compile and test harness plumbing.
//!
//! Commands are templates with literal placeholders; each test invocation
//! draws a fresh port from a wrapping counter so parallel harness runs never
//! collide. The harness script owns its own timeouts; a nonzero exit status
//! is a test failure, not a system error.

use std::io;
use std::path::Path;
use std::process::Command;

use tracing::debug;

/// First port handed out.
pub const PORT_MIN: u16 = 808;
/// Exclusive upper bound; allocation wraps back to [`PORT_MIN`] here.
pub const PORT_WRAP: u16 = 1600;

/// A wrapping port counter over `[PORT_MIN, PORT_WRAP)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAllocator {
    next: u16,
}

impl PortAllocator {
    pub fn new() -> Self {
        PortAllocator { next: PORT_MIN }
    }

    pub fn allocate(&mut self) -> u16 {
        let port = self.next;
        self.next += 1;
        if self.next >= PORT_WRAP {
            self.next = PORT_MIN;
        }
        port
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        PortAllocator::new()
    }
}

/// Placeholder names substituted into command templates.
pub mod placeholder {
    pub const COMPILER_NAME: &str = "__COMPILER_NAME__";
    pub const EXE_NAME: &str = "__EXE_NAME__";
    pub const SOURCE_NAME: &str = "__SOURCE_NAME__";
    pub const COMPILER_OPTIONS: &str = "__COMPILER_OPTIONS__";
    pub const TEST_SCRIPT: &str = "__TEST_SCRIPT__";
    pub const TEST_NAME: &str = "__TEST_NAME__";
    pub const PORT: &str = "__PORT__";
    pub const FITNESS_FILE: &str = "__FITNESS_FILE__";
}

pub const DEFAULT_COMPILE_TEMPLATE: &str =
    "__COMPILER_NAME__ -o __EXE_NAME__ __SOURCE_NAME__ __COMPILER_OPTIONS__";

pub const DEFAULT_TEST_TEMPLATE: &str =
    "__TEST_SCRIPT__ __EXE_NAME__ __TEST_NAME__ __PORT__ __SOURCE_NAME__ __FITNESS_FILE__";

/// Literal placeholder substitution; unknown text passes through untouched.
pub fn substitute(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (placeholder, value) in substitutions {
        out = out.replace(placeholder, value);
    }
    out
}

/// Run a substituted command line through the shell; `Ok(true)` on exit 0.
pub fn run_shell(command: &str) -> io::Result<bool> {
    debug!(command, "spawning");
    let status = Command::new("sh").arg("-c").arg(command).status()?;
    Ok(status.success())
}

/// Parse a fitness file: comma/whitespace-separated floats.
pub fn parse_fitness(text: &str) -> Vec<f64> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

/// Read and remove a fitness file, defaulting by pass/fail when it is
/// missing or empty.
pub fn take_fitness(path: &Path, passed: bool) -> Vec<f64> {
    let parsed = std::fs::read_to_string(path)
        .map(|text| parse_fitness(&text))
        .unwrap_or_default();
    let _ = std::fs::remove_file(path);
    if parsed.is_empty() {
        if passed {
            vec![1.0]
        } else {
            vec![0.0]
        }
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn ports_wrap_and_stay_in_range() {
        let mut ports = PortAllocator::new();
        let span = (PORT_WRAP - PORT_MIN) as usize;
        let mut seen = std::collections::HashSet::new();
        for _ in 0..span {
            let port = ports.allocate();
            assert!((PORT_MIN..PORT_WRAP).contains(&port));
            assert!(seen.insert(port), "port {port} repeated within one span");
        }
        // The next allocation wraps back to the first port.
        assert_eq!(ports.allocate(), PORT_MIN);
    }

    #[test]
    fn substitution_is_literal() {
        let cmd = substitute(
            DEFAULT_COMPILE_TEMPLATE,
            &[
                (placeholder::COMPILER_NAME, "gcc"),
                (placeholder::EXE_NAME, "variant"),
                (placeholder::SOURCE_NAME, "variant.c"),
                (placeholder::COMPILER_OPTIONS, "-O1"),
            ],
        );
        assert_eq!(cmd, "gcc -o variant variant.c -O1");
    }

    #[test]
    fn fitness_parses_commas_and_whitespace() {
        assert_eq!(parse_fitness("1.0, 0.5\n0.25"), vec![1.0, 0.5, 0.25]);
        assert_eq!(parse_fitness(""), Vec::<f64>::new());
    }

    #[test]
    fn missing_fitness_defaults_by_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fitness.out");
        assert_eq!(take_fitness(&path, true), vec![1.0]);
        assert_eq!(take_fitness(&path, false), vec![0.0]);

        let mut file = std::fs::File::create(&path).expect("create");
        write!(file, "0.25 0.75").expect("write");
        drop(file);
        assert_eq!(take_fitness(&path, false), vec![0.25, 0.75]);
        // The file is consumed.
        assert!(!path.exists());
    }

    #[test]
    fn shell_exit_status_maps_to_bool() {
        assert!(run_shell("true").expect("spawn"));
        assert!(!run_shell("false").expect("spawn"));
    }
}
