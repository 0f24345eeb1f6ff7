//! Symbol demangling and cosmetic simplification.
//!
//! The resolver scans cleaned assembly for mangled-name tokens and replaces
//! each with its demangled form, obtained from a [`Demangler`] service. Each
//! unique mangled string is resolved at most once per run; a token the
//! service cannot demangle is left exactly as it was, so a misbehaving
//! demangler can never fail the pipeline.
//!
//! [`simplify`] runs strictly after demangling and only ever touches
//! human-readable names: it collapses versioned standard-library
//! inline-namespace qualifiers to their canonical spelling and removes
//! bracketed ABI-tag suffixes.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::patterns::is_ident_char;

/// External demangling service boundary.
#[async_trait]
pub trait Demangler: Send + Sync {
    /// Demangle one name. `None` means the service could not decode it.
    async fn demangle(&self, mangled: &str) -> Option<String>;
}

/// Demangler backed by the `c++filt` binary.
#[derive(Debug, Clone)]
pub struct CxxFilt {
    program: String,
}

impl CxxFilt {
    pub fn new() -> Self {
        Self {
            program: "c++filt".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CxxFilt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Demangler for CxxFilt {
    async fn demangle(&self, mangled: &str) -> Option<String> {
        let output = Command::new(&self.program)
            .arg(mangled)
            .output()
            .await
            .map_err(|err| debug!(program = %self.program, %err, "demangler unavailable"))
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        // c++filt echoes names it cannot decode.
        if text.is_empty() || text == mangled {
            None
        } else {
            Some(text)
        }
    }
}

/// Replace every mangled token in `cleaned` with its demangled form.
///
/// Resolution is memoized per call, keyed by the token text, so each unique
/// mangled string costs at most one service round-trip per run.
pub async fn resolve_symbols(cleaned: &str, demangler: &dyn Demangler) -> String {
    let mut cache: HashMap<String, Option<String>> = HashMap::new();
    let mut out = String::with_capacity(cleaned.len());
    for (i, line) in cleaned.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        resolve_line(line, demangler, &mut cache, &mut out).await;
    }
    out
}

async fn resolve_line(
    line: &str,
    demangler: &dyn Demangler,
    cache: &mut HashMap<String, Option<String>>,
    out: &mut String,
) {
    let mut rest = line;
    while !rest.is_empty() {
        let ident_len: usize = rest
            .chars()
            .take_while(|&c| is_ident_char(c))
            .map(char::len_utf8)
            .sum();
        if ident_len == 0 {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
            continue;
        }
        let token = &rest[..ident_len];
        rest = &rest[ident_len..];
        if !looks_mangled(token) {
            out.push_str(token);
            continue;
        }
        let resolved = match cache.get(token) {
            Some(hit) => hit.clone(),
            None => {
                let result = demangler.demangle(&canonical_mangled(token)).await;
                cache.insert(token.to_string(), result.clone());
                result
            }
        };
        match resolved {
            Some(name) => out.push_str(&name),
            None => out.push_str(token),
        }
    }
}

/// Mangled-name grammar: optional leading underscores, `Z`, then a nested /
/// std-substitution / local / length-prefixed encoding.
fn looks_mangled(token: &str) -> bool {
    let rest = token.trim_start_matches('_');
    let Some(body) = rest.strip_prefix('Z') else {
        return false;
    };
    body.starts_with(['N', 'S', 'L', 'Z']) || body.starts_with(|c: char| c.is_ascii_digit())
}

/// Canonical spelling handed to the service: exactly one leading underscore,
/// regardless of how many the platform (or the cleaner) left on the token.
fn canonical_mangled(token: &str) -> String {
    format!("_{}", token.trim_start_matches('_'))
}

/// Cosmetic cleanup of demangled names.
///
/// `std::__1::` (libc++) and `std::__cxx11::` (libstdc++) collapse to
/// `std::`, and `[abi:...]` suffixes are removed.
pub fn simplify(text: &str) -> String {
    let collapsed = text.replace("::__cxx11::", "::").replace("::__1::", "::");
    strip_abi_tags(&collapsed)
}

fn strip_abi_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("[abi:") {
        out.push_str(&rest[..start]);
        match rest[start..].find(']') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                // Unterminated tag: keep it verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Full resolver stage: demangle, then simplify.
pub async fn resolve_and_simplify(cleaned: &str, demangler: &dyn Demangler) -> String {
    simplify(&resolve_symbols(cleaned, demangler).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Demangler that answers from a fixed table and counts calls.
    #[derive(Default)]
    struct TableDemangler {
        entries: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl TableDemangler {
        fn with(mut self, mangled: &str, demangled: &str) -> Self {
            self.entries.insert(mangled.to_string(), demangled.to_string());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Demangler for TableDemangler {
        async fn demangle(&self, mangled: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entries.get(mangled).cloned()
        }
    }

    #[test]
    fn mangled_grammar() {
        assert!(looks_mangled("_Z6binexpii"));
        assert!(looks_mangled("Z6binexpii")); // cleaner already stripped one underscore
        assert!(looks_mangled("__ZNSt3__14coutE"));
        assert!(looks_mangled("_ZL10local_funcv"));
        assert!(!looks_mangled("Zero"));
        assert!(!looks_mangled("main"));
        assert!(!looks_mangled("_start"));
    }

    #[test]
    fn canonical_form_has_one_underscore() {
        assert_eq!(canonical_mangled("Z6binexpii"), "_Z6binexpii");
        assert_eq!(canonical_mangled("__ZNSt3__14coutE"), "_ZNSt3__14coutE");
    }

    #[tokio::test]
    async fn substitutes_known_tokens_and_keeps_unknown() {
        let demangler = TableDemangler::default().with("_Z6binexpii", "binexp(int, int)");
        let text = "callq Z6binexpii\njmp Z9mysteryv\n";
        let resolved = resolve_symbols(text, &demangler).await;
        assert_eq!(resolved, "callq binexp(int, int)\njmp Z9mysteryv");
    }

    #[tokio::test]
    async fn repeated_tokens_resolve_once() {
        let demangler = TableDemangler::default().with("_Z6binexpii", "binexp(int, int)");
        let text = "callq Z6binexpii\ncallq Z6binexpii\ncallq Z6binexpii";
        resolve_symbols(text, &demangler).await;
        assert_eq!(demangler.calls(), 1);
    }

    #[tokio::test]
    async fn failed_tokens_are_cached_too() {
        let demangler = TableDemangler::default();
        resolve_symbols("callq Z9mysteryv\njmp Z9mysteryv", &demangler).await;
        assert_eq!(demangler.calls(), 1);
    }

    #[test]
    fn simplify_collapses_inline_namespaces() {
        assert_eq!(simplify("std::__1::vector<int>"), "std::vector<int>");
        assert_eq!(
            simplify("std::__cxx11::basic_string<char>"),
            "std::basic_string<char>"
        );
    }

    #[test]
    fn simplify_strips_abi_tags() {
        assert_eq!(
            simplify("std::__1::vector<int>[abi:cxx11]"),
            "std::vector<int>"
        );
        assert_eq!(simplify("f[abi:v2](int)"), "f(int)");
        assert_eq!(simplify("broken[abi:oops"), "broken[abi:oops");
    }
}
