//! Classification tables for assembly text.
//!
//! Every filtering decision the lexer makes goes through one of the
//! classifiers here: section lines, label lines, and directive lines each
//! have their own table of recognizers. The tables live in a single
//! immutable [`PatternSet`] shared by reference, so the rules are
//! inspectable and unit-testable on their own, away from the scan loop.

/// How a `.section`-style line affects filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionClass {
    /// Debug/metadata section (DWARF, linker-internal, CTF, LLVM-internal).
    Debug,
    /// Code-carrying section (`.text` and friends).
    Code,
    /// Any other section; leaves the current filtering state untouched.
    Other,
}

/// How a label line is treated by block filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelClass {
    /// Runtime/exception-handling/STL machinery; opens an excluded block.
    System,
    /// Compiler-internal local label (basic blocks, jump tables, DWARF anchors).
    Noise,
    /// Anything else: a symbol the user may recognize.
    User,
}

/// The classification tables. One static instance, never mutated.
#[derive(Debug)]
pub struct PatternSet {
    /// Substrings that mark a `.section` line as debug/metadata (matched
    /// case-insensitively).
    debug_section_markers: &'static [&'static str],
    /// Local-label stems accepted after the `L`/`l` prefix of a noise label.
    noise_label_stems: &'static [&'static str],
    /// Substrings that mark a label as runtime/EH machinery.
    system_symbol_markers: &'static [&'static str],
    /// Directives that emit data and therefore survive filtering.
    data_directives: &'static [&'static str],
}

static PATTERNS: PatternSet = PatternSet {
    debug_section_markers: &["__dwarf", "__ld", "__debug", "__apple", "__ctf", "__llvm", ".debug"],
    noise_label_stems: &[
        "BB", "func", "tmp", "return", "set", "addr", "exception", "ttbaseref", "ttbase",
        "cst", "debug", "names", "info", "line", "cu", "common", "str_off", "abbrev",
    ],
    system_symbol_markers: &["GCC_except", "___cxa", "___gxx", "clang_call"],
    data_directives: &[".asciz", ".string"],
};

/// The shared classification tables.
pub fn patterns() -> &'static PatternSet {
    &PATTERNS
}

impl PatternSet {
    /// Whether this line declares a section and must be consumed by the
    /// section filter (either a `.section` directive or one of the short
    /// forms that stand alone).
    pub fn is_section_line(&self, trimmed: &str) -> bool {
        trimmed.starts_with(".section") || matches!(trimmed, ".text" | ".data" | ".cstring")
    }

    /// Classify a section line.
    pub fn classify_section(&self, trimmed: &str) -> SectionClass {
        if trimmed.starts_with(".section") {
            let rest = &trimmed[".section".len()..];
            let lowered = rest.to_ascii_lowercase();
            if self
                .debug_section_markers
                .iter()
                .any(|marker| lowered.contains(marker))
            {
                return SectionClass::Debug;
            }
            if lowered.contains("text") {
                return SectionClass::Code;
            }
            return SectionClass::Other;
        }
        if trimmed.starts_with(".text") {
            return SectionClass::Code;
        }
        SectionClass::Other
    }

    /// Classify a label line (the trimmed text, ending in `:`).
    pub fn classify_label(&self, trimmed: &str) -> LabelClass {
        if self.is_system_symbol(trimmed) {
            return LabelClass::System;
        }
        if self.is_noise_label(trimmed) {
            return LabelClass::Noise;
        }
        LabelClass::User
    }

    /// Runtime/EH/STL machinery is recognized anywhere in the label text:
    /// either one of the fixed markers, or a mangled name whose first
    /// qualifier is `St` (the `std` namespace), i.e. `Z`, any run of
    /// `N`/`K`, then `St`.
    fn is_system_symbol(&self, text: &str) -> bool {
        if self
            .system_symbol_markers
            .iter()
            .any(|marker| text.contains(marker))
        {
            return true;
        }
        let bytes = text.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            if b != b'Z' {
                continue;
            }
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j] == b'N' || bytes[j] == b'K') {
                j += 1;
            }
            if bytes[j..].starts_with(b"St") {
                return true;
            }
        }
        false
    }

    /// A noise label is `_*` then `L`/`l`, then either a digit run or one of
    /// the known stems, then identifier characters up to a `:`.
    fn is_noise_label(&self, trimmed: &str) -> bool {
        let rest = trimmed.trim_start_matches('_');
        let Some(rest) = rest.strip_prefix(['L', 'l']) else {
            return false;
        };
        let tail = if rest.starts_with(|c: char| c.is_ascii_digit()) {
            rest.trim_start_matches(|c: char| c.is_ascii_digit())
        } else {
            match self
                .noise_label_stems
                .iter()
                .find_map(|stem| rest.strip_prefix(stem))
            {
                Some(tail) => tail,
                None => return false,
            }
        };
        tail.trim_start_matches(is_ident_char).starts_with(':')
    }

    /// Whether the line is an assembler directive (`.` followed by a word).
    pub fn is_directive(&self, trimmed: &str) -> bool {
        trimmed
            .strip_prefix('.')
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_'))
    }

    /// Whether the directive emits data and must survive filtering.
    pub fn is_data_directive(&self, trimmed: &str) -> bool {
        self.data_directives
            .iter()
            .any(|directive| trimmed.starts_with(directive))
    }
}

/// Identifier characters as they appear in assembly symbols.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Parse a `.file <id> "<path>"` directive.
pub fn parse_file_directive(trimmed: &str) -> Option<(u32, &str)> {
    let rest = trimmed.strip_prefix(".file")?;
    let rest = strip_required_space(rest)?;
    let (id, rest) = take_number(rest)?;
    let rest = strip_required_space(rest)?;
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some((id, &rest[..end]))
}

/// Parse a `.loc <fileId> <line>` directive (trailing fields ignored).
pub fn parse_loc_directive(trimmed: &str) -> Option<(u32, u32)> {
    let rest = trimmed.strip_prefix(".loc")?;
    let rest = strip_required_space(rest)?;
    let (file_id, rest) = take_number(rest)?;
    let rest = strip_required_space(rest)?;
    let (line, _) = take_number(rest)?;
    Some((file_id, line))
}

fn strip_required_space(s: &str) -> Option<&str> {
    let trimmed = s.trim_start();
    if trimmed.len() == s.len() {
        return None;
    }
    Some(trimmed)
}

fn take_number(s: &str) -> Option<(u32, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}
