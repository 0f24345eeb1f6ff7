//! Assembly cleaning with source-line correlation.
//!
//! [`clean`] takes the raw compiler emission and produces the document the
//! rest of the pipeline operates on: compiler/debug noise stripped, labels
//! cosmetically cleaned and spaced, and a mapping from cleaned line index
//! back to the source line that produced it, recovered from the `.file` and
//! `.loc` debug directives.
//!
//! Line indices into the cleaned document are a stable key: downstream
//! correlation (cycle annotation, source peek) addresses lines by position,
//! so the document is never reordered or renumbered after it is built.

use std::collections::BTreeMap;
use std::path::Path;

use crate::patterns::{self, patterns, LabelClass, SectionClass};

/// Which classes of noise survive cleaning. All hiding is on by default.
#[derive(Debug, Clone, Copy)]
pub struct FilterOptions {
    /// Keep debug/metadata sections (DWARF and friends) instead of dropping them.
    pub show_debug_sections: bool,
    /// Keep blocks opened by runtime/EH/STL symbols.
    pub show_system_blocks: bool,
    /// Drop compiler-internal local labels.
    pub hide_noise_labels: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            show_debug_sections: false,
            show_system_blocks: false,
            hide_noise_labels: true,
        }
    }
}

/// File ids declared by `.file` directives, in order of appearance.
/// Immutable once built for a compile run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileTable {
    entries: Vec<(u32, String)>,
}

impl FileTable {
    /// Collect every `.file <id> "<path>"` directive in the input. This
    /// never fails; unmatched lines are simply not file directives.
    pub fn parse(raw: &str) -> Self {
        let mut entries = Vec::new();
        for line in raw.lines() {
            if let Some((id, path)) = patterns::parse_file_directive(line.trim_start()) {
                entries.push((id, path.to_string()));
            }
        }
        Self { entries }
    }

    /// Path registered for an id (first declaration wins).
    pub fn path_for(&self, id: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, path)| path.as_str())
    }

    /// The id whose path basename matches `source_filename`'s basename;
    /// `1` when nothing matches or no filename was given.
    pub fn main_file_id(&self, source_filename: Option<&str>) -> u32 {
        let Some(source_basename) = source_filename.map(basename) else {
            return 1;
        };
        self.entries
            .iter()
            .find(|(_, path)| basename(path) == source_basename)
            .map(|&(id, _)| id)
            .unwrap_or(1)
    }
}

/// The cleaned assembly document plus its line-to-source mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedAssembly {
    lines: Vec<String>,
    line_map: BTreeMap<usize, u32>,
}

impl CleanedAssembly {
    /// The surviving lines, in emission order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The full document as a single string.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Mapping from 0-based cleaned line index to source line number.
    ///
    /// Only lines emitted while a location marker for the main file was
    /// active are present.
    pub fn line_map(&self) -> &BTreeMap<usize, u32> {
        &self.line_map
    }

    /// Source line for a cleaned line index, if one was recorded.
    pub fn source_line_for(&self, index: usize) -> Option<u32> {
        self.line_map.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The single-slot label buffer, spelled out as a two-state machine so the
/// commit protocol is explicit: a user label is queued here and only emitted
/// once a surviving instruction or data line follows it.
#[derive(Debug, Default)]
enum PendingLabel {
    #[default]
    None,
    Queued(String),
}

/// Clean raw assembly and recover the line mapping.
///
/// Pass 1 resolves the main file id from `.file` directives: the first id
/// whose path basename equals `source_filename`'s basename wins, and the
/// default of `1` is kept when nothing matches or no filename was given.
/// Pass 2 is a single forward scan applying section, block, and directive
/// filtering with the commit protocol described on [`PendingLabel`].
pub fn clean(raw: &str, source_filename: Option<&str>, opts: &FilterOptions) -> CleanedAssembly {
    let pats = patterns();
    let main_file_id = FileTable::parse(raw).main_file_id(source_filename);

    let mut doc = CleanedAssembly::default();
    let mut in_valid_section = true;
    let mut in_user_block = true;
    let mut pending = PendingLabel::None;
    let mut marker: Option<(u32, u32)> = None;

    for line in raw.lines() {
        // Strip a `;` comment tail before any classification.
        let content = match line.find(';') {
            Some(at) => line[..at].trim_end(),
            None => line.trim_end(),
        };
        let trimmed = content.trim_start();
        if trimmed.is_empty() {
            continue;
        }

        if pats.is_section_line(trimmed) {
            match pats.classify_section(trimmed) {
                SectionClass::Debug => in_valid_section = opts.show_debug_sections,
                SectionClass::Code => in_valid_section = true,
                SectionClass::Other => {}
            }
            continue;
        }
        if !in_valid_section {
            continue;
        }

        if let Some((file_id, source_line)) = patterns::parse_loc_directive(trimmed) {
            marker = Some((file_id, source_line));
            continue;
        }

        let is_label = trimmed.ends_with(':');
        if is_label {
            match pats.classify_label(trimmed) {
                LabelClass::System => {
                    in_user_block = opts.show_system_blocks;
                    pending = PendingLabel::None;
                    continue;
                }
                LabelClass::Noise => {
                    if opts.hide_noise_labels {
                        continue;
                    }
                    // Retained noise labels commit like ordinary lines.
                }
                LabelClass::User => {
                    in_user_block = true;
                    pending = PendingLabel::Queued(content.to_string());
                    continue;
                }
            }
        }
        if !in_user_block {
            continue;
        }

        if pats.is_directive(trimmed) && !is_label && !pats.is_data_directive(trimmed) {
            continue;
        }

        // Commit: flush the queued label, then the line itself.
        if let PendingLabel::Queued(label) = std::mem::take(&mut pending) {
            let formatted = strip_label_marker(&strip_mangle_underscores(&label));
            if !doc.lines.is_empty() {
                doc.lines.push(String::new());
            }
            doc.lines.push(formatted);
        }
        if let Some((file_id, source_line)) = marker {
            if file_id == main_file_id {
                doc.line_map.insert(doc.lines.len(), source_line);
            }
        }
        doc.lines.push(strip_mangle_underscores(content));
    }

    doc
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// Strip one leading name-mangling underscore from each identifier token:
/// `callq __main` becomes `callq _main`, while underscores inside an
/// identifier are left alone.
fn strip_mangle_underscores(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut prev_is_word = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '_'
            && !prev_is_word
            && chars.get(i + 1).copied().is_some_and(patterns::is_ident_char)
        {
            // Drop the underscore and copy the rest of the identifier as-is.
            i += 1;
            while i < chars.len() && patterns::is_ident_char(chars[i]) {
                out.push(chars[i]);
                i += 1;
            }
            prev_is_word = out.chars().next_back().is_some_and(is_word_char);
            continue;
        }
        out.push(c);
        prev_is_word = is_word_char(c);
        i += 1;
    }
    out
}

/// Word characters for boundary detection (`$` deliberately excluded).
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Remove a leading local-label marker (`L_`/`l_`) from a label line,
/// together with the indentation in front of it.
fn strip_label_marker(label: &str) -> String {
    let trimmed = label.trim_start();
    let mut chars = trimmed.chars();
    if matches!(chars.next(), Some('L') | Some('l')) && chars.next() == Some('_') {
        return trimmed[2..].to_string();
    }
    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_default(raw: &str, source: Option<&str>) -> CleanedAssembly {
        clean(raw, source, &FilterOptions::default())
    }

    #[test]
    fn keeps_instructions_and_drops_directives() {
        let doc = clean_default(
            ".text\n.globl main\nmain:\n\tpushq %rbp\n\tmovq %rsp, %rbp\n\tret\n",
            None,
        );
        assert_eq!(doc.lines(), ["main:", "\tpushq %rbp", "\tmovq %rsp, %rbp", "\tret"]);
    }

    #[test]
    fn data_directives_survive() {
        let doc = clean_default(".text\nmsg:\n\t.asciz \"hello\"\n\t.globl msg\n", None);
        assert_eq!(doc.lines(), ["msg:", "\t.asciz \"hello\""]);
    }

    #[test]
    fn pending_label_without_body_is_dropped() {
        // A trailing label never followed by a committed line vanishes.
        let doc = clean_default(".text\nmain:\n\tret\ntail:\n", None);
        assert_eq!(doc.lines(), ["main:", "\tret"]);
    }

    #[test]
    fn blank_separator_inserted_between_labels() {
        let doc = clean_default("first:\n\tnop\nsecond:\n\tret\n", None);
        assert_eq!(doc.lines(), ["first:", "\tnop", "", "second:", "\tret"]);
    }

    #[test]
    fn first_label_gets_no_leading_blank() {
        let doc = clean_default("only:\n\tret\n", None);
        assert_eq!(doc.lines()[0], "only:");
    }

    #[test]
    fn system_block_excluded_until_next_user_label() {
        let raw = "\
main:
\tpushq %rbp
__ZNSt3__14coutE:
\tmovl $0, %eax
helper:
\tret
";
        let doc = clean_default(raw, None);
        let text = doc.text();
        assert!(text.contains("pushq %rbp"));
        assert!(!text.contains("movl $0, %eax"));
        assert!(text.contains("helper:"));
        assert!(text.contains("\tret"));
    }

    #[test]
    fn noise_labels_dropped_without_closing_block() {
        let raw = "main:\n\tpushq %rbp\nLBB0_1:\n\tret\n";
        let doc = clean_default(raw, None);
        assert_eq!(doc.lines(), ["main:", "\tpushq %rbp", "\tret"]);
    }

    #[test]
    fn retained_noise_label_commits_as_content() {
        let opts = FilterOptions {
            hide_noise_labels: false,
            ..FilterOptions::default()
        };
        let doc = clean("main:\n\tnop\nLBB0_1:\n\tret\n", None, &opts);
        assert!(doc.text().contains("LBB0_1:"));
    }

    #[test]
    fn debug_sections_dropped_by_default() {
        let raw = "\
.section __DWARF,__debug_info
\t.byte 1
.text
main:
\tret
";
        let doc = clean_default(raw, None);
        assert_eq!(doc.lines(), ["main:", "\tret"]);
    }

    #[test]
    fn data_section_keeps_previous_validity() {
        // `.data` neither enables nor disables filtering.
        let raw = ".section __DWARF,__debug_info\n.data\nval:\n\t.asciz \"x\"\n";
        let doc = clean_default(raw, None);
        assert!(doc.is_empty());
    }

    #[test]
    fn semicolon_comments_stripped() {
        let doc = clean_default("main:\n\tret ; done\n", None);
        assert_eq!(doc.lines(), ["main:", "\tret"]);
    }

    #[test]
    fn mapping_restricted_to_main_file() {
        let raw = "\
.file 1 \"main.cpp\"
.file 2 \"/usr/include/iostream\"
.text
main:
\t.loc 1 10
\tpushq %rbp
\t.loc 2 500
\tmovl $0, %eax
\t.loc 1 12
\tret
";
        let doc = clean_default(raw, Some("main.cpp"));
        let values: Vec<u32> = doc.line_map().values().copied().collect();
        assert!(values.contains(&10));
        assert!(values.contains(&12));
        assert!(!values.contains(&500));
        // The foreign-file line itself still appears; it is just unattributed.
        assert!(doc.text().contains("movl $0, %eax"));
    }

    #[test]
    fn file_table_parses_and_resolves() {
        let raw = ".file 1 \"/tmp/other.cpp\"\n.file 3 \"src/main.cpp\"\n";
        let table = FileTable::parse(raw);
        assert_eq!(table.path_for(3), Some("src/main.cpp"));
        assert_eq!(table.path_for(9), None);
        assert_eq!(table.main_file_id(Some("main.cpp")), 3);
        assert_eq!(table.main_file_id(Some("unrelated.cpp")), 1);
        assert_eq!(table.main_file_id(None), 1);
    }

    #[test]
    fn main_file_id_resolved_by_basename() {
        let raw = ".file 1 \"/tmp/other.cpp\"\n.file 3 \"src/main.cpp\"\nmain:\n\t.loc 3 7\n\tret\n";
        let doc = clean_default(raw, Some("/home/user/main.cpp"));
        assert_eq!(doc.line_map().values().copied().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn malformed_loc_treated_as_ordinary_directive() {
        // `.loc` without a line number fails the pattern and is then dropped
        // by the directive filter like any other non-data directive.
        let doc = clean_default("main:\n\t.loc broken\n\tret\n", None);
        assert_eq!(doc.lines(), ["main:", "\tret"]);
        assert!(doc.line_map().is_empty());
    }

    #[test]
    fn underscore_stripping() {
        assert_eq!(strip_mangle_underscores("callq _foo"), "callq foo");
        assert_eq!(strip_mangle_underscores("callq __main"), "callq _main");
        assert_eq!(strip_mangle_underscores("mov snake_case, 1"), "mov snake_case, 1");
        assert_eq!(strip_mangle_underscores("_Z6binexpii:"), "Z6binexpii:");
    }

    #[test]
    fn label_marker_stripping() {
        assert_eq!(strip_label_marker("L_helper:"), "helper:");
        assert_eq!(strip_label_marker("  l_helper:"), "helper:");
        assert_eq!(strip_label_marker("Loop:"), "Loop:");
    }
}
