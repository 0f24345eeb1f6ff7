//! Canned assembly and report text used across suites.

#![allow(dead_code)] // not every suite touches every fixture

/// Two `.file` entries with alternating `.loc` markers; every line
/// attributed to file 2 sits inside a mangled-STL block that block
/// filtering removes.
pub const TWO_FILE_ASM: &str = r#"	.file 1 "main.cpp"
	.file 2 "/usr/include/iostream"
	.text
	.globl main
main:
	.loc 1 10
	pushq %rbp
	movq %rsp, %rbp
__ZNSt3__14coutE:
	.loc 2 500
	movl $0, %eax
	popq %rbp
main.cold:
	.loc 1 12
	ret
"#;

/// A small function with a mangled user symbol and local-label noise.
pub const MANGLED_ASM: &str = r#"	.text
__Z6binexpii:
	.loc 1 4
	movl %edi, %eax
LBB0_1:
	imull %esi, %eax
	callq __Z6binexpii
	ret
"#;

/// Three-row instruction table in the analyzer's report format.
pub const MCA_REPORT: &str = r#"Iterations:        100
Instructions:      300

Instruction Info:
[1]: #uOps
[2]: Latency

[0]: {1, 0.50, 0.50, 0.00,  - }    add edi, esi
[1]: {4, 1.00, 1.00, 0.00,  - }    imul edi, esi
[2]: {1, 0.25, 0.25, 0.00,  - }    ret

Resources:
[0]   - Zn3AGU
"#;
