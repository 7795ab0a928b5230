// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Declarative table of output formats and how to find their generator classes.

use regbridge_config::GenerationOptions;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputFormat {
    Vhdl,
    CHeader,
    Markdown,
    /// Contributes files only; it has no canonical text slot.
    AsciiDoc,
}

impl OutputFormat {
    /// Manual generation order.
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Vhdl,
        OutputFormat::CHeader,
        OutputFormat::Markdown,
        OutputFormat::AsciiDoc,
    ];

    pub fn entry(self) -> &'static FormatEntry {
        match self {
            OutputFormat::Vhdl => &REGISTRY[0],
            OutputFormat::CHeader => &REGISTRY[1],
            OutputFormat::Markdown => &REGISTRY[2],
            OutputFormat::AsciiDoc => &REGISTRY[3],
        }
    }

    pub fn enabled(self, options: &GenerationOptions) -> bool {
        match self {
            OutputFormat::Vhdl => options.vhdl,
            OutputFormat::CHeader => options.c,
            OutputFormat::Markdown | OutputFormat::AsciiDoc => options.docs,
        }
    }

    /// Text returned in place of a canonical output that was not produced.
    pub fn placeholder(self) -> Option<&'static str> {
        match self {
            OutputFormat::Vhdl => Some("No VHDL output generated."),
            OutputFormat::CHeader => Some("No C header output generated."),
            OutputFormat::Markdown => Some("No documentation output generated."),
            OutputFormat::AsciiDoc => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutputFormat::Vhdl => "VHDL",
            OutputFormat::CHeader => "C header",
            OutputFormat::Markdown => "Markdown",
            OutputFormat::AsciiDoc => "AsciiDoc",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub struct FormatEntry {
    pub format: OutputFormat,
    /// Accepted class names, best first.
    pub exact_names: &'static [&'static str],
    /// Case-insensitive substring used when no exact name exists.
    pub needle: &'static str,
    /// Where the generator is asked to write, relative to the scratch root.
    pub output_path: &'static str,
    /// Paths checked, in order, when reading the canonical text back.
    pub readback: &'static [&'static str],
}

pub static REGISTRY: [FormatEntry; 4] = [
    FormatEntry {
        format: OutputFormat::Vhdl,
        exact_names: &["Vhdl", "VhdlGenerator", "VHDL"],
        needle: "vhdl",
        output_path: "hw/regs.vhd",
        readback: &["hw/regs.vhd", "regs.vhd", "hw/regs.vhdl"],
    },
    FormatEntry {
        format: OutputFormat::CHeader,
        exact_names: &["CHeader", "CHeaderGenerator", "Cheader"],
        needle: "header",
        output_path: "sw/regs.h",
        readback: &["sw/regs.h", "regs.h", "sw/csr.h"],
    },
    FormatEntry {
        format: OutputFormat::Markdown,
        exact_names: &["Markdown", "MarkdownGenerator"],
        needle: "markdown",
        output_path: "doc/regs.md",
        readback: &["doc/regs.md", "regs.md", "docs/regs.md"],
    },
    FormatEntry {
        format: OutputFormat::AsciiDoc,
        exact_names: &["Asciidoc", "AsciiDoc", "AsciidocGenerator"],
        needle: "asciidoc",
        output_path: "doc/regs.adoc",
        readback: &[],
    },
];

/// Whether `name` could be selected for any format. Used to skip probing unrelated names.
pub fn is_candidate_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    REGISTRY
        .iter()
        .any(|e| e.exact_names.iter().any(|n| *n == name) || lower.contains(e.needle))
}

/// A public name found in the generators namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCandidate {
    pub name: String,
    pub is_class: bool,
    /// Subclass of the library's common generator base.
    pub is_generator: bool,
}

/// Picks the generator class for `entry`.
///
/// Exact names win in table order. Otherwise the first class whose name contains the
/// needle is chosen, preferring recognized generator subclasses.
pub fn select_generator<'a>(
    entry: &FormatEntry,
    candidates: &'a [ClassCandidate],
) -> Option<&'a ClassCandidate> {
    for exact in entry.exact_names {
        if let Some(found) = candidates.iter().find(|c| c.is_class && c.name == *exact) {
            return Some(found);
        }
    }

    let mut fuzzy = candidates
        .iter()
        .filter(|c| c.is_class && c.name.to_lowercase().contains(entry.needle));
    let first = fuzzy.clone().next();
    fuzzy.find(|c| c.is_generator).or(first)
}
