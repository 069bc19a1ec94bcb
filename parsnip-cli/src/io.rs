//! Dataset loading and Newick rendering.
//!
//! Two input layouts are accepted: FASTA (`>name` header lines followed by
//! sequence lines) and a whitespace-delimited layout with one `name sequence`
//! pair per line. The reported trees render as Newick, one tree per line,
//! with edge lengths in substitution counts.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use parsnip_core::search::{Dataset, ExportNode};

/// Errors raised while loading alignments.
#[derive(Debug, Error)]
pub enum IoError {
    /// File I/O failed while loading an input source.
    #[error("failed to read `{path}`: {source}")]
    Read {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// A non-FASTA line did not split into a name and a sequence.
    #[error("`{path}` line {line}: expected `name sequence`")]
    MalformedLine {
        /// Offending input file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
    },
    /// A FASTA header was not followed by any sequence data.
    #[error("`{path}`: taxon `{taxon}` has no sequence data")]
    EmptySequence {
        /// Offending input file.
        path: PathBuf,
        /// Header without a body.
        taxon: String,
    },
}

/// Loads one alignment file as a dataset named after the file stem.
///
/// # Errors
/// Returns [`IoError`] when the file cannot be read or a line cannot be
/// parsed; sequence-level validation is left to the search.
pub fn read_dataset(path: &Path) -> Result<Dataset, IoError> {
    let content = fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .map_or_else(|| "dataset".to_owned(), |s| s.to_string_lossy().into_owned());
    let taxa = if content.trim_start().starts_with('>') {
        parse_fasta(path, &content)?
    } else {
        parse_tabular(path, &content)?
    };
    Ok(Dataset { name, taxa })
}

fn parse_fasta(path: &Path, content: &str) -> Result<Vec<(String, Vec<u8>)>, IoError> {
    let mut taxa: Vec<(String, Vec<u8>)> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            taxa.push((header.trim().to_owned(), Vec::new()));
        } else if let Some((_, seq)) = taxa.last_mut() {
            seq.extend(line.bytes().filter(|b| !b.is_ascii_whitespace()));
        }
    }
    for (taxon, seq) in &taxa {
        if seq.is_empty() {
            return Err(IoError::EmptySequence {
                path: path.to_path_buf(),
                taxon: taxon.clone(),
            });
        }
    }
    Ok(taxa)
}

fn parse_tabular(path: &Path, content: &str) -> Result<Vec<(String, Vec<u8>)>, IoError> {
    let mut taxa = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(name), Some(seq), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(IoError::MalformedLine {
                path: path.to_path_buf(),
                line: idx + 1,
            });
        };
        taxa.push((name.to_owned(), seq.bytes().collect()));
    }
    Ok(taxa)
}

/// Renders a tree as a Newick string, without the trailing semicolon.
#[must_use]
pub fn render_newick(node: &ExportNode) -> String {
    let mut out = String::new();
    render_into(node, &mut out);
    out
}

fn render_into(node: &ExportNode, out: &mut String) {
    if !node.children.is_empty() {
        out.push('(');
        for (i, child) in node.children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            render_into(child, out);
        }
        out.push(')');
    }
    // Whitespace in a label would split the Newick token.
    for ch in node.name.chars() {
        out.push(if ch.is_whitespace() { '_' } else { ch });
    }
    let _ = write!(out, ":{}", node.length);
}

/// Writes one tree as a Newick line.
///
/// # Errors
/// Propagates write failures.
pub fn write_newick<W: Write>(writer: &mut W, tree: &ExportNode) -> io::Result<()> {
    writeln!(writer, "{};", render_newick(tree))
}
