//! The composed output and its serialization.

use anyhow::Result;

use crate::provenance::ProvenanceHeader;

/// Blank lines between top-level blocks.
const BLOCK_SEPARATION: usize = 2;

/// One inlined fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSection {
    pub header: ProvenanceHeader,
    /// Rewritten fragment body
    pub body: String,
}

/// A fully composed artifact, held in memory until it is written whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedArtifact {
    /// First comment line, without the `# ` prefix
    pub banner: Option<String>,
    /// Hoisted native and host imports, one statement per entry
    pub imports: Vec<String>,
    /// Inlined fragments, dependencies first
    pub sections: Vec<RenderedSection>,
    /// Rewritten template body
    pub template: String,
}

impl RenderedArtifact {
    /// Headers of every inlined fragment, in output order.
    pub fn headers(&self) -> impl Iterator<Item = &ProvenanceHeader> {
        self.sections.iter().map(|s| &s.header)
    }

    /// Serialize to source text.
    ///
    /// Blocks are separated by two blank lines and the text ends with a single newline.
    /// Fails only if a header cannot be encoded.
    pub fn to_source(&self) -> Result<String> {
        let mut blocks: Vec<String> = Vec::new();

        if let Some(banner) = &self.banner {
            blocks.push(format!("# {banner}\n"));
        }
        if !self.imports.is_empty() {
            blocks.push(format!("{}\n", self.imports.join("\n")));
        }
        for section in &self.sections {
            let body = trim_blank_edges(&section.body);
            let header = section.header.encode()?;
            if body.is_empty() {
                blocks.push(header);
            } else {
                blocks.push(format!("{header}{body}"));
            }
        }
        let template = trim_blank_edges(&self.template);
        if !template.is_empty() {
            blocks.push(template);
        }

        let separator = "\n".repeat(BLOCK_SEPARATION);
        let mut source = blocks.join(&separator);
        if source.is_empty() {
            return Ok(source);
        }
        if !source.ends_with('\n') {
            source.push('\n');
        }
        Ok(source)
    }
}

/// Drop blank lines before the first and after the last non-blank line.
///
/// Interior lines are kept byte for byte: they may sit inside a multi-line string.
fn trim_blank_edges(body: &str) -> String {
    let lines: Vec<&str> = body.split_inclusive('\n').collect();
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let last = lines.iter().rposition(|l| !l.trim().is_empty()).unwrap_or(first);
    let mut out = lines[first..=last].concat();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::ChecksumAlgorithm;

    #[test]
    fn test_trim_blank_edges() {
        assert_eq!(trim_blank_edges("\n\nA = 1\n\n\n\n\nB = 2\n\n"), "A = 1\n\n\n\n\nB = 2\n");
        assert_eq!(trim_blank_edges("\n  \n"), "");
        assert_eq!(trim_blank_edges("X = 1"), "X = 1\n");
    }

    #[test]
    fn test_string_contents_are_not_touched() {
        let body = "\nDOC = \"\"\"a\n\n\n\nb\n   \nc\"\"\"\n\n";
        assert_eq!(trim_blank_edges(body), "DOC = \"\"\"a\n\n\n\nb\n   \nc\"\"\"\n");
    }

    #[test]
    fn test_to_source_layout() {
        let artifact = RenderedArtifact {
            banner: Some("Code auto-generated by weave".to_string()),
            imports: vec!["from decimal import Decimal".to_string()],
            sections: vec![RenderedSection {
                header: ProvenanceHeader::new(
                    "lib/util.py",
                    ChecksumAlgorithm::Sha256.digest(b"X = 1\n"),
                    None,
                ),
                body: "\nutil_X = 1\n".to_string(),
            }],
            template: "Y = util_X\n".to_string(),
        };
        let source = artifact.to_source().unwrap();
        let digest = ChecksumAlgorithm::Sha256.digest(b"X = 1\n");
        assert_eq!(
            source,
            format!(
                "# Code auto-generated by weave\n\n\nfrom decimal import Decimal\n\n\n\
                 # Objects below have been imported from: lib/util.py\n# {digest}\nutil_X = 1\n\n\n\
                 Y = util_X\n"
            )
        );
        assert_eq!(artifact.headers().count(), 1);
    }

    #[test]
    fn test_empty_artifact() {
        assert_eq!(RenderedArtifact::default().to_source().unwrap(), "");
    }
}
