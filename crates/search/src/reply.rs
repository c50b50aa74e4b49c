//! Oracle reply parsing.
//!
//! A reply is usable only if the name, description and source markers of the
//! [`OutputContract`] appear in that order, each followed by non-empty
//! content, with the source in a fenced block. Anything else is reported as
//! [`ParsedReply::Malformed`]; parsing never fails with an error.

use crate::prompt::OutputContract;
use cacheforge_evaluator::Candidate;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    Parsed(Candidate),
    Malformed { reason: String },
}

impl ParsedReply {
    fn malformed(reason: impl Into<String>) -> Self {
        ParsedReply::Malformed {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplyParser {
    name: Regex,
    description: Regex,
    source: Regex,
    fence: Regex,
    contract: OutputContract,
}

impl ReplyParser {
    pub fn new(contract: OutputContract) -> Result<Self, regex::Error> {
        let fence = RegexBuilder::new(&format!(
            r"```[ \t]*{}[^\n]*\r?\n(.*?)```",
            regex::escape(contract.fence_language)
        ))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()?;

        Ok(Self {
            name: marker(contract.name_marker)?,
            description: marker(contract.description_marker)?,
            source: marker(contract.source_marker)?,
            fence,
            contract,
        })
    }

    pub fn parse(&self, reply: &str) -> ParsedReply {
        let reply = reply.replace("\r\n", "\n");
        let reply = reply.as_str();
        let Some(name_at) = self.name.find(reply) else {
            return ParsedReply::malformed(format!("missing '{}'", self.contract.name_marker));
        };
        let Some(desc_at) = self.description.find_at(reply, name_at.end()) else {
            return ParsedReply::malformed(format!(
                "missing '{}' after the name",
                self.contract.description_marker
            ));
        };
        let Some(source_at) = self.source.find_at(reply, desc_at.end()) else {
            return ParsedReply::malformed(format!(
                "missing '{}' after the description",
                self.contract.source_marker
            ));
        };

        let name = reply[name_at.end()..desc_at.start()]
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        if name.is_empty() {
            return ParsedReply::malformed("empty policy name");
        }

        let description = reply[desc_at.end()..source_at.start()].trim();
        if description.is_empty() {
            return ParsedReply::malformed("empty policy description");
        }

        let Some(caps) = self.fence.captures(&reply[source_at.end()..]) else {
            return ParsedReply::malformed(format!(
                "no closed ```{} block after '{}'",
                self.contract.fence_language, self.contract.source_marker
            ));
        };
        let source = caps[1].trim();
        if source.is_empty() {
            return ParsedReply::malformed("empty source block");
        }

        ParsedReply::Parsed(Candidate::new(name, description, format!("{source}\n")))
    }
}

/// A marker such as `## Policy Name` on its own line, case-insensitive and
/// tolerant of spacing between its words.
fn marker(text: &str) -> Result<Regex, regex::Error> {
    let words: Vec<String> = text.split_whitespace().map(regex::escape).collect();
    RegexBuilder::new(&format!(r"^[ \t]*{}[ \t]*:?[ \t]*\r?$", words.join(r"[ \t]*")))
        .case_insensitive(true)
        .multi_line(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ReplyParser {
        ReplyParser::new(OutputContract::default()).unwrap()
    }

    const WELL_FORMED: &str = "Some preamble with ideas.\n\n\
        ## Policy Name\nSignature-Aware RRIP\n\n\
        ## Policy Description\nTracks PC signatures to predict reuse.\nBypasses streaming blocks.\n\n\
        ## C++ Implementation\n```cpp\n#include <vector>\nvoid InitReplacementState() {}\n```\n\nTrailing notes.";

    #[test]
    fn test_well_formed_reply() {
        match parser().parse(WELL_FORMED) {
            ParsedReply::Parsed(candidate) => {
                assert_eq!(candidate.name, "Signature-Aware RRIP");
                assert_eq!(
                    candidate.description,
                    "Tracks PC signatures to predict reuse.\nBypasses streaming blocks."
                );
                assert_eq!(
                    candidate.source,
                    "#include <vector>\nvoid InitReplacementState() {}\n"
                );
            }
            other => panic!("expected a parsed reply, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_description_is_malformed() {
        let reply = WELL_FORMED.replace("## Policy Description", "Description follows");
        match parser().parse(&reply) {
            ParsedReply::Malformed { reason } => assert!(reason.contains("Policy Description")),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_markers_out_of_order_are_malformed() {
        let reply = "## Policy Description\nd\n## Policy Name\nn\n## C++ Implementation\n```cpp\nx\n```";
        assert!(matches!(parser().parse(reply), ParsedReply::Malformed { .. }));
    }

    #[test]
    fn test_unterminated_fence_is_malformed() {
        let reply = "## Policy Name\nn\n## Policy Description\nd\n## C++ Implementation\n```cpp\nint x;";
        assert!(matches!(parser().parse(reply), ParsedReply::Malformed { .. }));
    }

    #[test]
    fn test_marker_matching_is_lenient_on_case_and_spacing() {
        let reply = "##policy name\nLFU-ish\n##  POLICY  DESCRIPTION:\ncounts\n## c++ implementation\n```CPP\nint f;\n```";
        match parser().parse(reply) {
            ParsedReply::Parsed(c) => {
                assert_eq!(c.name, "LFU-ish");
                assert_eq!(c.description, "counts");
                assert_eq!(c.source, "int f;\n");
            }
            other => panic!("expected a parsed reply, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_name_is_malformed() {
        let reply = "## Policy Name\n\n## Policy Description\nd\n## C++ Implementation\n```cpp\nx\n```";
        assert_eq!(
            parser().parse(reply),
            ParsedReply::Malformed {
                reason: "empty policy name".into()
            }
        );
    }

    #[test]
    fn test_crlf_reply_parses_like_lf() {
        let crlf = WELL_FORMED.replace('\n', "\r\n");
        assert_eq!(parser().parse(&crlf), parser().parse(WELL_FORMED));
        assert!(matches!(parser().parse(&crlf), ParsedReply::Parsed(_)));
    }

    #[test]
    fn test_crlf_markers_match_without_normalizing() {
        let contract = OutputContract::default();
        let name = marker(contract.name_marker).unwrap();
        assert!(name.is_match("intro\r\n## Policy Name:\r\nLRU\r\n"));
    }

    #[test]
    fn test_marker_inside_prose_does_not_count() {
        let reply = "The ## Policy Name section follows.\nno markers here";
        assert!(matches!(parser().parse(reply), ParsedReply::Malformed { .. }));
    }
}
