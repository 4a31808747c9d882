//! Front-matter codec
//!
//! Every persisted markdown artifact uses the same convention: a YAML
//! header between `---` fences, a blank line, then the markdown body.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Render a header struct plus body into a front-matter document.
pub fn render<T: Serialize>(front: &T, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(front)?;
    // serde_yaml may or may not emit the document marker; normalize it away
    // so the fences are always ours.
    let yaml = yaml.trim_start_matches("---\n").trim_end();
    Ok(format!("---\n{}\n---\n\n{}\n", yaml, body.trim_end()))
}

/// Split a front-matter document back into its header and body.
pub fn parse<T: DeserializeOwned>(content: &str) -> Result<(T, String)> {
    let rest = content.strip_prefix("---\n").ok_or_else(|| Error::Parse {
        source_name: "front-matter".to_string(),
        message: "missing opening fence".to_string(),
    })?;

    let (yaml, body) = rest.split_once("\n---\n").ok_or_else(|| Error::Parse {
        source_name: "front-matter".to_string(),
        message: "missing closing fence".to_string(),
    })?;

    let front: T = serde_yaml::from_str(yaml)?;
    Ok((front, body.trim_start_matches('\n').to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Header {
        date: String,
        count: usize,
    }

    #[test]
    fn roundtrip() {
        let header = Header {
            date: "2026-02-08".to_string(),
            count: 3,
        };
        let doc = render(&header, "# Title\n\nBody text.").unwrap();
        assert!(doc.starts_with("---\n"));

        let (parsed, body): (Header, String) = parse(&doc).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(body, "# Title\n\nBody text.\n");
    }

    #[test]
    fn missing_fences_rejected() {
        assert!(parse::<Header>("no front matter here").is_err());
        assert!(parse::<Header>("---\ndate: x\ncount: 1").is_err());
    }
}
