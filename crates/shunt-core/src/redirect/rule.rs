use shunt_config::{MatchKind, RuleConfig};

/// How a rule's pattern is compared with the path passed to `open`.
///
/// Comparison is byte-wise on the path exactly as the caller spelled it; no
/// normalisation or canonicalisation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    Exact,
    Prefix,
    Suffix,
}

impl From<MatchKind> for PathMatch {
    fn from(kind: MatchKind) -> Self {
        match kind {
            MatchKind::Exact => PathMatch::Exact,
            MatchKind::Prefix => PathMatch::Prefix,
            MatchKind::Suffix => PathMatch::Suffix,
        }
    }
}

/// Bytes served in place of a redirected file's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticContent {
    Literal(Box<[u8]>),
    /// `size` copies of `byte`, generated on read.
    Fill { byte: u8, size: usize },
}

impl SyntheticContent {
    pub fn len(&self) -> usize {
        match self {
            SyntheticContent::Literal(bytes) => bytes.len(),
            SyntheticContent::Fill { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy bytes starting at `offset` into `out`; returns how many were copied.
    pub fn copy_to(&self, offset: usize, out: &mut [u8]) -> usize {
        if offset >= self.len() {
            return 0;
        }
        let n = (self.len() - offset).min(out.len());
        match self {
            SyntheticContent::Literal(bytes) => out[..n].copy_from_slice(&bytes[offset..offset + n]),
            SyntheticContent::Fill { byte, .. } => out[..n].fill(*byte),
        }
        n
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    pattern: Box<[u8]>,
    matching: PathMatch,
    content: SyntheticContent,
}

impl RedirectRule {
    pub fn new(pattern: impl Into<Vec<u8>>, matching: PathMatch, content: SyntheticContent) -> Self {
        Self {
            pattern: pattern.into().into_boxed_slice(),
            matching,
            content,
        }
    }

    pub fn exact(path: &str, content: &str) -> Self {
        Self::new(
            path,
            PathMatch::Exact,
            SyntheticContent::Literal(content.as_bytes().into()),
        )
    }

    /// Build from a validated config entry.
    pub fn from_config(rule: &RuleConfig) -> Self {
        let content = match (&rule.content, rule.size) {
            (Some(text), _) => SyntheticContent::Literal(text.as_bytes().into()),
            (None, size) => SyntheticContent::Fill {
                byte: rule.fill.map_or(0, |c| c as u8),
                size: size.unwrap_or(0),
            },
        };
        Self::new(rule.path.as_str(), rule.matching.into(), content)
    }

    pub fn matches(&self, path: &[u8]) -> bool {
        match self.matching {
            PathMatch::Exact => path == &*self.pattern,
            PathMatch::Prefix => path.starts_with(&self.pattern),
            PathMatch::Suffix => path.ends_with(&self.pattern),
        }
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn content(&self) -> &SyntheticContent {
        &self.content
    }
}

/// Index of the first rule matching `path`.
pub fn first_match(rules: &[RedirectRule], path: &[u8]) -> Option<usize> {
    rules.iter().position(|rule| rule.matches(path))
}
