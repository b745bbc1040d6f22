//! Cache keys derived from an operation and its normalized arguments.

use std::collections::BTreeMap;
use std::fmt;

/// Kinds of cached operation. Each kind carries its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    IllustDetail,
    UserDetail,
    Ranking,
    SearchIllust,
    SearchUser,
    UserIllusts,
    UserBookmarks,
    RelatedIllusts,
    RecommendedIllusts,
    Download,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IllustDetail => "illust_detail",
            Self::UserDetail => "user_detail",
            Self::Ranking => "ranking",
            Self::SearchIllust => "search_illust",
            Self::SearchUser => "search_user",
            Self::UserIllusts => "user_illusts",
            Self::UserBookmarks => "user_bookmarks",
            Self::RelatedIllusts => "related_illusts",
            Self::RecommendedIllusts => "recommended_illusts",
            Self::Download => "download",
        }
    }
}

/// Deterministic, order-independent cache key.
///
/// Parameters are kept sorted by name, so the order in which they were
/// added never changes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    kind: OperationKind,
    params: BTreeMap<&'static str, String>,
}

impl Fingerprint {
    #[must_use]
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter. String values are trimmed and lowercased.
    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params
            .insert(name, value.to_string().trim().to_lowercase());
        self
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.as_str())?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}
