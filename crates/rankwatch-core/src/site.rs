//! Sites and their tracked keywords

use serde::{Deserialize, Serialize};

pub type SiteId = i64;
pub type KeywordId = i64;

/// A tracked website
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    /// Bare domain the rank lookups search for (e.g. `example.com`)
    pub domain: String,
    pub name: String,
}

impl Site {
    pub fn new(id: SiteId, domain: &str) -> Self {
        Self {
            id,
            domain: domain.to_string(),
            name: domain.to_string(),
        }
    }
}

/// A search phrase tracked for a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: KeywordId,
    pub site_id: SiteId,
    pub phrase: String,
    /// Region qualifier used by frequency lookups
    pub region: Option<i64>,
}

impl Keyword {
    pub fn new(id: KeywordId, site_id: SiteId, phrase: &str) -> Self {
        Self {
            id,
            site_id,
            phrase: phrase.to_string(),
            region: None,
        }
    }
}
