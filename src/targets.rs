//! Item types and their fetch targets
//!
//! Every item names one key on one of the two member-page sites. Large key
//! ranges are handed out as packs: the key is a prefix and the item covers
//! every page whose name extends it by one (36 targets) or two (1296 targets)
//! characters from `[0-9a-z]`.

use crate::error::{ItemError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix alphabet used for pack expansion, in expansion order
pub const SHARD_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Site hosting the member pages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    /// mysite.verizon.net
    Verizon,
    /// members.bellatlantic.net
    BellAtlantic,
}

impl Site {
    /// Base URL that keys are appended to
    pub fn base_url(&self) -> &'static str {
        match self {
            Site::Verizon => "http://mysite.verizon.net/",
            Site::BellAtlantic => "http://members.bellatlantic.net/",
        }
    }

    /// Host name, as used in the downloader's domain allowlist
    pub fn host(&self) -> &'static str {
        match self {
            Site::Verizon => "mysite.verizon.net",
            Site::BellAtlantic => "members.bellatlantic.net",
        }
    }

    fn page_url(&self, key: &str) -> String {
        format!("{}{}/", self.base_url(), key)
    }
}

/// How many pages one item covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shard {
    /// The key itself
    Single,
    /// Key plus one suffix character
    Pack36,
    /// Key plus two suffix characters
    Pack1296,
}

impl Shard {
    /// Number of targets an item of this width expands to
    pub fn target_count(&self) -> usize {
        match self {
            Shard::Single => 1,
            Shard::Pack36 => SHARD_ALPHABET.len(),
            Shard::Pack1296 => SHARD_ALPHABET.len() * SHARD_ALPHABET.len(),
        }
    }
}

/// Closed set of item kinds the tracker hands out
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// `verizon:<user>`
    Verizon,
    /// `bellatlantic:<user>`
    BellAtlantic,
    /// `verizon36pack:<prefix>`
    Verizon36Pack,
    /// `bellatlantic36pack:<prefix>`
    BellAtlantic36Pack,
    /// `verizon1296pack:<prefix>`
    Verizon1296Pack,
    /// `bellatlantic1296pack:<prefix>`
    BellAtlantic1296Pack,
}

impl ItemType {
    /// All item types, in declaration order
    pub const ALL: [ItemType; 6] = [
        ItemType::Verizon,
        ItemType::BellAtlantic,
        ItemType::Verizon36Pack,
        ItemType::BellAtlantic36Pack,
        ItemType::Verizon1296Pack,
        ItemType::BellAtlantic1296Pack,
    ];

    /// Tag as it appears in item names
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Verizon => "verizon",
            ItemType::BellAtlantic => "bellatlantic",
            ItemType::Verizon36Pack => "verizon36pack",
            ItemType::BellAtlantic36Pack => "bellatlantic36pack",
            ItemType::Verizon1296Pack => "verizon1296pack",
            ItemType::BellAtlantic1296Pack => "bellatlantic1296pack",
        }
    }

    /// Site this item lives on
    pub fn site(&self) -> Site {
        match self {
            ItemType::Verizon | ItemType::Verizon36Pack | ItemType::Verizon1296Pack => {
                Site::Verizon
            }
            ItemType::BellAtlantic
            | ItemType::BellAtlantic36Pack
            | ItemType::BellAtlantic1296Pack => Site::BellAtlantic,
        }
    }

    /// Width of the key range this item covers
    pub fn shard(&self) -> Shard {
        match self {
            ItemType::Verizon | ItemType::BellAtlantic => Shard::Single,
            ItemType::Verizon36Pack | ItemType::BellAtlantic36Pack => Shard::Pack36,
            ItemType::Verizon1296Pack | ItemType::BellAtlantic1296Pack => Shard::Pack1296,
        }
    }

    /// Expand `value` into the ordered list of URLs to fetch.
    ///
    /// For two-character packs the trailing character is the outer loop, so
    /// the sequence runs `<v>00, <v>10, ..., <v>z0, <v>01, <v>11, ...`.
    pub fn targets(&self, value: &str) -> Vec<String> {
        let site = self.site();
        match self.shard() {
            Shard::Single => vec![site.page_url(value)],
            Shard::Pack36 => SHARD_ALPHABET
                .iter()
                .map(|&c| site.page_url(&format!("{value}{}", c as char)))
                .collect(),
            Shard::Pack1296 => {
                let mut urls = Vec::with_capacity(Shard::Pack1296.target_count());
                for &outer in SHARD_ALPHABET {
                    for &inner in SHARD_ALPHABET {
                        urls.push(site.page_url(&format!(
                            "{value}{}{}",
                            inner as char, outer as char
                        )));
                    }
                }
                urls
            }
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ItemError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ItemType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ItemError::UnknownItemType {
                item_type: s.to_string(),
            })
    }
}

/// Expand a raw `(item_type, item_value)` pair into fetch targets.
///
/// Fails with [`ItemError::UnknownItemType`] for tags outside the known set;
/// never returns an empty list.
pub fn expand(item_type: &str, item_value: &str) -> Result<Vec<String>> {
    let kind: ItemType = item_type.parse()?;
    Ok(kind.targets(item_value))
}

/// Host allowlist covering every site
pub fn all_site_hosts() -> Vec<String> {
    [Site::Verizon, Site::BellAtlantic]
        .iter()
        .map(|s| s.host().to_string())
        .collect()
}
