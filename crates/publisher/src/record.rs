//! Wire shapes for `app.bsky.feed.post` records.

use serde::Serialize;

use crate::models::{LinkCard, LinkFacet, RenderedPost};

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const LINK_FEATURE_TYPE: &str = "app.bsky.richtext.facet#link";
pub const EXTERNAL_EMBED_TYPE: &str = "app.bsky.embed.external";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub text: String,
    pub created_at: String,
    #[serde(rename = "$type")]
    pub record_type: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<ExternalEmbed>,
}

impl PostRecord {
    /// Builds the record for `post`. The card is embedded only when the text
    /// carries a link facet.
    pub fn new(post: &RenderedPost, card: Option<&LinkCard>, created_at: String) -> Self {
        let facets: Vec<Facet> = post.facets.iter().map(Facet::from).collect();
        let embed = if facets.is_empty() {
            None
        } else {
            card.map(ExternalEmbed::from)
        };

        Self {
            text: post.text.clone(),
            created_at,
            record_type: POST_COLLECTION,
            facets,
            embed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<LinkFeature>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkFeature {
    #[serde(rename = "$type")]
    pub feature_type: &'static str,
    pub uri: String,
}

impl From<&LinkFacet> for Facet {
    fn from(facet: &LinkFacet) -> Self {
        Self {
            index: ByteSlice {
                byte_start: facet.byte_start,
                byte_end: facet.byte_end,
            },
            features: vec![LinkFeature {
                feature_type: LINK_FEATURE_TYPE,
                uri: facet.target.clone(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExternalEmbed {
    #[serde(rename = "$type")]
    pub embed_type: &'static str,
    pub external: External,
}

#[derive(Debug, Clone, Serialize)]
pub struct External {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<serde_json::Value>,
}

impl From<&LinkCard> for ExternalEmbed {
    fn from(card: &LinkCard) -> Self {
        Self {
            embed_type: EXTERNAL_EMBED_TYPE,
            external: External {
                uri: card.source_url.clone(),
                title: card.title.clone(),
                description: card.description.clone(),
                thumb: card.thumbnail.as_ref().map(|blob| blob.blob_ref.clone()),
            },
        }
    }
}
