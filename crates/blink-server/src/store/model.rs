use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Seconds a snippet stays readable after creation.
pub const SNIPPET_TTL_SECS: i64 = 10 * 60;

pub const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Stored in redb as bincode-encoded bytes. Only the body is encrypted; the
/// lifecycle fields stay plaintext so the sweep can evict without the key.
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SnippetRecord {
    pub content_encrypted: Vec<u8>,
    pub nonce: [u8; 12],
    pub is_one_time: bool,
    pub max_views: Option<u32>,
    pub view_count: u32,
    pub created_at: i64,
    pub expires_at: i64,
}

/// What a successful read does to the stored snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    /// Counter bumped; the record stays.
    Keep,
    /// This was the last permitted read; the record must be removed.
    Burn,
}

impl SnippetRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// True when a prior read already consumed the last permitted view.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_views, Some(max) if self.view_count >= max)
    }

    pub fn is_live(&self, now: i64) -> bool {
        !self.is_expired(now) && !self.is_exhausted()
    }

    /// Count one successful read. One-time snippets burn unconditionally;
    /// capped snippets burn on the read that reaches the cap, and that
    /// reader still receives the content.
    pub fn register_view(&mut self) -> ViewOutcome {
        self.view_count = self.view_count.saturating_add(1);
        if self.is_one_time || self.is_exhausted() {
            ViewOutcome::Burn
        } else {
            ViewOutcome::Keep
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub original_url: String,
    pub hit_count: u64,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl LinkRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }
}

// ── Views returned to callers ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSnippet {
    pub code: String,
    pub expires_at: i64,
}

/// A served snippet, with the post-increment view count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetView {
    pub content: String,
    pub view_count: u32,
    pub is_one_time: bool,
    pub max_views: Option<u32>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStats {
    pub original_url: String,
    pub slug: String,
    pub hit_count: u64,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub is_expired: bool,
}

impl LinkStats {
    pub fn new(slug: &str, record: &LinkRecord, now: i64) -> Self {
        Self {
            original_url: record.original_url.clone(),
            slug: slug.to_owned(),
            hit_count: record.hit_count,
            created_at: record.created_at,
            expires_at: record.expires_at,
            is_expired: record.is_expired(now),
        }
    }
}

/// Admin listing row for a snippet. Carries the full body; display
/// truncation is left to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetSummary {
    pub code: String,
    pub content: String,
    pub is_one_time: bool,
    pub max_views: Option<u32>,
    pub view_count: u32,
    pub created_at: i64,
    pub expires_at: i64,
    pub is_expired: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub snippets: u64,
    pub links: u64,
    pub total_hits: u64,
    /// Links past expiry that are still stored, awaiting cleanup.
    pub expired_links: u64,
}
