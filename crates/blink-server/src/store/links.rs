use redb::ReadableTable;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::db::{decode, encode, LINKS};
use super::model::{LinkRecord, LinkStats, SECS_PER_DAY};
use crate::error::BlinkError;
use crate::ids::MAX_ALLOCATION_ATTEMPTS;
use crate::validate::{normalize_url, validate_expiry_days, validate_slug};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedLink {
    pub slug: String,
    pub original_url: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

/// True when `slug` maps to a stored link that has not expired. Expired rows
/// awaiting cleanup do not hold on to their slug.
fn slug_is_live<T>(table: &T, slug: &str, now: i64) -> Result<bool, BlinkError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    Ok(match table.get(slug)? {
        Some(guard) => !decode::<LinkRecord>(guard.value())?.is_expired(now),
        None => false,
    })
}

fn expired_slugs<T>(table: &T, now: i64) -> Result<Vec<String>, BlinkError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut expired = Vec::new();
    for item in table.iter()? {
        let (slug, bytes) = item?;
        let record: LinkRecord = decode(bytes.value())?;
        if record.is_expired(now) {
            expired.push(slug.value().to_owned());
        }
    }
    Ok(expired)
}

impl super::db::Store {
    /// Create a short link. A custom slug is checked once and rejected with
    /// [`BlinkError::SlugTaken`] if a live link holds it; otherwise a slug is
    /// drawn with the same bounded retry as snippet codes.
    pub fn create_link(
        &self,
        original_url: &str,
        custom_slug: Option<&str>,
        expiry_days: Option<u32>,
    ) -> Result<CreatedLink, BlinkError> {
        let original_url = normalize_url(original_url)?;
        validate_expiry_days(expiry_days)?;
        if let Some(slug) = custom_slug {
            validate_slug(slug)?;
        }

        let now = self.now();
        let record = LinkRecord {
            original_url,
            hit_count: 0,
            created_at: now,
            expires_at: expiry_days.map(|d| now + i64::from(d) * SECS_PER_DAY),
        };
        let bytes = encode(&record)?;

        let write_txn = self.db.begin_write()?;
        let allocated = {
            let mut table = write_txn.open_table(LINKS)?;
            match custom_slug {
                Some(slug) => {
                    if slug_is_live(&table, slug, now)? {
                        info!(slug, "audit: link.create.slug_taken");
                        return Err(BlinkError::SlugTaken);
                    }
                    table.insert(slug, bytes.as_slice())?;
                    Some(slug.to_owned())
                }
                None => {
                    let mut allocated = None;
                    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
                        let candidate = self.ids().link_slug();
                        if validate_slug(&candidate).is_err()
                            || slug_is_live(&table, &candidate, now)?
                        {
                            debug!(attempt, "generated slug rejected");
                            continue;
                        }
                        table.insert(candidate.as_str(), bytes.as_slice())?;
                        allocated = Some(candidate);
                        break;
                    }
                    allocated
                }
            }
        };

        let Some(slug) = allocated else {
            warn!(
                attempts = MAX_ALLOCATION_ATTEMPTS,
                "link slug allocation exhausted"
            );
            return Err(BlinkError::AllocationExhausted);
        };
        write_txn.commit()?;

        info!(
            slug = %slug,
            custom = custom_slug.is_some(),
            expires_at = ?record.expires_at,
            "audit: link.create"
        );
        Ok(CreatedLink {
            slug,
            original_url: record.original_url,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
    }

    /// Resolve a slug for redirection, counting the hit.
    pub fn resolve_link(&self, slug: &str) -> Result<String, BlinkError> {
        validate_slug(slug)?;
        let now = self.now();

        let write_txn = self.db.begin_write()?;
        let resolved = {
            let mut table = write_txn.open_table(LINKS)?;
            let existing = match table.get(slug)? {
                Some(guard) => Some(decode::<LinkRecord>(guard.value())?),
                None => None,
            };

            match existing {
                Some(mut record) if !record.is_expired(now) => {
                    record.hit_count = record.hit_count.saturating_add(1);
                    table.insert(slug, encode(&record)?.as_slice())?;
                    Some(record)
                }
                Some(_) => {
                    debug!(slug, "expired link requested, left for cleanup");
                    None
                }
                None => None,
            }
        };
        write_txn.commit()?;

        let record = resolved.ok_or(BlinkError::NotFound)?;
        debug!(slug, hit_count = record.hit_count, "link resolved");
        Ok(record.original_url)
    }

    /// Read-only view of a live link and its counters.
    pub fn link_stats(&self, slug: &str) -> Result<LinkStats, BlinkError> {
        validate_slug(slug)?;
        let now = self.now();

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LINKS)?;
        let record = match table.get(slug)? {
            Some(guard) => decode::<LinkRecord>(guard.value())?,
            None => return Err(BlinkError::NotFound),
        };
        if record.is_expired(now) {
            return Err(BlinkError::NotFound);
        }
        Ok(LinkStats::new(slug, &record, now))
    }

    /// Slugs of every stored link whose expiry has passed.
    pub fn scan_expired_links(&self) -> Result<Vec<String>, BlinkError> {
        let now = self.now();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LINKS)?;
        expired_slugs(&table, now)
    }

    /// Physically remove every link with `expires_at <= now`. Links without
    /// an expiry are never touched.
    pub fn cleanup_expired_links(&self) -> Result<usize, BlinkError> {
        let now = self.now();
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(LINKS)?;
            let expired = expired_slugs(&table, now)?;
            for slug in &expired {
                table.remove(slug.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;

        info!(removed, "audit: link.cleanup");
        Ok(removed)
    }

    /// Remove a link regardless of expiry.
    pub fn delete_link(&self, slug: &str) -> Result<(), BlinkError> {
        validate_slug(slug)?;
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(LINKS)?;
            let existed = table.remove(slug)?.is_some();
            existed
        };
        write_txn.commit()?;

        if existed {
            info!(slug, "audit: link.delete");
            Ok(())
        } else {
            info!(slug, "audit: link.delete.not_found");
            Err(BlinkError::NotFound)
        }
    }
}
