//! Which messages have already been fetched.

use std::collections::{BTreeMap, BTreeSet};

use errors::*;

/// Split one UIDL listing line into its message number and unique id.
///
/// The line must consist of exactly two space-separated fields; anything
/// else is a `MalformedListing`.
pub fn parse_listing_line(line: &str) -> Result<(String, u32)> {
    let malformed = || Error::from(ErrorKind::MalformedListing(line.to_string()));
    let mut fields = line.splitn(2, ' ');
    let msg_no = fields.next().ok_or_else(&malformed)?;
    let uid = fields.next().ok_or_else(&malformed)?;
    if uid.is_empty() || uid.contains(' ') {
        return Err(malformed());
    }
    let msg_no = msg_no.parse::<u32>().map_err(|_| malformed())?;
    Ok((uid.to_string(), msg_no))
}

/// Parse a complete UIDL response into uid → message number.
///
/// One bad line fails the whole listing; no partial results.
pub fn parse_listing(lines: &[String]) -> Result<BTreeMap<String, u32>> {
    lines.iter().map(|line| parse_listing_line(line)).collect()
}

/// The set of unique ids whose messages have already been retrieved.
///
/// The set only ever grows; ids are added after a retrieval batch
/// completes. Callers wanting persistence across process runs serialize
/// [`seen`](UidTracker::seen) themselves and seed the next tracker with it.
/// Removal means rebuilding the tracker externally.
#[derive(Clone, Debug, Default)]
pub struct UidTracker {
    seen: BTreeSet<String>,
}

impl UidTracker {
    pub fn new() -> UidTracker {
        UidTracker::default()
    }

    /// A tracker pre-seeded with previously persisted ids.
    pub fn with_seen<I>(seen: I) -> UidTracker
    where
        I: IntoIterator<Item = String>,
    {
        UidTracker {
            seen: seen.into_iter().collect(),
        }
    }

    pub fn seen(&self) -> &BTreeSet<String> {
        &self.seen
    }

    pub fn is_seen(&self, uid: &str) -> bool {
        self.seen.contains(uid)
    }

    /// Union freshly retrieved ids into the set. Idempotent.
    pub fn record<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.seen.extend(ids);
    }

    /// Restrict a full uid listing to the ids not yet retrieved.
    pub fn filter_new(&self, all: BTreeMap<String, u32>) -> BTreeMap<String, u32> {
        all.into_iter()
            .filter(|&(ref uid, _)| !self.seen.contains(uid))
            .collect()
    }
}
