use crate::errors::ResolveError;
use crate::legislative::{LegislativeData, UpstreamError};
use crate::metrics_defs::{FALLBACK_FAILED, FALLBACK_INVOKED, OVERRIDE_APPLIED};
use crate::overrides::{OverrideCache, OverrideEntry, OverrideSnapshot};
use crate::types::{PersonRecord, ResolvedContact};
use shared::counter;
use std::sync::Arc;
use url::Url;

/// Optional lookups attempted after the primary postcode lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FallbackStage {
    Person,
    Constituency,
}

impl FallbackStage {
    fn as_str(&self) -> &'static str {
        match self {
            FallbackStage::Person => "person",
            FallbackStage::Constituency => "constituency",
        }
    }
}

/// Resolves a postcode to a single contact record.
///
/// The stages run strictly in order since each one depends on what the
/// previous ones found:
///
/// 1. postcode lookup (mandatory; no identity means not found)
/// 2. person lookup, when name or email is missing and the person id is known
/// 3. constituency lookup, when the name is still missing
/// 4. curated email override
/// 5. profile URL derived from the person id
///
/// Stages 2 and 3 are best effort. Their failures are logged and skipped.
pub struct ResolutionPipeline {
    client: Arc<dyn LegislativeData>,
    overrides: Arc<OverrideCache>,
    profile_base_url: Url,
}

impl ResolutionPipeline {
    pub fn new(
        client: Arc<dyn LegislativeData>,
        overrides: Arc<OverrideCache>,
        profile_base_url: Url,
    ) -> Self {
        ResolutionPipeline {
            client,
            overrides,
            profile_base_url,
        }
    }

    pub async fn resolve(&self, postcode: &str) -> Result<ResolvedContact, ResolveError> {
        let mut record = self.primary_lookup(postcode).await?;

        if (record.name.is_none() || record.email.is_none())
            && let Some(person_id) = record.person_id.clone()
        {
            let result = self.client.lookup_by_person_id(&person_id).await;
            merge_fallback(&mut record, FallbackStage::Person, result);
        }

        if record.name.is_none()
            && let Some(constituency) = record.constituency.clone()
        {
            let result = self.client.lookup_by_constituency(&constituency).await;
            merge_fallback(&mut record, FallbackStage::Constituency, result);
        }

        let snapshot = self.overrides.get().await;
        apply_override(&mut record, &snapshot);

        let contact_url = record.person_id.as_deref().map(|id| self.contact_url(id));

        Ok(ResolvedContact::new(record, contact_url))
    }

    async fn primary_lookup(&self, postcode: &str) -> Result<PersonRecord, ResolveError> {
        let record = match self.client.lookup_by_postcode(postcode).await {
            Ok(record) => record,
            Err(UpstreamError::NoMatch(message)) => {
                tracing::debug!(message = %message, "upstream reported no match for postcode");
                return Err(ResolveError::NotFound);
            }
            Err(e) => {
                tracing::warn!(error = %e, "postcode lookup failed");
                return Err(ResolveError::Upstream(e));
            }
        };

        if !record.has_identity() {
            return Err(ResolveError::NotFound);
        }

        Ok(record)
    }

    fn contact_url(&self, person_id: &str) -> String {
        let mut url = self.profile_base_url.clone();
        url.query_pairs_mut().clear().append_pair("p", person_id);
        url.into()
    }
}

fn merge_fallback(
    record: &mut PersonRecord,
    stage: FallbackStage,
    result: Result<PersonRecord, UpstreamError>,
) {
    counter!(FALLBACK_INVOKED, "stage" => stage.as_str()).increment(1);

    match result {
        Ok(found) => record.fill_from(found),
        Err(e) => {
            counter!(FALLBACK_FAILED, "stage" => stage.as_str()).increment(1);
            tracing::warn!(
                stage = stage.as_str(),
                error = %e,
                "fallback lookup failed, continuing with partial data"
            );
        }
    }
}

/// Applies the curated override to the email.
///
/// A constituency entry always wins, including an explicit "no email". A
/// name entry is only consulted when there is no constituency entry and the
/// email is still missing.
fn apply_override(record: &mut PersonRecord, snapshot: &OverrideSnapshot) {
    let by_constituency = record
        .constituency
        .as_deref()
        .and_then(|constituency| snapshot.for_constituency(constituency));

    let (key, entry) = match by_constituency {
        Some(entry) => ("constituency", entry),
        None if record.email.is_none() => {
            match record.name.as_deref().and_then(|name| snapshot.for_name(name)) {
                Some(entry) => ("name", entry),
                None => return,
            }
        }
        None => return,
    };

    counter!(OVERRIDE_APPLIED, "key" => key).increment(1);
    record.email = entry.email().map(str::to_string);
    if matches!(entry, OverrideEntry::NoEmail) {
        tracing::debug!(key, "override suppressed email");
    }
}
