use serde::{Deserialize, Serialize};

/// Partial knowledge about a representative, accumulated across lookup stages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersonRecord {
    pub name: Option<String>,
    pub party: Option<String>,
    pub constituency: Option<String>,
    pub email: Option<String>,
    pub person_id: Option<String>,
}

impl PersonRecord {
    /// Merges `other` into `self`.
    ///
    /// A field that is already present always wins; `other` only fills gaps.
    /// This is the single merge rule used by every lookup stage. Email
    /// overrides are applied separately and are the only way a present value
    /// is ever replaced.
    pub fn fill_from(&mut self, other: PersonRecord) {
        fill(&mut self.name, other.name);
        fill(&mut self.party, other.party);
        fill(&mut self.constituency, other.constituency);
        fill(&mut self.email, other.email);
        fill(&mut self.person_id, other.person_id);
    }

    /// True when the record identifies somebody, either by name or by id.
    pub fn has_identity(&self) -> bool {
        self.name.is_some() || self.person_id.is_some()
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// The canonical record returned to callers. Every field is nullable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContact {
    pub name: Option<String>,
    pub party: Option<String>,
    pub email: Option<String>,
    pub constituency: Option<String>,
    pub person_id: Option<String>,
    pub contact_url: Option<String>,
}

impl ResolvedContact {
    pub fn new(record: PersonRecord, contact_url: Option<String>) -> Self {
        ResolvedContact {
            name: record.name,
            party: record.party,
            email: record.email,
            constituency: record.constituency,
            person_id: record.person_id,
            contact_url,
        }
    }
}
