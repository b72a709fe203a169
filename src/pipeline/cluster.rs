//! Bounded-size comparison groups
//!
//! Entities are grouped by primary tag and sliced into chunks of at most
//! `max_size`. Each chunk gets a short content-derived id, which is how
//! later runs recognise clusters they have already sent to inference.

use super::{PipelineError, PipelineResult};
use crate::graph::Entity;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Bucket for entities without a tag
pub const UNKNOWN_TAG: &str = "unknown";

/// Hex characters kept from the digest
const CLUSTER_ID_LEN: usize = 12;

/// Digest of the sorted, `|`-joined member ids
pub fn cluster_id<S: AsRef<str>>(member_ids: &[S]) -> String {
    let mut ids: Vec<&str> = member_ids.iter().map(AsRef::as_ref).collect();
    ids.sort_unstable();
    let digest = Sha256::digest(ids.join("|").as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(CLUSTER_ID_LEN);
    id
}

/// One unit of discovery work
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    id: String,
    tag: String,
    members: Vec<Entity>,
}

impl Cluster {
    pub fn new(tag: impl Into<String>, members: Vec<Entity>) -> Self {
        let id = cluster_id(&members.iter().map(|e| e.id.as_str()).collect::<Vec<_>>());
        Self {
            id,
            tag: tag.into(),
            members,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Primary tag shared by every member
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn members(&self) -> &[Entity] {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.members.iter().any(|e| e.id == entity_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Partitions an entity set into clusters
#[derive(Debug, Clone, Copy)]
pub struct Clusterer {
    max_size: usize,
}

impl Clusterer {
    pub const DEFAULT_MAX_SIZE: usize = 50;

    pub fn new(max_size: usize) -> PipelineResult<Self> {
        if max_size == 0 {
            return Err(PipelineError::InvalidArgument(
                "cluster size must be at least 1".to_string(),
            ));
        }
        Ok(Self { max_size })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Every distinct entity id lands in exactly one cluster.
    pub fn cluster(&self, entities: &[Entity]) -> Vec<Cluster> {
        let mut ordered: Vec<&Entity> = entities.iter().collect();
        ordered.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));

        let mut seen = HashSet::new();
        let mut groups: BTreeMap<&str, Vec<Entity>> = BTreeMap::new();
        for entity in ordered {
            if !seen.insert(entity.id.as_str()) {
                continue;
            }
            let tag = entity.primary_tag().unwrap_or(UNKNOWN_TAG);
            groups.entry(tag).or_default().push(entity.clone());
        }

        let mut clusters = Vec::new();
        for (tag, members) in groups {
            for chunk in members.chunks(self.max_size) {
                clusters.push(Cluster::new(tag, chunk.to_vec()));
            }
        }
        clusters
    }
}

impl Default for Clusterer {
    fn default() -> Self {
        Self {
            max_size: Self::DEFAULT_MAX_SIZE,
        }
    }
}
