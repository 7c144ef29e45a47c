// ── Mentor directory ──

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::SchedulingError;
use crate::model::{AvailabilityRule, Mentor, UserId, rule::sort_rules, validate_rule_set};

/// Registry of mentor profiles and their availability rule sets.
///
/// Values are stored as `Arc<Mentor>` snapshots; every mutation swaps in
/// a fresh snapshot under the map's shard lock, so readers never observe
/// a half-applied update.
#[derive(Debug, Default)]
pub struct MentorDirectory {
    mentors: DashMap<UserId, Arc<Mentor>>,
}

impl MentorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mentor, or updates the profile fields of an existing
    /// one. Rules, activation state, and the creation timestamp survive
    /// re-registration.
    pub fn register(
        &self,
        id: UserId,
        display_name: impl Into<String>,
        headline: Option<String>,
        price: u64,
        now: DateTime<Utc>,
    ) -> Result<Arc<Mentor>, SchedulingError> {
        if price == 0 {
            return Err(SchedulingError::InvalidPrice);
        }
        let display_name = display_name.into();
        let entry = self
            .mentors
            .entry(id.clone())
            .and_modify(|existing| {
                let mut updated = Mentor::clone(existing);
                updated.display_name = display_name.clone();
                updated.headline = headline.clone();
                updated.price = price;
                *existing = Arc::new(updated);
            })
            .or_insert_with(|| {
                Arc::new(Mentor {
                    id,
                    display_name,
                    headline,
                    price,
                    rules: Vec::new(),
                    active: true,
                    created_at: now,
                })
            });
        Ok(entry.value().clone())
    }

    /// Replaces the mentor's price for all future reservations. Existing
    /// bookings keep the price they were reserved at.
    pub fn set_price(&self, id: &UserId, price: u64) -> Result<Arc<Mentor>, SchedulingError> {
        if price == 0 {
            return Err(SchedulingError::InvalidPrice);
        }
        self.update(id, |mentor| mentor.price = price)
    }

    /// Atomically replaces the mentor's weekly rule set.
    ///
    /// The whole set is validated first; on any defect the previous rules
    /// remain in force and nothing is written. Accepted rules are stored
    /// in week order.
    pub fn set_rules(
        &self,
        id: &UserId,
        mut rules: Vec<AvailabilityRule>,
    ) -> Result<Arc<Mentor>, SchedulingError> {
        validate_rule_set(&rules)?;
        sort_rules(&mut rules);
        self.update(id, |mentor| mentor.rules = rules)
    }

    /// Current rule set, in week order.
    pub fn rules(&self, id: &UserId) -> Result<Vec<AvailabilityRule>, SchedulingError> {
        Ok(self.require(id)?.rules.clone())
    }

    /// Takes the mentor off the marketplace; existing bookings are
    /// untouched, new reservations are refused.
    pub fn deactivate(&self, id: &UserId) -> Result<Arc<Mentor>, SchedulingError> {
        self.update(id, |mentor| mentor.active = false)
    }

    pub fn reactivate(&self, id: &UserId) -> Result<Arc<Mentor>, SchedulingError> {
        self.update(id, |mentor| mentor.active = true)
    }

    pub fn mentor(&self, id: &UserId) -> Option<Arc<Mentor>> {
        self.mentors.get(id).map(|entry| entry.value().clone())
    }

    /// Like [`mentor`](Self::mentor) but mapping absence to an error.
    pub fn require(&self, id: &UserId) -> Result<Arc<Mentor>, SchedulingError> {
        self.mentor(id)
            .ok_or_else(|| SchedulingError::MentorNotFound(id.clone()))
    }

    /// Snapshot of every registered mentor, ordered by id.
    pub fn mentors(&self) -> Vec<Arc<Mentor>> {
        let mut all: Vec<Arc<Mentor>> = self
            .mentors
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.mentors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mentors.is_empty()
    }

    fn update(
        &self,
        id: &UserId,
        apply: impl FnOnce(&mut Mentor),
    ) -> Result<Arc<Mentor>, SchedulingError> {
        let mut entry = self
            .mentors
            .get_mut(id)
            .ok_or_else(|| SchedulingError::MentorNotFound(id.clone()))?;
        let mut updated = Mentor::clone(entry.value());
        apply(&mut updated);
        let updated = Arc::new(updated);
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }
}
