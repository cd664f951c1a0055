use chrono::{Months, NaiveDate, Utc};
use tracing::debug;

use crate::models::{Candidate, CandidateFilter, MissingStatus, Subject};
use crate::services::{RecordStore, StoreError};

/// Check if a candidate satisfies every constraint of the filter
///
/// Gender, skin color and status must match exactly; the age bounds are
/// inclusive. Candidates without a birth date count as age 0.
#[inline]
pub fn matches_candidate_filter(
    candidate: &Candidate,
    filter: &CandidateFilter,
    today: NaiveDate,
) -> bool {
    if candidate.status != filter.status {
        return false;
    }

    if candidate.gender != filter.gender || candidate.skin != filter.skin {
        return false;
    }

    let age = candidate.age_on(today);
    age >= filter.min_age && age <= filter.max_age
}

/// Shift `today` back by a signed number of whole years
fn years_before(today: NaiveDate, years: i32) -> NaiveDate {
    let months = Months::new(years.unsigned_abs().saturating_mul(12));
    if years >= 0 {
        today.checked_sub_months(months).unwrap_or(NaiveDate::MIN)
    } else {
        today.checked_add_months(months).unwrap_or(NaiveDate::MAX)
    }
}

/// Birth dates whose age on `today` falls in `[min_age, max_age]`
///
/// Returns `(born_after, born_on_or_before)`: the lower bound is exclusive,
/// the upper bound inclusive. Used to push the age window down into SQL.
pub fn birth_date_window(min_age: i32, max_age: i32, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let born_after = years_before(today, max_age.saturating_add(1));
    let born_on_or_before = years_before(today, min_age);
    (born_after, born_on_or_before)
}

/// Bounds the population a subject is compared against
///
/// The comparison oracle is slow and billed per call, so only eligible
/// missing persons of the same gender and skin color, within an age window
/// around the subject, are ever handed to it.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    age_window: i32,
    limit: usize,
}

impl CandidateSelector {
    pub fn new(age_window: i32, limit: usize) -> Self {
        Self { age_window, limit }
    }

    /// Build the candidate query for a subject as of `today`
    pub fn filter_for(&self, subject: &Subject, today: NaiveDate) -> CandidateFilter {
        let age = subject.age_on(today);
        CandidateFilter {
            gender: subject.gender,
            skin: subject.skin,
            min_age: age - self.age_window,
            max_age: age + self.age_window,
            status: MissingStatus::Disappeared,
            limit: self.limit,
        }
    }

    /// Query the store for the subject's candidates
    ///
    /// Results are re-checked against the filter and capped at the limit,
    /// so a lenient store cannot widen the search. An empty list is a valid
    /// outcome.
    pub async fn select(
        &self,
        store: &dyn RecordStore,
        subject: &Subject,
    ) -> Result<Vec<Candidate>, StoreError> {
        let today = Utc::now().date_naive();
        let filter = self.filter_for(subject, today);

        let mut candidates = store.find_candidates(&filter).await?;
        let fetched = candidates.len();

        candidates.retain(|c| matches_candidate_filter(c, &filter, today));
        candidates.truncate(filter.limit);

        if candidates.len() < fetched {
            debug!(
                homeless_id = %subject.id,
                fetched,
                kept = candidates.len(),
                "Discarded candidates outside the filter"
            );
        }

        Ok(candidates)
    }
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self::new(15, 20)
    }
}
