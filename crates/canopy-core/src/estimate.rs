//! Lifecycle estimates: calendar dates at which a variety should start
//! flowering and be ready to harvest under a given session.
//!
//! These apply the phenology thresholds directly to the session start
//! date, so each estimate is the last day of the preceding phase: a plant
//! computes as flowering from the day after its flowering estimate, and as
//! harvested from the day after its harvest estimate. They are estimates
//! for display and planning; nothing here writes state.

use canopy_types::{CultivationSession, Plant, PlantVariety};
use chrono::{DateTime, TimeDelta, Utc};

use crate::catalog::VarietyCatalog;
use crate::phenology::VarietyTiming;

/// `start + days`, or `None` if the result is unrepresentable.
fn offset(start: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(days).and_then(|delta| start.checked_add_signed(delta))
}

/// Flowering estimate: session start plus `g + w` days, the last day of
/// growth.
pub fn estimated_flowering_date(
    variety: &PlantVariety,
    session: &CultivationSession,
) -> Option<DateTime<Utc>> {
    let timing = VarietyTiming::of(variety)?;
    offset(session.start_date, timing.growth_ends())
}

/// Harvest estimate: session start plus `g + w + f` days, the last day of
/// flowering.
pub fn estimated_harvest_date(
    variety: &PlantVariety,
    session: &CultivationSession,
) -> Option<DateTime<Utc>> {
    let timing = VarietyTiming::of(variety)?;
    offset(session.start_date, timing.flowering_ends())
}

/// Flowering estimate for a plant, from its variety snapshot.
pub fn plant_flowering_date(plant: &Plant, session: &CultivationSession) -> Option<DateTime<Utc>> {
    estimated_flowering_date(&plant.variety, session)
}

/// Harvest estimate for a plant, from its variety snapshot.
pub fn plant_harvest_date(plant: &Plant, session: &CultivationSession) -> Option<DateTime<Utc>> {
    estimated_harvest_date(&plant.variety, session)
}

/// Harvest estimate for a whole session: the latest harvest date among
/// its selected varieties that have complete timing.
pub fn session_harvest_date(
    session: &CultivationSession,
    catalog: &VarietyCatalog,
) -> Option<DateTime<Utc>> {
    session
        .selected_varieties
        .iter()
        .filter_map(|id| catalog.get(*id))
        .filter_map(|variety| estimated_harvest_date(variety, session))
        .max()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use canopy_types::{Phase, SessionId, VarietyId};
    use chrono::TimeZone;

    use super::*;

    fn variety(id: u32, f: Option<u32>) -> PlantVariety {
        PlantVariety {
            id: VarietyId(id),
            name: format!("V{id}"),
            color: "#000000".to_owned(),
            germination_time: Some(5),
            growth_time: Some(25),
            flowering_time: f,
            dry_weight: None,
        }
    }

    fn session(selected: &[u32]) -> CultivationSession {
        CultivationSession {
            id: SessionId::new(),
            name: "Spring".to_owned(),
            start_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            is_active: true,
            selected_varieties: selected.iter().copied().map(VarietyId).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn estimates_add_thresholds_to_start() {
        let s = session(&[]);
        let v = variety(1, Some(60));
        assert_eq!(
            estimated_flowering_date(&v, &s),
            Some(Utc.with_ymd_and_hms(2023, 1, 31, 0, 0, 0).unwrap())
        );
        assert_eq!(
            estimated_harvest_date(&v, &s),
            Some(Utc.with_ymd_and_hms(2023, 4, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn estimates_fall_on_the_last_day_of_the_prior_phase() {
        let s = session(&[]);
        let v = variety(1, Some(60));
        let timing = VarietyTiming::of(&v).unwrap();
        let days = |date: DateTime<Utc>| date.signed_duration_since(s.start_date).num_days();

        let flowering = days(estimated_flowering_date(&v, &s).unwrap());
        assert_eq!(timing.phase_at(flowering), Phase::Growth);
        assert_eq!(timing.phase_at(flowering + 1), Phase::Flowering);

        let harvest = days(estimated_harvest_date(&v, &s).unwrap());
        assert_eq!(timing.phase_at(harvest), Phase::Flowering);
        assert_eq!(timing.phase_at(harvest + 1), Phase::Harvested);
    }

    #[test]
    fn incomplete_timing_has_no_estimate() {
        let s = session(&[]);
        assert!(estimated_harvest_date(&variety(1, None), &s).is_none());
        assert!(estimated_flowering_date(&variety(1, None), &s).is_none());
    }

    #[test]
    fn session_estimate_takes_latest_selected_variety() {
        let catalog = VarietyCatalog::from_varieties([
            variety(1, Some(60)),
            variety(2, Some(80)),
            variety(3, None),
            variety(4, Some(200)),
        ]);
        let s = session(&[1, 2, 3, 99]);
        assert_eq!(
            session_harvest_date(&s, &catalog),
            Some(Utc.with_ymd_and_hms(2023, 4, 21, 0, 0, 0).unwrap())
        );
        assert!(session_harvest_date(&session(&[3]), &catalog).is_none());
    }
}
