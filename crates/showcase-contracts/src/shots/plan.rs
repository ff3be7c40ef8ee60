use std::collections::HashSet;

use anyhow::bail;

use super::{catalog, ShotSpec};
use crate::brief::ProjectBrief;

/// Ordered shots for one job. Exactly one hero, evaluated first.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotPlan {
    shots: Vec<ShotSpec>,
}

impl ShotPlan {
    pub fn new(shots: Vec<ShotSpec>) -> anyhow::Result<Self> {
        let Some(first) = shots.first() else {
            bail!("shot plan is empty");
        };
        if !first.is_hero {
            bail!("shot plan must start with the hero, found '{}'", first.shot_id);
        }
        let heroes = shots.iter().filter(|shot| shot.is_hero).count();
        if heroes != 1 {
            bail!("shot plan must contain exactly one hero, found {heroes}");
        }
        let mut seen = HashSet::new();
        for shot in &shots {
            if !seen.insert(shot.shot_id.as_str()) {
                bail!("shot plan lists '{}' twice", shot.shot_id);
            }
        }
        Ok(Self { shots })
    }

    /// Base catalog, plus the multi-unit supplements when the brief calls for them.
    pub fn for_brief(brief: &ProjectBrief) -> anyhow::Result<Self> {
        let mut plan = Self::new(catalog::base_shots())?;
        if brief.is_multi_unit() {
            plan.extend(catalog::multi_unit_shots())?;
        }
        Ok(plan)
    }

    /// Appends supplementary shots after everything already planned.
    pub fn extend(&mut self, extra: Vec<ShotSpec>) -> anyhow::Result<()> {
        let mut shots = self.shots.clone();
        shots.extend(extra);
        *self = Self::new(shots)?;
        Ok(())
    }

    pub fn hero(&self) -> &ShotSpec {
        &self.shots[0]
    }

    /// Every shot after the hero, in plan order.
    pub fn variations(&self) -> &[ShotSpec] {
        &self.shots[1..]
    }

    pub fn shots(&self) -> &[ShotSpec] {
        &self.shots
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    pub fn get(&self, shot_id: &str) -> Option<&ShotSpec> {
        self.shots.iter().find(|shot| shot.shot_id == shot_id)
    }

    pub fn shot_ids(&self) -> Vec<&str> {
        self.shots.iter().map(|shot| shot.shot_id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ShotPlan;
    use crate::brief::{ProjectBrief, ProjectType};
    use crate::shots::catalog;

    #[test]
    fn small_projects_get_the_base_set() -> anyhow::Result<()> {
        let brief = ProjectBrief::fallback("two modern homes");
        let plan = ShotPlan::for_brief(&brief)?;
        assert_eq!(plan.len(), 18);
        assert_eq!(plan.hero().shot_id, "hero_facade");
        assert_eq!(plan.variations().len(), 17);
        Ok(())
    }

    #[test]
    fn multi_unit_supplements_are_appended_last() -> anyhow::Result<()> {
        let mut brief = ProjectBrief::fallback("townhouse row");
        brief.project_type = ProjectType::Townhouses;
        brief.num_units = 4;
        let plan = ShotPlan::for_brief(&brief)?;
        let ids = plan.shot_ids();
        assert_eq!(ids.len(), 20);
        assert_eq!(&ids[18..], &["multi_unit_variety", "multi_shared_spaces"]);

        brief.num_units = 2;
        assert_eq!(ShotPlan::for_brief(&brief)?.len(), 18);

        brief.project_type = ProjectType::Apartments;
        assert_eq!(ShotPlan::for_brief(&brief)?.len(), 20);
        Ok(())
    }

    #[test]
    fn rejects_plans_without_a_leading_hero() {
        let mut shots = catalog::base_shots();
        shots.swap(0, 1);
        assert!(ShotPlan::new(shots).is_err());
        assert!(ShotPlan::new(Vec::new()).is_err());

        let mut twin_heroes = catalog::base_shots();
        twin_heroes[1].is_hero = true;
        assert!(ShotPlan::new(twin_heroes).is_err());
    }

    #[test]
    fn extend_rejects_duplicates() -> anyhow::Result<()> {
        let mut plan = ShotPlan::new(catalog::base_shots())?;
        let duplicate = plan.get("context_street").cloned().into_iter().collect();
        assert!(plan.extend(duplicate).is_err());
        assert_eq!(plan.len(), 18);
        Ok(())
    }
}
