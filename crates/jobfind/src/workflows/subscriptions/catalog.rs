use std::collections::BTreeMap;

use super::domain::{Job, JobSummary, Skill, SkillId};

/// Catalog of known skills, keyed by stable identifier.
///
/// Subscriber skill interests are validated against this catalog at the
/// intake boundary; the catalog also resolves display names when rendering
/// mail payloads. Renaming a skill never affects matching.
#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    skills: BTreeMap<SkillId, Skill>,
}

impl SkillCatalog {
    pub fn from_skills<I>(skills: I) -> Self
    where
        I: IntoIterator<Item = Skill>,
    {
        Self {
            skills: skills
                .into_iter()
                .map(|skill| (skill.id, skill))
                .collect(),
        }
    }

    pub fn contains(&self, id: SkillId) -> bool {
        self.skills.contains_key(&id)
    }

    pub fn get(&self, id: SkillId) -> Option<&Skill> {
        self.skills.get(&id)
    }

    pub fn all(&self) -> Vec<Skill> {
        self.skills.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Display name for an identifier, with a stable fallback for ids the
    /// catalog no longer knows (jobs are ingested by an external workflow).
    pub fn display_name(&self, id: SkillId) -> String {
        match self.get(id) {
            Some(skill) => skill.name.clone(),
            None => format!("skill-{id}"),
        }
    }

    /// Render the mail-facing summary for a job.
    pub fn summarize(&self, job: &Job) -> JobSummary {
        JobSummary {
            job_id: job.id,
            name: job.name.clone(),
            company: job.company.clone(),
            salary: job.salary,
            skills: job.skills.iter().map(|id| self.display_name(id)).collect(),
        }
    }
}
