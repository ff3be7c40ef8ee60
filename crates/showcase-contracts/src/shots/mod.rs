pub mod catalog;
mod plan;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::verify::VerificationProfile;

pub use plan::ShotPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotCategory {
    HeroShots,
    SiteContext,
    ArchitecturalFeatures,
    InteriorSpaces,
    SpatialExperience,
    LifestyleAtmosphere,
}

impl ShotCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeroShots => "hero_shots",
            Self::SiteContext => "site_context",
            Self::ArchitecturalFeatures => "architectural_features",
            Self::InteriorSpaces => "interior_spaces",
            Self::SpatialExperience => "spatial_experience",
            Self::LifestyleAtmosphere => "lifestyle_atmosphere",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::HeroShots => "Hero Shots",
            Self::SiteContext => "Site & Context",
            Self::ArchitecturalFeatures => "Architectural Features",
            Self::InteriorSpaces => "Key Interior Spaces",
            Self::SpatialExperience => "Spatial Experience",
            Self::LifestyleAtmosphere => "Lifestyle & Atmosphere",
        }
    }
}

impl fmt::Display for ShotCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned output image. Immutable once a plan is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotSpec {
    pub shot_id: String,
    pub category: ShotCategory,
    pub name: String,
    pub order: u32,
    pub aspect_ratio: String,
    pub profile: VerificationProfile,
    #[serde(default)]
    pub is_hero: bool,
    /// Instruction payload handed to the prompt builder verbatim.
    pub brief: String,
}

impl ShotSpec {
    pub fn is_interior(&self) -> bool {
        self.profile == VerificationProfile::Interior
    }
}
