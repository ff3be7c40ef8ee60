//! The architect's showcase shot list.
//!
//! Adding a shot is one entry here: its category, ratio and rubric travel
//! with it.

use super::{ShotCategory, ShotSpec};
use crate::verify::VerificationProfile::{self, Exterior, Interior};

struct Entry {
    id: &'static str,
    category: ShotCategory,
    name: &'static str,
    order: u32,
    ratio: &'static str,
    profile: VerificationProfile,
    hero: bool,
    brief: &'static str,
}

impl Entry {
    fn to_spec(&self) -> ShotSpec {
        ShotSpec {
            shot_id: self.id.to_string(),
            category: self.category,
            name: self.name.to_string(),
            order: self.order,
            aspect_ratio: self.ratio.to_string(),
            profile: self.profile,
            is_hero: self.hero,
            brief: self.brief.trim().to_string(),
        }
    }
}

pub const HERO_SHOT_ID: &str = "hero_facade";

const BASE: [Entry; 18] = [
    Entry {
        id: HERO_SHOT_ID,
        category: ShotCategory::HeroShots,
        name: "Primary Facade",
        order: 1,
        ratio: "16:9",
        profile: Exterior,
        hero: true,
        brief: "
SHOT TYPE: Primary Facade (Hero Shot)
- Eye-level from the footpath opposite, 35mm equivalent, f/11
- Perfectly straight verticals, two-point perspective, building centred
- Soft overcast or morning sun with subtle shadows showing texture
- Full building ground to roofline, 20-30% sky, front setback and driveway
- This image defines the building design for every other shot",
    },
    Entry {
        id: "hero_twilight",
        category: ShotCategory::HeroShots,
        name: "Twilight Hero",
        order: 2,
        ratio: "16:9",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Twilight Hero Shot
- Same angle and framing as the primary facade
- Deep blue sky twenty minutes after sunset
- Warm interior glow through the windows, subtle facade uplighting
- Dramatic but realistic, inviting and lived-in",
    },
    Entry {
        id: "hero_elevated",
        category: ShotCategory::HeroShots,
        name: "Elevated 3/4 Angle",
        order: 3,
        ratio: "16:9",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Elevated 3/4 Angle (Drone Perspective)
- Drone at 10-15 metres, 45-degree diagonal showing two facades
- Slight downward tilt revealing roof form and materials
- Landscaping, outdoor living and car parking arrangement visible",
    },
    Entry {
        id: "context_street",
        category: ShotCategory::SiteContext,
        name: "Street Scene",
        order: 4,
        ratio: "16:9",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Street Scene Context
- Wide 24mm view from the footpath, building in the centre third
- One or two neighbouring properties each side, street trees and nature strip
- Show the building is sympathetic in scale and setback to the streetscape",
    },
    Entry {
        id: "context_aerial",
        category: ShotCategory::SiteContext,
        name: "Aerial/Drone View",
        order: 5,
        ratio: "4:3",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Aerial Site View
- Drone at 20-30 metres looking down at about 60 degrees
- Full site boundaries, roof footprint and setbacks readable
- Private open space, driveway and neighbouring properties for context",
    },
    Entry {
        id: "context_approach",
        category: ShotCategory::SiteContext,
        name: "Pedestrian Approach",
        order: 6,
        ratio: "4:3",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Pedestrian Approach
- Eye-level walking towards the entry, slightly looking up
- Path leading to the entry canopy, front garden and letterbox visible
- Convey arrival, curb appeal and a sense of welcome",
    },
    Entry {
        id: "feature_entry",
        category: ShotCategory::ArchitecturalFeatures,
        name: "Entry Threshold",
        order: 7,
        ratio: "4:3",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Entry Threshold Detail
- Close view of the front door and surrounds, 50mm equivalent
- Canopy above, lighting fixture, door hardware and threshold treatment
- Material quality at the touch points",
    },
    Entry {
        id: "feature_material",
        category: ShotCategory::ArchitecturalFeatures,
        name: "Material Detail",
        order: 8,
        ratio: "1:1",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Material Detail Close-up
- Macro-style 85mm view of about one square metre of facade
- Junction of two or three materials in natural raking light
- Craftsmanship of coursing, grain or render finish",
    },
    Entry {
        id: "feature_signature",
        category: ShotCategory::ArchitecturalFeatures,
        name: "Signature Element",
        order: 9,
        ratio: "4:3",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Signature Architectural Element
- Frame the key design move: cantilever, screening, void or feature window
- Isolate it against sky or a neutral background
- The memorable gesture that makes this project unique",
    },
    Entry {
        id: "interior_living",
        category: ShotCategory::InteriorSpaces,
        name: "Living to Outdoor",
        order: 10,
        ratio: "16:9",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Living Room to Outdoor Connection
- Wide 24mm from the living room corner towards the garden
- Large sliding or bifold doors open to the outdoor living area
- Natural light flooding an open plan space, furniture showing scale",
    },
    Entry {
        id: "interior_kitchen",
        category: ShotCategory::InteriorSpaces,
        name: "Kitchen",
        order: 11,
        ratio: "16:9",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Kitchen Feature Shot
- Eye-level from the dining area, 24-28mm equivalent
- Island bench with pendants as the focal point
- Stone benchtop, splashback detail, integrated appliances and joinery",
    },
    Entry {
        id: "interior_master",
        category: ShotCategory::InteriorSpaces,
        name: "Master Suite",
        order: 12,
        ratio: "16:9",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Master Bedroom Suite
- From the doorway or corner, 28mm equivalent
- Styled king bed, window light, walk-in robe and ensuite glimpsed
- A sense of retreat and privacy",
    },
    Entry {
        id: "interior_bathroom",
        category: ShotCategory::InteriorSpaces,
        name: "Bathroom",
        order: 13,
        ratio: "4:3",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Feature Bathroom
- Wide 24mm view of the full bathroom
- Freestanding bath or feature shower, floor-to-ceiling tiles
- Double vanity, quality tapware, spa-like atmosphere",
    },
    Entry {
        id: "spatial_staircase",
        category: ShotCategory::SpatialExperience,
        name: "Staircase Void",
        order: 14,
        ratio: "3:4",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Staircase and Void
- Looking up through the stairwell void from ground or mid-landing
- Treads, balustrade and a skylight bringing light from above
- Circulation as a sculptural feature",
    },
    Entry {
        id: "spatial_window",
        category: ShotCategory::SpatialExperience,
        name: "Window Moment",
        order: 15,
        ratio: "4:3",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Window Moment / Light Quality
- Interior featuring a significant window, backlit or side-lit
- Light streaming in, view to garden framed by the opening
- Furniture partly silhouetted",
    },
    Entry {
        id: "spatial_volume",
        category: ShotCategory::SpatialExperience,
        name: "Volume Shot",
        order: 16,
        ratio: "3:4",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Double Height / Volume Space
- Wide 24mm looking up to show full height and ceiling detail
- Double-height void or raking ceiling with clerestory windows
- Pendants at scale, a sense of volume and air",
    },
    Entry {
        id: "lifestyle_morning",
        category: ShotCategory::LifestyleAtmosphere,
        name: "Morning Light",
        order: 17,
        ratio: "16:9",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Morning Light Scene
- Kitchen or dining area with eastern light streaming in
- Breakfast setting, warm morning tones, signs of life without people
- Fresh and optimistic atmosphere",
    },
    Entry {
        id: "lifestyle_evening",
        category: ShotCategory::LifestyleAtmosphere,
        name: "Evening Entertaining",
        order: 18,
        ratio: "16:9",
        profile: Interior,
        hero: false,
        brief: "
SHOT TYPE: Evening Entertaining / Alfresco
- Outdoor living area at twilight, warm interior light spilling out
- Set alfresco table, outdoor kitchen, garden lighting
- Interior visible through the glass doors",
    },
];

const MULTI_UNIT: [Entry; 2] = [
    Entry {
        id: "multi_unit_variety",
        category: ShotCategory::ArchitecturalFeatures,
        name: "Unit Variety",
        order: 19,
        ratio: "16:9",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Unit Variety / Facade Differentiation
- Wide 28mm eye-level view showing two to four unit fronts
- Individual entries and addresses clear
- Facade variations that stay within one cohesive design language",
    },
    Entry {
        id: "multi_shared_spaces",
        category: ShotCategory::LifestyleAtmosphere,
        name: "Shared Spaces",
        order: 20,
        ratio: "16:9",
        profile: Exterior,
        hero: false,
        brief: "
SHOT TYPE: Shared Spaces / Common Areas
- Wide 24mm view of the common garden, courtyard or driveway
- Landscaping between units, shared amenity and pathways
- Community feel with privacy preserved",
    },
];

/// The 18 base shots in generation order.
pub fn base_shots() -> Vec<ShotSpec> {
    BASE.iter().map(Entry::to_spec).collect()
}

/// Supplements appended for multi-unit projects.
pub fn multi_unit_shots() -> Vec<ShotSpec> {
    MULTI_UNIT.iter().map(Entry::to_spec).collect()
}

pub fn hero() -> ShotSpec {
    BASE[0].to_spec()
}

/// Looks a shot up by id across base and supplementary entries.
pub fn find(shot_id: &str) -> Option<ShotSpec> {
    BASE.iter()
        .chain(MULTI_UNIT.iter())
        .find(|entry| entry.id == shot_id)
        .map(Entry::to_spec)
}
