//! Instruction text handed to the external models.

use serde_json::{Map, Value};
use showcase_contracts::brief::ProjectBrief;
use showcase_contracts::shots::ShotSpec;
use showcase_contracts::verify::{VerificationProfile, CRITERION_MAX};

const PHOTOREALISM: &str = "\
- Photorealistic architectural photography, indistinguishable from a real photograph
- Accurate Melbourne daylight, true-to-life material textures and weathering
- Straight verticals, natural lens behaviour, no CGI sheen or oversaturation
- Realistic landscaping, street furniture and sky";

fn join_or(values: &[String], fallback: &str) -> String {
    if values.is_empty() {
        fallback.to_string()
    } else {
        values.join(", ")
    }
}

fn title_case(raw: &str) -> String {
    raw.split(['_', ' ', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn location_block(brief: &ProjectBrief) -> String {
    format!(
        "<location>\nSuburb: {}, Melbourne, Victoria, Australia.\nMatch the suburb's streetscape, vegetation and neighbouring housing stock.\n</location>",
        title_case(brief.suburb_or_default())
    )
}

pub fn brief_parse_prompt(request: &str) -> String {
    format!(
        r#"<task>
Analyze the architectural project description and extract structured details.
</task>

<input>
{request}
</input>

<output_format>
Return a single JSON object with these fields:
{{
    "project_type": "dual_occupancy" | "townhouses" | "apartments",
    "suburb": "<suburb name or null if not mentioned>",
    "num_units": <number or null>,
    "storeys": <number or null>,
    "style_keywords": ["modern", "heritage", "contemporary", ...],
    "materials": ["brick", "render", "timber", "glass", ...],
    "special_features": ["cantilever", "courtyard", "rooftop", ...],
    "finish_level": "standard" | "premium" | "luxury",
    "summary": "<one sentence summary>"
}}
</output_format>

<rules>
- If suburb not mentioned, set to null
- Default project_type to "dual_occupancy" if unclear
- finish_level: "luxury" if high-end is mentioned, "standard" if basic or affordable, else "premium"
- Return ONLY the JSON object
</rules>"#
    )
}

pub fn hero_instruction(request: &str, brief: &ProjectBrief, shot: &ShotSpec) -> String {
    format!(
        "<role>
You are a professional architectural photographer creating the hero image for a Melbourne property development.
</role>

<project>
<description>{request}</description>
<type>{kind}</type>
<units>{units}</units>
<storeys>{storeys}</storeys>
<style>{style}</style>
<materials>{materials}</materials>
<features>{features}</features>
<finish_level>{finish}</finish_level>
</project>

{location}

<photorealistic_requirements>
{PHOTOREALISM}
</photorealistic_requirements>

<shot_specification>
{shot_brief}
</shot_specification>

<critical_requirements>
This image establishes the building design for every other shot in the showcase.
All architectural features must be clearly visible and well-defined.
</critical_requirements>

<output>
Generate a single photorealistic exterior photograph of this building.
</output>",
        kind = brief.project_type.title(),
        units = brief.num_units,
        storeys = brief.storeys,
        style = join_or(&brief.style_keywords, "modern"),
        materials = join_or(&brief.materials, "brick, render"),
        features = join_or(&brief.special_features, "quality architectural detailing"),
        finish = title_case(brief.finish_level.as_str()),
        location = location_block(brief),
        shot_brief = shot.brief,
    )
}

pub fn variation_instruction(
    shot: &ShotSpec,
    brief: &ProjectBrief,
    reference_description: &str,
) -> String {
    format!(
        "<role>
You are a professional architectural photographer creating a variation shot of an existing building.
The reference image shows the EXACT building you must photograph from a different angle, time or focus.
</role>

<reference_building>
{reference_description}
</reference_building>

<project>
<type>{kind}</type>
<style>{style}</style>
<materials>{materials}</materials>
<finish_level>{finish}</finish_level>
</project>

{location}

<photorealistic_requirements>
{PHOTOREALISM}
</photorealistic_requirements>

<shot_specification>
{shot_brief}
</shot_specification>

<consistency_requirements>
Show the EXACT SAME BUILDING as the reference image:
- Building shape, silhouette and massing must match
- Materials and facade treatment must be identical
- Window patterns, sizes and placements must be consistent
- Only the angle, time of day or focus changes, never the design
</consistency_requirements>

<output>
Generate a single photorealistic photograph for the {name} shot.
</output>",
        kind = brief.project_type.title(),
        style = join_or(&brief.style_keywords, "modern"),
        materials = join_or(&brief.materials, "brick, render"),
        finish = title_case(brief.finish_level.as_str()),
        location = location_block(brief),
        shot_brief = shot.brief,
        name = shot.name,
    )
}

pub fn inspiration_hero_instruction(
    style_analysis: &Map<String, Value>,
    request: &str,
    brief: &ProjectBrief,
    shot: &ShotSpec,
) -> String {
    let analysis = serde_json::to_string_pretty(style_analysis).unwrap_or_else(|_| "{}".to_string());
    let description = if request.trim().is_empty() {
        "No written brief; follow the inspiration image."
    } else {
        request.trim()
    };
    format!(
        "<role>
You are an architect translating an inspiration image into a new building design for a Melbourne site.
</role>

<inspiration_analysis>
{analysis}
</inspiration_analysis>

<project>
<description>{description}</description>
<type>{kind}</type>
<units>{units}</units>
<storeys>{storeys}</storeys>
<finish_level>{finish}</finish_level>
</project>

{location}

<style_transfer_rules>
- Adopt the inspiration's architectural language, material palette and colour temperature
- Do NOT copy the inspiration building; design a new building for this project and site
- Respect the project type, unit count and storeys above
</style_transfer_rules>

<photorealistic_requirements>
{PHOTOREALISM}
</photorealistic_requirements>

<shot_specification>
{shot_brief}
</shot_specification>

<output>
Generate a single photorealistic exterior photograph of the new building.
</output>",
        kind = brief.project_type.title(),
        units = brief.num_units,
        storeys = brief.storeys,
        finish = title_case(brief.finish_level.as_str()),
        location = location_block(brief),
        shot_brief = shot.brief,
    )
}

/// Inserts reviewer feedback ahead of the `<output>` section.
pub fn with_user_feedback(base: &str, feedback: &str) -> String {
    let section = format!(
        "<user_feedback>
The previous generation was not quite right. Make these adjustments:
{}
</user_feedback>

<regeneration_instruction>
Generate a NEW image that addresses the feedback while keeping the inspiration style and the project requirements.
</regeneration_instruction>

",
        feedback.trim()
    );
    match base.rfind("<output>") {
        Some(index) => format!("{}{}{}", &base[..index], section, &base[index..]),
        None => format!("{base}\n\n{section}"),
    }
}

/// Appends the latest fixing directives to a base instruction.
pub fn with_fixing_feedback(base: &str, feedback: Option<&str>) -> String {
    match feedback {
        Some(feedback) if !feedback.trim().is_empty() => format!("{base}\n\n{feedback}"),
        _ => base.to_string(),
    }
}

pub fn describe_reference_prompt() -> &'static str {
    "<task>
Describe this architectural photograph in precise detail as a reference for other views of the same building.
</task>

<required_details>
1. Building shape, silhouette and massing
2. Number of storeys and floor-to-floor heights
3. Facade materials: colours, bond patterns, finishes, timber orientation, glazing and frame colours
4. Window sizes, shapes and placements
5. Roof form, pitch and materials
6. Entry design: door, canopy, steps, lighting
7. Distinctive features: cantilevers, screens, voids, balconies
8. Garage doors, landscaping, paving and fencing
</required_details>

<output_format>
One detailed paragraph another model could use to recreate this exact building from a different angle.
</output_format>"
}

pub fn style_analysis_prompt() -> &'static str {
    r#"<task>
Analyze the architectural style of this inspiration image.
</task>

<output_format>
Return ONLY a JSON object:
{
    "architectural_style": {"primary": "...", "era_influence": "...", "design_philosophy": "..."},
    "materials": {"primary_material": "...", "secondary_material": "...", "accent_materials": [], "proportions_summary": "..."},
    "design_elements": {"roof_form": "...", "key_features": [], "window_treatment": "...", "entry_design": "..."},
    "colour_scheme": {"dominant_colours": [], "accent_colours": [], "temperature": "...", "contrast_level": "..."},
    "spatial_qualities": {"massing": "...", "proportions": "...", "solid_void_ratio": "...", "scale_feeling": "..."},
    "distinctive_features": [],
    "style_summary": "..."
}
</output_format>"#
}

/// Judge instructions for one rubric; scoring keys come from the criteria table.
pub fn rubric_prompt(profile: VerificationProfile, shot: &ShotSpec, brief: &ProjectBrief) -> String {
    let criteria = profile.criteria();
    let scoring = criteria
        .iter()
        .enumerate()
        .map(|(idx, criterion)| {
            format!(
                "{}. {} (0-{CRITERION_MAX}): {}",
                idx + 1,
                criterion.label,
                criterion.checks
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let breakdown = criteria
        .iter()
        .map(|criterion| format!("        \"{}\": <0-{CRITERION_MAX}>", criterion.key))
        .collect::<Vec<_>>()
        .join(",\n");

    let preamble = match profile {
        VerificationProfile::Exterior => format!(
            "<task>
Compare these two architectural images and score how consistently the second depicts the same building as the first.
</task>

<images>
- Image 1: Original hero/reference image (the source of truth)
- Image 2: Generated variation ({shot_id})
</images>",
            shot_id = shot.shot_id
        ),
        VerificationProfile::Interior => format!(
            "<task>
Analyze this interior image for quality and style consistency with the project.
</task>

<context>
- Image 1: EXTERIOR of a {kind} building (style reference only)
- Image 2: INTERIOR space ({shot_id}), the image you are scoring
</context>

<project_details>
<type>{kind}</type>
<style_keywords>{style}</style_keywords>
<exterior_materials>{materials}</exterior_materials>
<finish_level>{finish}</finish_level>
</project_details>

<important_note>
Interiors naturally look different from exteriors. Do NOT check building shape or facade consistency.
Verify style and quality coherence instead.
</important_note>",
            kind = brief.project_type.title(),
            shot_id = shot.shot_id,
            style = join_or(&brief.style_keywords, "modern"),
            materials = join_or(&brief.materials, "brick, render"),
            finish = title_case(brief.finish_level.as_str()),
        ),
    };

    format!(
        "{preamble}

<scoring_criteria>
Score each criterion from 0-{CRITERION_MAX} points:

{scoring}
</scoring_criteria>

<output_format>
Return ONLY a JSON object:
{{
    \"total_score\": <sum of all criteria, 0-100>,
    \"breakdown\": {{
{breakdown}
    }},
    \"issues\": [\"specific problems found\"],
    \"suggestions\": [\"specific fixes\"]
}}
</output_format>"
    )
}
