//! Portfolio backlog distribution across teams.
//!
//! Scores stories against team capability profiles instead of round-robin:
//! explicit hints win, then tags/domain, then keyword analysis of title and
//! description. An optional coordinator path builds a triage prompt and
//! parses `ASSIGN:` lines from an LLM response, so a judge can replace the
//! heuristic without changing callers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::sprint::Story;

/// Keywords identifying team types from story text. `stream_aligned` is the
/// fallback and needs no keywords.
const TEAM_TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "platform",
        &[
            "infrastructure",
            "ci/cd",
            "deploy",
            "docker",
            "monitoring",
            "logging",
            "health check",
            "connection pool",
            "tooling",
            "pipeline",
            "kubernetes",
        ],
    ),
    (
        "enabling",
        &["documentation", "training", "onboarding", "guide", "best practices"],
    ),
    (
        "complicated_subsystem",
        &[
            "algorithm",
            "cryptograph",
            "ml model",
            "inference",
            "mathematical",
            "optimization",
        ],
    ),
];

/// Keywords identifying specialization domains from story text.
const SPECIALIZATION_KEYWORDS: &[(&str, &[&str])] = &[
    ("backend", &["api", "endpoint", "rest", "database", "server", "migration"]),
    ("frontend", &["ui", "component", "dashboard", "form"]),
    ("devops", &["ci/cd", "deploy", "docker", "kubernetes", "pipeline"]),
    ("networking", &["http", "proxy", "load balancer", "rate limit"]),
    ("security", &["authentication", "jwt", "token", "oauth", "encryption"]),
    ("database", &["sql", "postgresql", "connection pool", "schema"]),
];

/// Minimal team description for profile building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub id: String,
    /// `stream_aligned`, `platform`, `enabling`, or `complicated_subsystem`.
    /// Empty means untyped (treated as stream-aligned for catch-all scoring).
    #[serde(default)]
    pub team_type: String,
}

/// Summarizes a team's capabilities for story scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamCapabilityProfile {
    pub team_id: String,
    #[serde(default)]
    pub team_type: String,
    /// Specialization → agent count.
    #[serde(default)]
    pub specializations: BTreeMap<String, u32>,
    /// Seniority → agent count.
    #[serde(default)]
    pub seniority_distribution: BTreeMap<String, u32>,
    pub agent_count: u32,
}

/// Result of classifying a single story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryClassification {
    pub inferred_domain: String,
    pub inferred_team_type: String,
    /// 0.0-1.0; explicit hints are 1.0, keyword guesses less.
    pub confidence: f64,
}

/// Product context for the triage prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Build capability profiles from team configs and their agent configs.
pub fn build_team_profiles(
    teams: &[TeamConfig],
    team_agents: &BTreeMap<String, Vec<crate::sprint::AgentConfig>>,
) -> BTreeMap<String, TeamCapabilityProfile> {
    let mut profiles = BTreeMap::new();
    for team in teams {
        let mut specializations: BTreeMap<String, u32> = BTreeMap::new();
        let mut seniority: BTreeMap<String, u32> = BTreeMap::new();
        let agents = team_agents.get(&team.id).map(Vec::as_slice).unwrap_or(&[]);
        for agent in agents {
            for spec in agent.specializations() {
                *specializations.entry(spec).or_default() += 1;
            }
            *seniority.entry(agent.seniority.clone()).or_default() += 1;
        }
        profiles.insert(
            team.id.clone(),
            TeamCapabilityProfile {
                team_id: team.id.clone(),
                team_type: team.team_type.clone(),
                specializations,
                seniority_distribution: seniority,
                agent_count: agents.len() as u32,
            },
        );
    }
    profiles
}

/// Classify a story by domain and team type.
///
/// Explicit `team_type_hint` wins with confidence 1.0; tags/domain give at
/// least 0.5; otherwise keywords over title + description decide.
pub fn classify_story(story: &Story) -> StoryClassification {
    if let Some(hint) = &story.team_type_hint {
        if !hint.is_empty() {
            return StoryClassification {
                inferred_domain: story.domain.clone(),
                inferred_team_type: hint.clone(),
                confidence: 1.0,
            };
        }
    }

    let tags: Vec<String> = story.tags.iter().map(|t| t.to_lowercase()).collect();
    if !story.domain.is_empty() || !tags.is_empty() {
        let mut inferred = team_type_from_keywords(&tags);
        if inferred.is_empty() && !story.domain.is_empty() {
            inferred = team_type_from_keywords(std::slice::from_ref(&story.domain));
        }
        let confidence = if inferred.is_empty() { 0.5 } else { 0.8 };
        return StoryClassification {
            inferred_domain: story.domain.clone(),
            inferred_team_type: if inferred.is_empty() {
                "stream_aligned".to_string()
            } else {
                inferred
            },
            confidence,
        };
    }

    let text = format!("{} {}", story.title, story.description).to_lowercase();
    let inferred_type = team_type_from_text(&text);
    let inferred_domain = domain_from_text(&text);
    let confidence = if inferred_type.is_empty() { 0.3 } else { 0.6 };
    StoryClassification {
        inferred_domain,
        inferred_team_type: if inferred_type.is_empty() {
            "stream_aligned".to_string()
        } else {
            inferred_type
        },
        confidence,
    }
}

/// Score how well a story fits a team. Higher is better.
///
/// Team-type match +10 (+5 more when brownfield); stream-aligned catch-all
/// for untyped teams or low-confidence stories +2; +3 per matching
/// specialist capped at +9; −1 per story already assigned.
pub fn score_story_for_team(
    classification: &StoryClassification,
    profile: &TeamCapabilityProfile,
    current_count: usize,
    is_brownfield: bool,
) -> f64 {
    let mut score = 0.0;

    if !classification.inferred_team_type.is_empty()
        && classification.inferred_team_type == profile.team_type
    {
        score += 10.0;
        if is_brownfield {
            score += 5.0;
        }
    } else if classification.inferred_team_type == "stream_aligned" && profile.team_type.is_empty()
    {
        score += 2.0;
    } else if classification.confidence < 0.5 && profile.team_type == "stream_aligned" {
        score += 2.0;
    }

    if !classification.inferred_domain.is_empty() {
        let count = profile
            .specializations
            .get(&classification.inferred_domain)
            .copied()
            .unwrap_or(0);
        score += (3.0 * count.min(3) as f64).min(9.0);
    }

    score -= current_count as f64;
    score
}

/// Distribute stories to teams by scoring each against every profile and
/// assigning greedily in ascending priority order.
pub fn heuristic_distribute(
    stories: &[Story],
    profiles: &BTreeMap<String, TeamCapabilityProfile>,
    is_brownfield: bool,
) -> BTreeMap<String, Vec<Story>> {
    let mut result: BTreeMap<String, Vec<Story>> = profiles
        .keys()
        .map(|id| (id.clone(), Vec::new()))
        .collect();
    if stories.is_empty() || profiles.is_empty() {
        return result;
    }

    let mut sorted: Vec<&Story> = stories.iter().collect();
    sorted.sort_by_key(|s| s.priority.unwrap_or(999));

    for story in sorted {
        let classification = classify_story(story);
        let mut best_team: Option<&str> = None;
        let mut best_score = f64::NEG_INFINITY;
        for (team_id, profile) in profiles {
            let current = result.get(team_id).map(Vec::len).unwrap_or(0);
            let score = score_story_for_team(&classification, profile, current, is_brownfield);
            if score > best_score {
                best_score = score;
                best_team = Some(team_id);
            }
        }
        if let Some(team_id) = best_team {
            if let Some(assigned) = result.get_mut(team_id) {
                assigned.push(story.clone());
            }
        }
    }
    result
}

/// Build an LLM prompt asking a coordinator to triage stories. The expected
/// reply format is one `ASSIGN: <story_id> to <team_id> because <reason>`
/// line per story.
pub fn build_triage_prompt(
    stories: &[Story],
    profiles: &BTreeMap<String, TeamCapabilityProfile>,
    product: Option<&ProductMetadata>,
) -> String {
    let mut lines: Vec<String> = vec![
        "You are the portfolio triage coordinator. Assign each story to the \
         best-fit team based on team type and specializations.\n"
            .to_string(),
    ];

    if let Some(product) = product {
        if !product.name.is_empty() || !product.description.is_empty() {
            lines.push(format!("## Product\n{}: {}\n", product.name, product.description));
        }
    }

    lines.push("## Teams".to_string());
    for (team_id, profile) in profiles {
        let specs = profile
            .specializations
            .iter()
            .map(|(k, v)| format!("{k}({v})"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "- {team_id}: type={}, agents={}, specs=[{specs}]",
            profile.team_type, profile.agent_count
        ));
    }
    lines.push(String::new());

    lines.push("## Stories to assign".to_string());
    for story in stories {
        let tag_str = if story.tags.is_empty() {
            String::new()
        } else {
            format!(" tags={:?}", story.tags)
        };
        lines.push(format!(
            "- {}: {} — {}{tag_str}",
            story.id, story.title, story.description
        ));
    }
    lines.push(String::new());

    lines.push(
        "## Rules\n\
         - Assign infrastructure/monitoring/deploy stories to platform teams.\n\
         - Assign user-facing features and API endpoints to stream_aligned teams.\n\
         - Assign documentation/training stories to enabling teams.\n\
         - Balance load across teams.\n\
         - Reply with one line per story in this exact format:\n\
           ASSIGN: <story_id> to <team_id> because <reason>"
            .to_string(),
    );

    lines.join("\n")
}

static ASSIGN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^assign:\s*(\S+)\s+to\s+(\S+)").expect("valid ASSIGN line pattern")
});

/// Parse `ASSIGN:` lines from a coordinator response into team → stories.
/// Malformed lines, unknown team ids, and unknown story ids are silently
/// skipped.
pub fn parse_assignments(
    response: &str,
    stories: &[Story],
    valid_team_ids: &[String],
) -> BTreeMap<String, Vec<Story>> {
    let story_map: BTreeMap<&str, &Story> =
        stories.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut result: BTreeMap<String, Vec<Story>> = valid_team_ids
        .iter()
        .map(|id| (id.clone(), Vec::new()))
        .collect();

    for line in response.lines() {
        let Some(captures) = ASSIGN_LINE.captures(line.trim()) else {
            continue;
        };
        let (story_id, team_id) = (&captures[1], &captures[2]);
        let Some(story) = story_map.get(story_id) else {
            continue;
        };
        let Some(assigned) = result.get_mut(team_id) else {
            continue;
        };
        assigned.push((*story).clone());
    }
    result
}

fn team_type_from_keywords(keywords: &[String]) -> String {
    for (team_type, patterns) in TEAM_TYPE_KEYWORDS {
        for keyword in keywords {
            if patterns.contains(&keyword.as_str()) {
                return team_type.to_string();
            }
        }
    }
    String::new()
}

fn team_type_from_text(text: &str) -> String {
    let mut best = "";
    let mut best_count = 0;
    for (team_type, patterns) in TEAM_TYPE_KEYWORDS {
        let count = patterns.iter().filter(|p| text.contains(*p)).count();
        if count > best_count {
            best_count = count;
            best = team_type;
        }
    }
    best.to_string()
}

fn domain_from_text(text: &str) -> String {
    let mut best = "";
    let mut best_count = 0;
    for (domain, patterns) in SPECIALIZATION_KEYWORDS {
        let count = patterns.iter().filter(|p| text.contains(*p)).count();
        if count > best_count {
            best_count = count;
            best = domain;
        }
    }
    best.to_string()
}
