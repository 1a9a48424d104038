//! Behavioral taxonomy and scorer for episode evaluation.
//!
//! Defines the closed set of 30 behavioral codes (B-01 through B-30) mapped
//! onto the 13 episode types in the scenario catalog. [`BehavioralScorer`]
//! evaluates decision traces against expected behaviors using keyword and
//! ordering heuristics — no LLM calls. Trainers with their own judge can skip
//! the scorer and pass a behavioral score directly to
//! [`RewardCalculator::compute`](crate::reward::RewardCalculator::compute).

use crate::tracer::{Decision, DecisionKind};

/// A single behavioral code definition. Frozen at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehavioralCode {
    /// Code string, `"B-01"` .. `"B-30"`.
    pub code: &'static str,
    /// Short machine name, e.g. `"ask_clarifying_question"`.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Training stage, 1-4.
    pub stage: u8,
    /// Episode type name this code belongs to.
    pub category: &'static str,
    /// Detection heuristic dispatched by [`BehavioralScorer`].
    pub detection_heuristic: &'static str,
}

const fn code(
    code: &'static str,
    name: &'static str,
    description: &'static str,
    stage: u8,
    category: &'static str,
    detection_heuristic: &'static str,
) -> BehavioralCode {
    BehavioralCode {
        code,
        name,
        description,
        stage,
        category,
        detection_heuristic,
    }
}

/// The full catalog of behavioral codes, ordered B-01..B-30.
#[rustfmt::skip]
pub const BEHAVIORAL_CODES: [BehavioralCode; 30] = [
    // ── Stage 1: Foundation ──────────────────────────────────────────
    code("B-01", "ask_clarifying_question",
        "Agent asks a clarifying question about requirements",
        1, "elicitation", "clarifying_question"),
    code("B-02", "identify_missing_acceptance_criteria",
        "Agent identifies missing acceptance criteria in a story",
        1, "elicitation", "missing_acceptance_criteria"),
    code("B-03", "propose_story_split",
        "Agent proposes splitting a large story into smaller ones",
        1, "elicitation", "story_split"),
    code("B-04", "estimate_story_points",
        "Agent estimates story points for a task",
        1, "decomposition", "estimation"),
    code("B-05", "identify_technical_dependencies",
        "Agent identifies dependencies between tasks",
        1, "decomposition", "dependencies"),
    code("B-06", "create_subtasks",
        "Agent creates subtasks for a story",
        1, "decomposition", "subtasks"),
    code("B-07", "write_test_first",
        "Agent writes tests before implementation code",
        1, "implementation", "test_first"),
    code("B-08", "follow_coding_conventions",
        "Agent follows team coding conventions",
        1, "implementation", "conventions"),
    code("B-09", "commit_incrementally",
        "Agent commits code in small incremental chunks",
        1, "implementation", "incremental_commits"),
    code("B-10", "run_tests_before_commit",
        "Agent runs tests before committing",
        1, "self_monitoring", "tests_before_commit"),
    code("B-11", "request_review_at_checkpoint",
        "Agent requests review at pairing checkpoints",
        1, "self_monitoring", "review_request"),
    // ── Stage 2: Advanced ────────────────────────────────────────────
    code("B-12", "search_for_prior_art",
        "Agent searches for existing solutions before implementing",
        2, "research", "prior_art_search"),
    code("B-13", "prototype_before_commit",
        "Agent creates a prototype/spike before full implementation",
        2, "research", "prototype"),
    code("B-14", "document_spike_findings",
        "Agent documents findings from a research spike",
        2, "research", "spike_docs"),
    code("B-15", "prioritize_by_severity",
        "Agent prioritizes issues by severity",
        2, "triage", "severity_prioritization"),
    code("B-16", "communicate_impact_assessment",
        "Agent communicates impact assessment to the team",
        2, "triage", "impact_assessment"),
    code("B-17", "diagnose_root_cause",
        "Agent diagnoses the root cause of an issue",
        2, "recovery", "root_cause"),
    code("B-18", "apply_minimal_fix",
        "Agent applies a minimal, targeted fix",
        2, "recovery", "minimal_fix"),
    code("B-19", "add_regression_test",
        "Agent adds a regression test after fixing a bug",
        2, "recovery", "regression_test"),
    code("B-20", "renegotiate_scope",
        "Agent renegotiates scope when requirements change",
        2, "scope_change", "scope_renegotiation"),
    code("B-21", "update_backlog_priority",
        "Agent updates backlog priorities after scope change",
        2, "scope_change", "backlog_update"),
    // ── Stage 3: Expert ──────────────────────────────────────────────
    code("B-22", "read_team_conventions",
        "Borrowed agent reads the new team's conventions",
        3, "borrowing_arrival", "convention_reading"),
    code("B-23", "introduce_self_at_standup",
        "Borrowed agent introduces themselves at standup",
        3, "borrowing_arrival", "standup_intro"),
    code("B-24", "declare_dependency",
        "Agent declares a cross-team dependency",
        3, "cross_team_dependency", "dependency_declaration"),
    code("B-25", "negotiate_interface_contract",
        "Agent negotiates an interface contract with another team",
        3, "cross_team_dependency", "interface_negotiation"),
    code("B-26", "write_handoff_document",
        "Agent writes a handoff document before departure",
        3, "knowledge_handoff", "handoff_doc"),
    code("B-27", "pair_with_successor",
        "Agent pairs with their successor for knowledge transfer",
        3, "knowledge_handoff", "successor_pairing"),
    // ── Stage 4: Transfer ────────────────────────────────────────────
    code("B-28", "mentor_new_member",
        "Agent mentors a new team member",
        4, "onboarding_support", "mentoring"),
    code("B-29", "share_tacit_knowledge",
        "Agent shares tacit knowledge with the team",
        4, "onboarding_support", "knowledge_sharing"),
    code("B-30", "cover_departed_role",
        "Agent covers responsibilities of a departed team member",
        4, "compensation", "role_coverage"),
];

/// Look up a behavioral code by its code string.
pub fn behavioral_code(code: &str) -> Option<&'static BehavioralCode> {
    BEHAVIORAL_CODES.iter().find(|c| c.code == code)
}

/// All behavioral codes for a given episode type category.
pub fn codes_for_category(category: &str) -> Vec<&'static BehavioralCode> {
    BEHAVIORAL_CODES
        .iter()
        .filter(|c| c.category == category)
        .collect()
}

/// All behavioral codes for a given training stage.
pub fn codes_for_stage(stage: u8) -> Vec<&'static BehavioralCode> {
    BEHAVIORAL_CODES
        .iter()
        .filter(|c| c.stage == stage)
        .collect()
}

// ── Keyword sets per heuristic ───────────────────────────────────────

const CLARIFYING_QUESTION: &[&str] = &[
    "clarify", "clarification", "question", "unclear", "ambiguous",
    "what do you mean", "could you explain", "can you clarify",
];
const MISSING_ACCEPTANCE_CRITERIA: &[&str] = &[
    "acceptance criteria", "missing criteria", "missing requirement",
    "not specified", "undefined behavior", "edge case",
];
const STORY_SPLIT: &[&str] = &[
    "split", "break down", "decompose", "too large", "smaller stories",
    "sub-story", "substory",
];
const ESTIMATION: &[&str] = &[
    "story point", "estimate", "points", "sizing", "complexity",
    "t-shirt size", "fibonacci",
];
const DEPENDENCIES: &[&str] = &[
    "dependency", "depends on", "blocked by", "prerequisite", "requires",
    "dependent",
];
const SUBTASKS: &[&str] = &[
    "subtask", "sub-task", "task breakdown", "work item", "step 1", "step 2",
    "checklist",
];
const CONVENTIONS: &[&str] = &[
    "convention", "style guide", "linting", "formatting", "naming convention",
    "code standard", "best practice",
];
const REVIEW_REQUEST: &[&str] = &[
    "review", "checkpoint", "feedback", "check my work", "please review",
    "navigator",
];
const PRIOR_ART_SEARCH: &[&str] = &[
    "prior art", "existing solution", "search", "look for",
    "already implemented", "reference implementation", "similar",
];
const PROTOTYPE: &[&str] = &[
    "prototype", "spike", "proof of concept", "poc", "experiment", "try out",
    "quick test",
];
const SPIKE_DOCS: &[&str] = &[
    "findings", "documented", "spike result", "research notes", "conclusion",
    "recommendation", "trade-off",
];
const SEVERITY_PRIORITIZATION: &[&str] = &[
    "severity", "priority", "critical", "high priority", "p0", "p1", "urgent",
    "blocker",
];
const IMPACT_ASSESSMENT: &[&str] = &[
    "impact", "assessment", "affected", "blast radius", "downstream",
    "users impacted", "scope of impact",
];
const ROOT_CAUSE: &[&str] = &[
    "root cause", "diagnosis", "investigate", "debug", "underlying issue",
    "source of", "trace back",
];
const MINIMAL_FIX: &[&str] = &[
    "minimal fix", "targeted fix", "small change", "surgical", "narrow fix",
    "least invasive", "focused fix",
];
const REGRESSION_TEST: &[&str] = &[
    "regression test", "regression", "test for the fix", "prevent recurrence",
    "test case for", "verify fix",
];
const SCOPE_RENEGOTIATION: &[&str] = &[
    "renegotiate", "scope change", "descope", "defer", "reduce scope",
    "out of scope", "negotiate",
];
const BACKLOG_UPDATE: &[&str] = &[
    "backlog", "reprioritize", "re-prioritize", "priority update", "reorder",
    "move to backlog", "update priority",
];
const CONVENTION_READING: &[&str] = &[
    "convention", "team norms", "coding standard", "style guide",
    "team practice", "how does this team", "team process",
];
const STANDUP_INTRO: &[&str] = &[
    "introduce", "new to the team", "joining", "hello team",
    "i'm here to help", "borrowed from", "visiting",
];
const DEPENDENCY_DECLARATION: &[&str] = &[
    "cross-team", "dependency", "depends on team", "blocked by team",
    "interface", "api contract", "shared service",
];
const INTERFACE_NEGOTIATION: &[&str] = &[
    "interface contract", "api contract", "negotiate", "agree on", "schema",
    "endpoint", "protocol", "message format",
];
const HANDOFF_DOC: &[&str] = &[
    "handoff", "hand-off", "transition document", "knowledge transfer",
    "documentation", "leaving notes", "departure doc",
];
const SUCCESSOR_PAIRING: &[&str] = &[
    "pair with successor", "knowledge transfer session", "shadow",
    "walk through", "show you how", "handover session", "pair session",
];
const MENTORING: &[&str] = &[
    "mentor", "guide", "teach", "help understand", "explain to", "show how",
    "onboarding buddy", "coaching",
];
const KNOWLEDGE_SHARING: &[&str] = &[
    "tacit knowledge", "tribal knowledge", "undocumented", "tip", "trick",
    "gotcha", "watch out for", "heads up",
];
const ROLE_COVERAGE: &[&str] = &[
    "cover", "fill in", "take over", "compensate", "pick up",
    "absorb responsibilities", "step in for", "backfill",
];

/// Scores decision traces against expected behavioral codes.
///
/// Score = detected / expected. An empty expected list scores 1.0; an empty
/// decision list against a non-empty expected list scores 0.0. Codes not in
/// the catalog are silently ignored (they stay undetected but still count in
/// the denominator).
#[derive(Debug, Clone, Copy, Default)]
pub struct BehavioralScorer;

impl BehavioralScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score decisions against expected behavioral codes, returning the score
    /// in [0, 1] and the list of detected code strings.
    pub fn score(&self, decisions: &[Decision], expected_behaviors: &[String]) -> (f64, Vec<String>) {
        if expected_behaviors.is_empty() {
            return (1.0, Vec::new());
        }
        if decisions.is_empty() {
            return (0.0, Vec::new());
        }

        let mut detected = Vec::new();
        for code_str in expected_behaviors {
            let Some(bc) = behavioral_code(code_str) else {
                continue;
            };
            if self.detect(bc.detection_heuristic, decisions) {
                detected.push(code_str.clone());
            }
        }

        let score = detected.len() as f64 / expected_behaviors.len() as f64;
        (score, detected)
    }

    /// Dispatch a named detection heuristic. Unknown names never detect.
    fn detect(&self, heuristic: &str, decisions: &[Decision]) -> bool {
        match heuristic {
            "clarifying_question" => any_content_matches(decisions, CLARIFYING_QUESTION),
            "missing_acceptance_criteria" => {
                any_content_matches(decisions, MISSING_ACCEPTANCE_CRITERIA)
            }
            "story_split" => any_content_matches(decisions, STORY_SPLIT),
            "estimation" => any_content_matches(decisions, ESTIMATION),
            "dependencies" => any_content_matches(decisions, DEPENDENCIES),
            "subtasks" => any_content_matches(decisions, SUBTASKS),
            "test_first" => check_action_order(decisions, "test", "implement"),
            "conventions" => any_content_matches(decisions, CONVENTIONS),
            "incremental_commits" => detect_incremental_commits(decisions),
            "tests_before_commit" => check_action_order(decisions, "test", "commit"),
            "review_request" => any_content_matches(decisions, REVIEW_REQUEST),
            "prior_art_search" => any_content_matches(decisions, PRIOR_ART_SEARCH),
            "prototype" => any_content_matches(decisions, PROTOTYPE),
            "spike_docs" => any_content_matches(decisions, SPIKE_DOCS),
            "severity_prioritization" => any_content_matches(decisions, SEVERITY_PRIORITIZATION),
            "impact_assessment" => any_content_matches(decisions, IMPACT_ASSESSMENT),
            "root_cause" => any_content_matches(decisions, ROOT_CAUSE),
            "minimal_fix" => detect_minimal_fix(decisions),
            "regression_test" => any_content_matches(decisions, REGRESSION_TEST),
            "scope_renegotiation" => any_content_matches(decisions, SCOPE_RENEGOTIATION),
            "backlog_update" => any_content_matches(decisions, BACKLOG_UPDATE),
            "convention_reading" => any_content_matches(decisions, CONVENTION_READING),
            "standup_intro" => any_content_matches(decisions, STANDUP_INTRO),
            "dependency_declaration" => any_content_matches(decisions, DEPENDENCY_DECLARATION),
            "interface_negotiation" => any_content_matches(decisions, INTERFACE_NEGOTIATION),
            "handoff_doc" => any_content_matches(decisions, HANDOFF_DOC),
            "successor_pairing" => any_content_matches(decisions, SUCCESSOR_PAIRING),
            "mentoring" => any_content_matches(decisions, MENTORING),
            "knowledge_sharing" => any_content_matches(decisions, KNOWLEDGE_SHARING),
            "role_coverage" => any_content_matches(decisions, ROLE_COVERAGE),
            _ => false,
        }
    }
}

/// True if any decision's content or context contains any keyword
/// (case-insensitive substring match).
fn any_content_matches(decisions: &[Decision], keywords: &[&str]) -> bool {
    decisions.iter().any(|d| {
        let combined = format!(
            "{} {}",
            d.action_content.to_lowercase(),
            d.context.to_lowercase()
        );
        keywords.iter().any(|kw| combined.contains(kw))
    })
}

/// Lowercased haystack the ordering heuristics search: action content, action
/// type, and stringified tool-call metadata.
fn combined_signal(d: &Decision) -> String {
    let tool_calls = d
        .metadata
        .get("tool_calls")
        .map(|v| v.to_string().to_lowercase())
        .unwrap_or_default();
    format!(
        "{} {} {}",
        d.action_content.to_lowercase(),
        d.action_type.as_str(),
        tool_calls
    )
}

/// True iff a decision matching `first` strictly precedes one matching
/// `then`. A single decision containing both markers does not qualify.
fn check_action_order(decisions: &[Decision], first: &str, then: &str) -> bool {
    let mut first_idx: Option<usize> = None;
    let mut then_idx: Option<usize> = None;
    for (i, d) in decisions.iter().enumerate() {
        let combined = combined_signal(d);
        if first_idx.is_none() && combined.contains(first) {
            first_idx = Some(i);
        }
        if combined.contains(then) {
            then_idx = Some(i);
        }
    }
    matches!((first_idx, then_idx), (Some(f), Some(t)) if t > f)
}

/// B-09: at least two commit signals across coding tool calls and content.
/// Mentions are counted without dedup.
fn detect_incremental_commits(decisions: &[Decision]) -> bool {
    let mut commit_count = decisions
        .iter()
        .filter(|d| {
            d.action_type == DecisionKind::ExecuteCodingTask
                && d.metadata
                    .get("tool_calls")
                    .map(|v| v.to_string().to_lowercase().contains("commit"))
                    .unwrap_or(false)
        })
        .count();
    if commit_count < 2 {
        commit_count += decisions
            .iter()
            .filter(|d| {
                d.action_content.to_lowercase().contains("commit")
                    && matches!(
                        d.action_type,
                        DecisionKind::Generate | DecisionKind::ExecuteCodingTask
                    )
            })
            .count();
    }
    commit_count >= 2
}

/// B-18: any decision touched at most two files, or a keyword matches.
fn detect_minimal_fix(decisions: &[Decision]) -> bool {
    let small_change = decisions.iter().any(|d| {
        d.metadata
            .get("files_changed")
            .and_then(|v| v.as_array())
            .map(|files| !files.is_empty() && files.len() <= 2)
            .unwrap_or(false)
    });
    small_change || any_content_matches(decisions, MINIMAL_FIX)
}
