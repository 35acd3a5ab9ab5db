//! Heuristic context analysis
//!
//! Extracts who is asking and under which constraints from a normalized
//! request plus whatever the session store already knows. Pure keyword
//! and pattern matching; no I/O, never fails.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use strum::Display;
use vibe_core::{
    BudgetLevel, BusinessModel, NormalizedRequest, PastInteraction, Scale, TechnicalLevel, UserContext, UserType,
};

use crate::keywords::KeywordSet;

/// Largest tie-break weight history can add to a text signal
///
/// Kept below a single keyword hit so history biases but never overrides.
const MAX_HISTORY_BIAS: f64 = 0.5;

/// Weight of each history match before capping
const HISTORY_MATCH_WEIGHT: f64 = 0.25;

/// Distinct technical terms needed for an advanced classification
const ADVANCED_VOCABULARY: usize = 3;

/// How soon the user needs the result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

/// Structured signal extracted from a request and its user context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextAnalysis {
    pub user_type: UserType,
    pub technical_level: TechnicalLevel,
    pub scale: Scale,
    pub budget: BudgetLevel,
    pub business_model: Option<BusinessModel>,
    pub urgency: Urgency,
    /// Known constraints first, then detected ones
    pub constraints: Vec<String>,
    /// Known goals first, then detected ones
    pub goals: Vec<String>,
    pub design_preferences: Vec<String>,
    pub tech_preferences: Vec<String>,
}

impl ContextAnalysis {
    /// Fold the analysis back into a user context
    ///
    /// Identity, preference weights, and history are carried over from
    /// `original`; every other field comes from the analysis.
    pub fn to_user_context(&self, original: &UserContext) -> UserContext {
        UserContext {
            user_id: original.user_id.clone(),
            user_type: Some(self.user_type),
            technical_level: Some(self.technical_level),
            scale: Some(self.scale),
            budget: Some(self.budget),
            business_model: self.business_model,
            goals: self.goals.clone(),
            constraints: self.constraints.clone(),
            preferences: original.preferences.clone(),
            history: original.history.clone(),
        }
    }
}

// -- Keyword tables, checked in order; earlier rows win ties --

const USER_TYPE_SIGNALS: &[(UserType, &[&str])] = &[
    (
        UserType::Entrepreneur,
        &["startup", "founder", "entrepreneur", "side hustle", "business idea", "launch my", "mvp"],
    ),
    (
        UserType::SmallBusiness,
        &["small business", "my shop", "my store", "my restaurant", "my bakery", "local business", "my salon"],
    ),
    (
        UserType::Developer,
        &["developer", "api", "repository", "codebase", "backend", "pull request", "i code"],
    ),
    (UserType::Designer, &["designer", "figma", "mockup", "wireframe", "branding", "typography"]),
    (
        UserType::Student,
        &["student", "homework", "class project", "assignment", "school", "university", "thesis"],
    ),
    (
        UserType::Enterprise,
        &["enterprise", "compliance", "single sign-on", "sso", "our organization", "corporate", "department"],
    ),
    (
        UserType::Creator,
        &["creator", "youtube", "podcast", "newsletter", "my audience", "influencer", "followers"],
    ),
];

const BUSINESS_MODEL_SIGNALS: &[(BusinessModel, &[&str])] = &[
    (
        BusinessModel::Ecommerce,
        &["sell", "online store", "shop", "checkout", "ecommerce", "e-commerce", "products"],
    ),
    (
        BusinessModel::Subscription,
        &["subscription", "membership", "monthly plan", "recurring", "subscribers"],
    ),
    (BusinessModel::Advertising, &["advertising", "ads", "sponsor", "ad revenue"]),
    (
        BusinessModel::Services,
        &["booking", "appointment", "consulting", "my clients", "services", "freelance"],
    ),
    (BusinessModel::Marketplace, &["marketplace", "vendors", "buyers and sellers", "listings"]),
    (BusinessModel::Nonprofit, &["nonprofit", "non-profit", "donation", "charity", "volunteer"]),
    (BusinessModel::Personal, &["personal", "for myself", "hobby", "my family", "just for me"]),
];

const BEGINNER_SIGNALS: &[&str] = &[
    "beginner",
    "non-technical",
    "not technical",
    "no coding",
    "no code",
    "i'm new",
    "never built",
    "no experience",
];

const CONSTRAINT_SIGNALS: &[(&str, &[&str])] = &[
    (
        "limited_budget",
        &["cheap", "low cost", "free", "tight budget", "limited budget", "affordable", "bootstrap"],
    ),
    (
        "tight_timeline",
        &["asap", "deadline", "urgent", "by tomorrow", "this week", "quickly", "right away"],
    ),
    ("no_code", &["no coding", "no code", "without code", "non-technical"]),
    ("mobile_first", &["mobile", "phone", "app store"]),
    ("accessibility", &["accessible", "accessibility", "wcag", "a11y", "screen reader"]),
    ("compliance", &["gdpr", "hipaa", "pci", "compliance", "soc 2"]),
    ("self_hosted", &["self-hosted", "self hosted", "on-prem", "on premise"]),
];

const GOAL_SIGNALS: &[(&str, &[&str])] = &[
    ("sell_online", &["sell online", "sell products", "online store", "take orders"]),
    (
        "grow_audience",
        &["grow my audience", "more customers", "reach more", "get traffic", "followers"],
    ),
    ("automate_workflows", &["automate", "save time", "workflow", "streamline"]),
    ("showcase_work", &["showcase", "portfolio", "show my work", "gallery"]),
    ("capture_leads", &["leads", "sign ups", "signups", "mailing list", "waitlist"]),
    ("track_metrics", &["track", "dashboard", "analytics", "metrics", "reporting"]),
    ("learn", &["learn", "understand how", "teach me"]),
];

const HIGH_URGENCY_SIGNALS: &[&str] = &[
    "asap",
    "urgent",
    "today",
    "tomorrow",
    "this week",
    "right away",
    "deadline",
    "quickly",
];

const LOW_URGENCY_SIGNALS: &[&str] = &["no rush", "eventually", "whenever", "long term", "someday", "no deadline"];

const LOW_BUDGET_SIGNALS: &[&str] = &[
    "free",
    "cheap",
    "tight budget",
    "low budget",
    "limited budget",
    "affordable",
    "bootstrap",
    "no budget",
];

const HIGH_BUDGET_SIGNALS: &[&str] = &["premium", "high budget", "well funded", "whatever it costs", "no budget limit"];

const LARGE_SCALE_SIGNALS: &[&str] = &[
    "millions",
    "enterprise",
    "global",
    "high traffic",
    "thousands of users",
    "scale to",
    "worldwide",
];

const SMALL_SCALE_SIGNALS: &[&str] = &["just me", "personal", "small", "family", "few users", "hobby", "local"];

const DESIGN_SIGNALS: &[&str] = &[
    "minimal",
    "modern",
    "dark mode",
    "colorful",
    "playful",
    "elegant",
    "professional",
    "clean",
    "retro",
];

// -- Keyword tables and regex patterns compiled once via LazyLock --

type Table<T> = Vec<(T, KeywordSet)>;

fn compile<T: Copy>(table: &[(T, &[&str])]) -> Table<T> {
    table
        .iter()
        .map(|(value, keywords)| (*value, KeywordSet::new(keywords.iter()).unwrap()))
        .collect()
}

fn words(keywords: &[&str]) -> KeywordSet {
    KeywordSet::new(keywords).unwrap()
}

static USER_TYPES: LazyLock<Table<UserType>> = LazyLock::new(|| compile(USER_TYPE_SIGNALS));
static BUSINESS_MODELS: LazyLock<Table<BusinessModel>> = LazyLock::new(|| compile(BUSINESS_MODEL_SIGNALS));
static CONSTRAINTS: LazyLock<Table<&'static str>> = LazyLock::new(|| compile(CONSTRAINT_SIGNALS));
static GOALS: LazyLock<Table<&'static str>> = LazyLock::new(|| compile(GOAL_SIGNALS));
static BEGINNER: LazyLock<KeywordSet> = LazyLock::new(|| words(BEGINNER_SIGNALS));
static HIGH_URGENCY: LazyLock<KeywordSet> = LazyLock::new(|| words(HIGH_URGENCY_SIGNALS));
static LOW_URGENCY: LazyLock<KeywordSet> = LazyLock::new(|| words(LOW_URGENCY_SIGNALS));
static LOW_BUDGET: LazyLock<KeywordSet> = LazyLock::new(|| words(LOW_BUDGET_SIGNALS));
static HIGH_BUDGET: LazyLock<KeywordSet> = LazyLock::new(|| words(HIGH_BUDGET_SIGNALS));
static LARGE_SCALE: LazyLock<KeywordSet> = LazyLock::new(|| words(LARGE_SCALE_SIGNALS));
static SMALL_SCALE: LazyLock<KeywordSet> = LazyLock::new(|| words(SMALL_SCALE_SIGNALS));
static DESIGN: LazyLock<KeywordSet> = LazyLock::new(|| words(DESIGN_SIGNALS));

static TECH_VOCABULARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:api|apis|database|backend|frontend|deploy(?:ment)?|docker|kubernetes|microservices?|graphql|rest|oauth|ci/cd|typescript|schema|orm|sdk|webhooks?|serverless|websockets?|caching|latency|postgres(?:ql)?|redis|sql)\b",
    )
    .unwrap()
});

static TECH_PREFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(react|vue|svelte|angular|next\.js|nextjs|django|rails|laravel|node|python|rust|postgres|mysql|mongodb|firebase|supabase|wordpress|shopify|tailwind)\b",
    )
    .unwrap()
});

/// Extracts structured context signal from requests
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextAnalyzer;

impl ContextAnalyzer {
    pub const fn new() -> Self {
        Self
    }

    /// Analyze a request in the light of any known user context
    ///
    /// Fields already present on `context` are trusted as-is. Missing
    /// fields are inferred from the request text, nudged by history, and
    /// otherwise defaulted (`general` user, `medium` scale and budget,
    /// `beginner` technical level).
    pub fn analyze(&self, request: &NormalizedRequest, context: &UserContext) -> ContextAnalysis {
        let text = request.search_text();
        let history = history_text(&context.history);

        let analysis = ContextAnalysis {
            user_type: context
                .user_type
                .or_else(|| detect_user_type(&text, &history))
                .unwrap_or_default(),
            technical_level: context
                .technical_level
                .or_else(|| detect_technical_level(&text))
                .or_else(|| historical_technical_level(&context.history))
                .unwrap_or_default(),
            scale: context.scale.unwrap_or_else(|| detect_scale(&text)),
            budget: context.budget.unwrap_or_else(|| detect_budget(&text)),
            business_model: context.business_model.or_else(|| best_match(&text, "", &BUSINESS_MODELS)),
            urgency: detect_urgency(&text),
            constraints: merge_tags(&context.constraints, &text, &CONSTRAINTS),
            goals: merge_tags(&context.goals, &text, &GOALS),
            design_preferences: DESIGN.matched(&text).map(str::to_owned).collect(),
            tech_preferences: tech_preferences(&text),
        };

        tracing::debug!(
            user_type = %analysis.user_type,
            technical_level = %analysis.technical_level,
            scale = %analysis.scale,
            urgency = %analysis.urgency,
            constraints = analysis.constraints.len(),
            goals = analysis.goals.len(),
            "context analyzed"
        );

        analysis
    }
}

/// Lowercased interaction types and domains from past interactions
fn history_text(history: &[PastInteraction]) -> String {
    let mut text = String::new();
    for interaction in history {
        text.push(' ');
        text.push_str(&interaction.interaction_type.to_lowercase().replace('_', " "));
        if let Some(domain) = &interaction.domain {
            text.push(' ');
            text.push_str(&domain.to_lowercase().replace('_', " "));
        }
    }
    text
}

/// Pick the best-scoring row of a signal table
///
/// Current-turn hits dominate; history adds a capped bias that can only
/// break ties between rows with equal text hits. Returns `None` when the
/// text carries no signal at all.
#[allow(clippy::cast_precision_loss)]
fn best_match<T: Copy>(text: &str, history: &str, table: &[(T, KeywordSet)]) -> Option<T> {
    let mut best: Option<(T, f64)> = None;

    for (value, keywords) in table {
        let hits = keywords.hits(text);
        if hits == 0 {
            continue;
        }

        let bias = (keywords.hits(history) as f64 * HISTORY_MATCH_WEIGHT).min(MAX_HISTORY_BIAS);
        let score = hits as f64 + bias;

        if best.is_none_or(|(_, top)| score > top) {
            best = Some((*value, score));
        }
    }

    best.map(|(value, _)| value)
}

fn detect_user_type(text: &str, history: &str) -> Option<UserType> {
    best_match(text, history, &USER_TYPES)
}

/// Technical level from explicit self-description or vocabulary density
fn detect_technical_level(text: &str) -> Option<TechnicalLevel> {
    if BEGINNER.is_match(text) {
        return Some(TechnicalLevel::Beginner);
    }

    let distinct: HashSet<&str> = TECH_VOCABULARY_RE.find_iter(text).map(|m| m.as_str()).collect();

    match distinct.len() {
        0 => None,
        n if n >= ADVANCED_VOCABULARY => Some(TechnicalLevel::Advanced),
        _ => Some(TechnicalLevel::Intermediate),
    }
}

/// Most frequently observed level in history; ties go to the higher level
fn historical_technical_level(history: &[PastInteraction]) -> Option<TechnicalLevel> {
    let levels = [
        TechnicalLevel::Beginner,
        TechnicalLevel::Intermediate,
        TechnicalLevel::Advanced,
    ];

    levels
        .into_iter()
        .map(|level| {
            let seen = history.iter().filter(|i| i.technical_level == Some(level)).count();
            (level, seen)
        })
        .filter(|(_, seen)| *seen > 0)
        .max_by_key(|(level, seen)| (*seen, *level))
        .map(|(level, _)| level)
}

fn detect_scale(text: &str) -> Scale {
    if LARGE_SCALE.is_match(text) {
        Scale::Large
    } else if SMALL_SCALE.is_match(text) {
        Scale::Small
    } else {
        Scale::default()
    }
}

fn detect_budget(text: &str) -> BudgetLevel {
    if HIGH_BUDGET.is_match(text) {
        BudgetLevel::High
    } else if LOW_BUDGET.is_match(text) {
        BudgetLevel::Low
    } else {
        BudgetLevel::default()
    }
}

fn detect_urgency(text: &str) -> Urgency {
    if LOW_URGENCY.is_match(text) {
        Urgency::Low
    } else if HIGH_URGENCY.is_match(text) {
        Urgency::High
    } else {
        Urgency::default()
    }
}

/// Known tags first, then newly detected tags, without duplicates
fn merge_tags(known: &[String], text: &str, table: &[(&str, KeywordSet)]) -> Vec<String> {
    let mut seen = HashSet::new();
    let detected = table
        .iter()
        .filter(|(_, keywords)| keywords.is_match(text))
        .map(|(tag, _)| (*tag).to_owned());

    known
        .iter()
        .cloned()
        .chain(detected)
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

fn tech_preferences(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    TECH_PREFERENCE_RE
        .find_iter(text)
        .map(|m| m.as_str().to_owned())
        .filter(|tech| seen.insert(tech.clone()))
        .collect()
}
