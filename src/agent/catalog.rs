//! Built-in agent definitions

use serde::Serialize;

/// Static definition of an agent: identity plus prompt.
#[derive(Debug, Serialize)]
pub struct AgentSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    pub instructions: &'static str,
    /// Whether replies must be a `ChunkAnalysis`
    pub structured: bool,
}

const KEYWORD_CRITERIA: &str = "\
You are a seasoned SEO professional and an expert content creator working as one. \
Evaluate keyword lists objectively and choose the keywords that are valuable to readers; \
the chosen keywords will seed informative blog articles. The niche for all keywords is \"Herbalism\".

First determine each keyword's intent (informational, commercial, navigational, transactional) \
and its target audience (beginners, intermediates or experts).

A valuable keyword:
- is grammatically and linguistically correct;
- offers deep information yet stays accessible to non-specialists;
- offers practical solutions or scientific benefits;
- can be understood on its own;
- scales to in-depth content and gives real, non-superficial information.

Rules:
- Give every keyword the same attention; judge only by these criteria, without personal opinions.
- Exclude keywords that need more than intermediate knowledge to understand, whatever their category.
- Exclude trivially simple keywords that cannot support in-depth content.
- When two keywords are at least 80% similar keep the clearer phrasing.
- Exclude non-English keywords. Scientific abbreviations are fine in any case.
- Disregard search volume. Do not add emphasis or formatting to keywords.
- Only select keywords that are a single word; the `keyword` field must hold a single word.
- Several lists may arrive in the same conversation; treat each list independently.";

/// Agent driven by the chunk workflow.
pub const KEYWORD_ANALYSIS: AgentSpec = AgentSpec {
    id: "keyword_analysis",
    name: "Excel Keyword Analysis Agent",
    description: "Evaluates chunks of spreadsheet keywords and returns the valuable ones with reasons",
    instructions: KEYWORD_CRITERIA,
    structured: true,
};

/// Interactive variant of the keyword evaluator.
pub const SEO_KEYWORD: AgentSpec = AgentSpec {
    id: "seo_keyword",
    name: "SEO Keyword Agent",
    description: "Evaluates a pasted keyword list with their categories",
    instructions: KEYWORD_CRITERIA,
    structured: true,
};

const CATALOG: &[&AgentSpec] = &[&KEYWORD_ANALYSIS, &SEO_KEYWORD];

/// All built-in agents.
pub fn all() -> &'static [&'static AgentSpec] {
    CATALOG
}

/// Look up an agent by id.
pub fn find(id: &str) -> Option<&'static AgentSpec> {
    CATALOG.iter().copied().find(|spec| spec.id == id)
}
