use serde::{Deserialize, Serialize};

/// Coarse humor type inferred from what made a participant laugh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HumorProfile {
    CreativeAbsurdist,
    RelatableWarmth,
    ReactionDriven,
    Improviser,
    StraightShooter,
    Analytical,
}

// Checked in order; the first group with a hit wins.
const KEYWORD_GROUPS: &[(HumorProfile, &[&str])] = &[
    (HumorProfile::CreativeAbsurdist, &["반전", "풍자", "병맛"]),
    (HumorProfile::RelatableWarmth, &["귀여움", "감동", "공감", "일상유머"]),
    (HumorProfile::ReactionDriven, &["슬랩스틱", "예측불가능", "당황"]),
    (HumorProfile::Improviser, &["즉흥", "전염성", "상황개그"]),
    (HumorProfile::StraightShooter, &["팩트폭격"]),
];

impl HumorProfile {
    pub fn classify(label: &str, tags: &str) -> Self {
        let text = format!("{label} {tags}");
        KEYWORD_GROUPS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| text.contains(*kw)))
            .map(|(profile, _)| *profile)
            .unwrap_or(HumorProfile::Analytical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HumorProfile::CreativeAbsurdist => "E-N",
            HumorProfile::RelatableWarmth => "E-S",
            HumorProfile::ReactionDriven => "E-F",
            HumorProfile::Improviser => "E-P",
            HumorProfile::StraightShooter => "E-J",
            HumorProfile::Analytical => "I",
        }
    }
}
