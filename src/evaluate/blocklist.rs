use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

/// A configured exclusion: a single entity id or an inclusive id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRule {
    Single(u32),
    Range(u32, u32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockRuleError {
    #[error("rule `{0}` is not an id or a low-high range")]
    Malformed(String),
    #[error("range `{0}` has its low bound above its high bound")]
    Inverted(String),
}

fn rule_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)(?:-(\d+))?$").expect("valid rule pattern"))
}

impl FromStr for BlockRule {
    type Err = BlockRuleError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let captures = rule_pattern()
            .captures(text)
            .ok_or_else(|| BlockRuleError::Malformed(text.to_string()))?;

        let low: u32 = captures[1]
            .parse()
            .map_err(|_| BlockRuleError::Malformed(text.to_string()))?;

        match captures.get(2) {
            None => Ok(BlockRule::Single(low)),
            Some(high) => {
                let high: u32 = high
                    .as_str()
                    .parse()
                    .map_err(|_| BlockRuleError::Malformed(text.to_string()))?;
                if low > high {
                    return Err(BlockRuleError::Inverted(text.to_string()));
                }
                Ok(BlockRule::Range(low, high))
            }
        }
    }
}

impl BlockRule {
    pub fn matches(&self, id: u32) -> bool {
        match self {
            BlockRule::Single(single) => id == *single,
            BlockRule::Range(low, high) => (*low..=*high).contains(&id),
        }
    }
}

/// The full exclusion list for one entity kind.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    rules: Vec<BlockRule>,
}

impl BlockList {
    pub fn new(rules: Vec<BlockRule>) -> Self {
        Self { rules }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.rules.iter().any(|rule| rule.matches(id))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
